use crate::deletion::DeletionQueue;
use crate::error::RenderError;
use crate::frame_in_flight::{FrameInFlight, SeedInFlight};
use crate::manager::UpdateContext;
use crate::manager::per_frame::{BufferBinding, PerFrameBuffer, PerFrameBufferCreateInfo};
use crate::params::LineDrawCmd;
use crate::platform::{BufferConsumer, BufferUsage, FramePlatform};
use glam::Vec3;
use std::mem::size_of;

pub const DEFAULT_MIN_LINE_VERTEX_CAPACITY: u64 = 256;

/// Vertices of gizmo and debug lines drawn into viewports.
pub struct LineVertexManager<P: FramePlatform> {
	vertices: PerFrameBuffer<P>,
	len: u32,
}

impl<P: FramePlatform> LineVertexManager<P> {
	pub fn new(platform: &P, seed: SeedInFlight, min_capacity: u64) -> Result<Self, RenderError> {
		Ok(Self {
			vertices: PerFrameBuffer::new(
				platform,
				seed,
				PerFrameBufferCreateInfo {
					name: "line vertices",
					usage: BufferUsage::VERTEX,
					consumer: BufferConsumer::Vertex,
					uniform: None,
					element_size: size_of::<Vec3>() as u64,
					min_capacity,
				},
			)?,
			len: 0,
		})
	}

	/// # Panics
	/// If the draw commands reference more vertices than there are.
	pub fn update(&mut self, ctx: &UpdateContext<P>, vertices: &[Vec3], cmds: &[LineDrawCmd]) -> Result<(), RenderError> {
		let referenced = cmds.iter().map(|cmd| cmd.vertex_count as usize).sum::<usize>();
		assert!(
			referenced <= vertices.len(),
			"line draw commands reference {} vertices, but only {} were supplied",
			referenced,
			vertices.len()
		);
		self.vertices.update(ctx, vertices)?;
		self.len = vertices.len() as u32;
		Ok(())
	}

	pub fn binding(&self, frame: FrameInFlight) -> BufferBinding<'_, P> {
		self.vertices.binding(frame, self.len)
	}

	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		self.vertices.destroy(deletion);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::manager::tests::TestContext;
	use glam::Vec4;

	#[test]
	fn tightly_packed() -> anyhow::Result<()> {
		let mut tc = TestContext::new(2)?;
		let mut manager = LineVertexManager::new(&tc.platform, tc.seed, 2)?;
		let vertices = [Vec3::X, Vec3::Y, Vec3::Z];
		let cmds = [LineDrawCmd {
			color: Vec4::ONE,
			vertex_count: 3,
		}];
		let ctx = tc.ctx(0);
		manager.update(&ctx, &vertices, &cmds)?;

		let binding = manager.binding(unsafe { FrameInFlight::new(tc.seed, 0) });
		assert_eq!((binding.offset, binding.stride, binding.len), (0, 12, 3));
		let contents = tc.platform.buffer_contents(manager.vertices.buffer());
		assert_eq!(contents[..36], *bytemuck::cast_slice::<Vec3, u8>(&vertices));
		manager.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	#[should_panic(expected = "line draw commands reference")]
	fn cmds_out_of_bounds() {
		let mut tc = TestContext::new(2).unwrap();
		let mut manager = LineVertexManager::new(&tc.platform, tc.seed, 2).unwrap();
		let ctx = tc.ctx(0);
		let _ = manager.update(
			&ctx,
			&[Vec3::ZERO],
			&[LineDrawCmd {
				color: Vec4::ONE,
				vertex_count: 2,
			}],
		);
	}
}
