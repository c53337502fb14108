use crate::deletion::DeletionQueue;
use crate::error::RenderError;
use crate::frame_in_flight::{FrameInFlight, SeedInFlight};
use crate::manager::UpdateContext;
use crate::manager::per_frame::{BufferBinding, PerFrameBuffer, PerFrameBufferCreateInfo};
use crate::params::{GuiVertex, SafeArea};
use crate::platform::{BufferConsumer, BufferUsage, Extent, FramePlatform, SurfaceRotation, UniformLayout};
use bytemuck_derive::{Pod, Zeroable};
use glam::Vec2;
use static_assertions::const_assert_eq;
use std::mem::size_of;

pub const DEFAULT_MIN_GUI_VERTEX_CAPACITY: u64 = 2048;
pub const DEFAULT_MIN_GUI_INDEX_CAPACITY: u64 = 2048;
pub const DEFAULT_MIN_GUI_WINDOW_CAPACITY: u64 = 8;

/// Per native window constants of the GUI pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GuiWindowUniform {
	/// Columns of the 2x2 matrix applied to normalized device coordinates to match the surface pre-transform
	pub rotation: [Vec2; 2],
	/// The logical extent of the window, before rotation
	pub extent: Vec2,
	/// The unobstructed area of the window in normalized window coordinates
	pub safe_area_min: Vec2,
	pub safe_area_max: Vec2,
	pub _pad: Vec2,
}
const_assert_eq!(size_of::<GuiWindowUniform>(), 48);

impl GuiWindowUniform {
	/// `extent` is the extent of the swapchain images.
	pub fn new(extent: Extent, rotation: SurfaceRotation, safe_area: SafeArea) -> Self {
		let logical = match rotation.swaps_extent() {
			true => Vec2::new(extent.height as f32, extent.width as f32),
			false => Vec2::new(extent.width as f32, extent.height as f32),
		};
		let size = logical.max(Vec2::ONE);
		let matrix = rotation.matrix();
		Self {
			rotation: [matrix.x_axis, matrix.y_axis],
			extent: logical,
			safe_area_min: Vec2::new(safe_area.left as f32, safe_area.top as f32) / size,
			safe_area_max: Vec2::ONE - Vec2::new(safe_area.right as f32, safe_area.bottom as f32) / size,
			_pad: Vec2::ZERO,
		}
	}
}

/// One [`GuiWindowUniform`] per native window drawn this frame, in the order of the native window updates.
pub struct GuiWindowUniforms<P: FramePlatform> {
	uniforms: PerFrameBuffer<P>,
	len: u32,
}

impl<P: FramePlatform> GuiWindowUniforms<P> {
	pub fn new(platform: &P, seed: SeedInFlight, min_capacity: u64) -> Result<Self, RenderError> {
		Ok(Self {
			uniforms: PerFrameBuffer::new(
				platform,
				seed,
				PerFrameBufferCreateInfo {
					name: "gui window uniforms",
					usage: BufferUsage::UNIFORM,
					consumer: BufferConsumer::Uniform,
					uniform: Some(UniformLayout::GuiWindow),
					element_size: size_of::<GuiWindowUniform>() as u64,
					min_capacity,
				},
			)?,
			len: 0,
		})
	}

	pub fn update(&mut self, ctx: &UpdateContext<P>, windows: &[GuiWindowUniform]) -> Result<(), RenderError> {
		self.uniforms.update(ctx, windows)?;
		self.len = windows.len() as u32;
		Ok(())
	}

	pub fn capacity(&self) -> u64 {
		self.uniforms.capacity()
	}

	pub fn binding(&self, frame: FrameInFlight) -> BufferBinding<'_, P> {
		self.uniforms.binding(frame, self.len)
	}

	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		self.uniforms.destroy(deletion);
	}
}

#[derive(Copy, Clone, Debug)]
pub struct GuiCapacities {
	pub min_vertices: u64,
	pub min_indices: u64,
	pub min_windows: u64,
}

impl Default for GuiCapacities {
	fn default() -> Self {
		Self {
			min_vertices: DEFAULT_MIN_GUI_VERTEX_CAPACITY,
			min_indices: DEFAULT_MIN_GUI_INDEX_CAPACITY,
			min_windows: DEFAULT_MIN_GUI_WINDOW_CAPACITY,
		}
	}
}

/// Geometry of the GUI meshes of all windows and the per window uniforms.
pub struct GuiResourceManager<P: FramePlatform> {
	vertices: PerFrameBuffer<P>,
	indices: PerFrameBuffer<P>,
	vertex_len: u32,
	index_len: u32,
	pub windows: GuiWindowUniforms<P>,
}

impl<P: FramePlatform> GuiResourceManager<P> {
	pub fn new(platform: &P, seed: SeedInFlight, capacities: GuiCapacities) -> Result<Self, RenderError> {
		Ok(Self {
			vertices: PerFrameBuffer::new(
				platform,
				seed,
				PerFrameBufferCreateInfo {
					name: "gui vertices",
					usage: BufferUsage::VERTEX,
					consumer: BufferConsumer::Vertex,
					uniform: None,
					element_size: size_of::<GuiVertex>() as u64,
					min_capacity: capacities.min_vertices,
				},
			)?,
			indices: PerFrameBuffer::new(
				platform,
				seed,
				PerFrameBufferCreateInfo {
					name: "gui indices",
					usage: BufferUsage::INDEX,
					consumer: BufferConsumer::Index,
					uniform: None,
					element_size: size_of::<u32>() as u64,
					min_capacity: capacities.min_indices,
				},
			)?,
			vertex_len: 0,
			index_len: 0,
			windows: GuiWindowUniforms::new(platform, seed, capacities.min_windows)?,
		})
	}

	pub fn update(
		&mut self,
		ctx: &UpdateContext<P>,
		vertices: &[GuiVertex],
		indices: &[u32],
		windows: &[GuiWindowUniform],
	) -> Result<(), RenderError> {
		profiling::function_scope!();
		self.vertices.update(ctx, vertices)?;
		self.indices.update(ctx, indices)?;
		self.vertex_len = vertices.len() as u32;
		self.index_len = indices.len() as u32;
		self.windows.update(ctx, windows)
	}

	pub fn vertex_binding(&self, frame: FrameInFlight) -> BufferBinding<'_, P> {
		self.vertices.binding(frame, self.vertex_len)
	}

	pub fn index_binding(&self, frame: FrameInFlight) -> BufferBinding<'_, P> {
		self.indices.binding(frame, self.index_len)
	}

	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		self.vertices.destroy(deletion);
		self.indices.destroy(deletion);
		self.windows.destroy(deletion);
	}
}
