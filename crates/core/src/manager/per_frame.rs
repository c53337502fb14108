use crate::deletion::{DeletionJob, DeletionQueue};
use crate::error::RenderError;
use crate::frame_in_flight::{FrameInFlight, SeedInFlight};
use crate::manager::UpdateContext;
use crate::platform::{BufferConsumer, BufferCreateInfo, BufferUsage, FramePlatform, UniformLayout};
use bytemuck::Pod;
use std::mem::size_of;

/// Capacity after growing to fit `count` elements.
pub fn grown_capacity(count: u64, capacity: u64, min_capacity: u64) -> u64 {
	count.max(capacity).max(min_capacity) * 2
}

#[derive(Copy, Clone, Debug)]
pub struct PerFrameBufferCreateInfo {
	pub name: &'static str,
	pub usage: BufferUsage,
	pub consumer: BufferConsumer,
	/// Uniform buffers get a dynamic uniform descriptor and their element size aligned to
	/// `min_uniform_buffer_offset_alignment`
	pub uniform: Option<UniformLayout>,
	pub element_size: u64,
	pub min_capacity: u64,
}

/// A buffer holding `capacity` elements per frame in flight, laid out as consecutive per-frame slices. Writing the
/// slice of one frame never touches the slices of frames that may still be in flight.
pub struct PerFrameBuffer<P: FramePlatform> {
	ci: PerFrameBufferCreateInfo,
	element_size: u64,
	frames_in_flight: u32,
	capacity: u64,
	buffer: P::Buffer,
	descriptor: Option<(P::DescriptorPool, P::DescriptorSet)>,
}

/// Where the slice of one frame lives within a [`PerFrameBuffer`].
pub struct BufferBinding<'a, P: FramePlatform> {
	pub buffer: &'a P::Buffer,
	pub descriptor_set: Option<P::DescriptorSet>,
	pub offset: u64,
	pub stride: u64,
	pub len: u32,
}

impl<P: FramePlatform> PerFrameBuffer<P> {
	pub fn new(platform: &P, seed: SeedInFlight, ci: PerFrameBufferCreateInfo) -> Result<Self, RenderError> {
		assert_ne!(ci.element_size, 0);
		let element_size = match ci.uniform {
			Some(_) => ci
				.element_size
				.next_multiple_of(platform.limits().min_uniform_buffer_offset_alignment.max(1)),
			None => ci.element_size,
		};
		let frames_in_flight = seed.frames_in_flight();
		let capacity = ci.min_capacity.max(1);
		let (buffer, descriptor) = Self::alloc(platform, &ci, element_size, frames_in_flight, capacity)?;
		Ok(Self {
			ci,
			element_size,
			frames_in_flight,
			capacity,
			buffer,
			descriptor,
		})
	}

	fn alloc(
		platform: &P,
		ci: &PerFrameBufferCreateInfo,
		element_size: u64,
		frames_in_flight: u32,
		capacity: u64,
	) -> Result<(P::Buffer, Option<(P::DescriptorPool, P::DescriptorSet)>), RenderError> {
		let size = capacity * element_size * frames_in_flight as u64;
		unsafe {
			let buffer = platform
				.create_buffer(&BufferCreateInfo {
					name: ci.name,
					size,
					usage: ci.usage,
				})
				.map_err(|e| RenderError::allocation(ci.name, size, e))?;
			let descriptor = match ci.uniform {
				None => None,
				Some(layout) => match platform.create_uniform_descriptor(layout, &buffer, element_size, ci.name) {
					Ok(descriptor) => Some(descriptor),
					Err(e) => {
						platform.destroy_buffer(buffer);
						return Err(RenderError::platform(e));
					}
				},
			};
			Ok((buffer, descriptor))
		}
	}

	pub fn capacity(&self) -> u64 {
		self.capacity
	}

	pub fn element_size(&self) -> u64 {
		self.element_size
	}

	pub fn buffer(&self) -> &P::Buffer {
		&self.buffer
	}

	pub fn slice_offset(&self, frame: FrameInFlight) -> u64 {
		frame.frame_index() as u64 * self.capacity * self.element_size
	}

	pub fn binding(&self, frame: FrameInFlight, len: u32) -> BufferBinding<'_, P> {
		BufferBinding {
			buffer: &self.buffer,
			descriptor_set: self.descriptor.as_ref().map(|(_, set)| *set),
			offset: self.slice_offset(frame),
			stride: self.element_size,
			len,
		}
	}

	/// Grow to fit at least `count` elements, returns true if the storage was replaced. The old storage is released
	/// through the deletion queue, as older frames may still read it.
	pub fn reserve(&mut self, ctx: &UpdateContext<P>, count: u64) -> Result<bool, RenderError> {
		if count <= self.capacity {
			return Ok(false);
		}
		let capacity = grown_capacity(count, self.capacity, self.ci.min_capacity);
		log::debug!("Growing {} from {} to {} elements", self.ci.name, self.capacity, capacity);
		let (buffer, descriptor) =
			Self::alloc(ctx.platform, &self.ci, self.element_size, self.frames_in_flight, capacity)?;
		let old_buffer = std::mem::replace(&mut self.buffer, buffer);
		let old_descriptor = std::mem::replace(&mut self.descriptor, descriptor);
		ctx.deletion.destroy(DeletionJob::Buffer(old_buffer));
		if let Some((pool, _)) = old_descriptor {
			ctx.deletion.destroy(DeletionJob::DescriptorPool(pool));
		}
		self.capacity = capacity;
		Ok(true)
	}

	/// Write `elements` into the slice of `ctx.frame`, growing the buffer if necessary. Writing no elements does nothing.
	pub fn update<T: Pod>(&mut self, ctx: &UpdateContext<P>, elements: &[T]) -> Result<(), RenderError> {
		assert_eq!(size_of::<T>() as u64, self.ci.element_size, "{} element type mismatch", self.ci.name);
		if elements.is_empty() {
			return Ok(());
		}
		profiling::function_scope!();
		self.reserve(ctx, elements.len() as u64)?;

		let offset = self.slice_offset(ctx.frame);
		let size = elements.len() as u64 * self.element_size;
		unsafe {
			if self.element_size == size_of::<T>() as u64 {
				ctx.platform
					.write_buffer(&self.buffer, offset, bytemuck::cast_slice(elements));
			} else {
				let stride = self.element_size as usize;
				let mut strided = vec![0u8; size as usize];
				for (chunk, element) in strided.chunks_exact_mut(stride).zip(elements) {
					chunk[..size_of::<T>()].copy_from_slice(bytemuck::bytes_of(element));
				}
				ctx.platform.write_buffer(&self.buffer, offset, &strided);
			}
			ctx.platform
				.cmd_host_write_barrier(ctx.cmd, &self.buffer, offset, size, self.ci.consumer);
		}
		Ok(())
	}

	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		deletion.destroy(DeletionJob::Buffer(self.buffer));
		if let Some((pool, _)) = self.descriptor {
			deletion.destroy(DeletionJob::DescriptorPool(pool));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::manager::tests::TestContext;
	use crate::platform::dummy::{Command, Kind};

	fn vertex_info() -> PerFrameBufferCreateInfo {
		PerFrameBufferCreateInfo {
			name: "test vertices",
			usage: BufferUsage::VERTEX,
			consumer: BufferConsumer::Vertex,
			uniform: None,
			element_size: 4,
			min_capacity: 4,
		}
	}

	#[test]
	fn growth() {
		assert_eq!(grown_capacity(10, 0, 256), 512);
		assert_eq!(grown_capacity(300, 256, 256), 600);
		assert_eq!(grown_capacity(300, 400, 16), 800);
	}

	#[test]
	fn slices_are_isolated() -> anyhow::Result<()> {
		let mut tc = TestContext::new(3)?;
		let mut buffer = PerFrameBuffer::new(&tc.platform, tc.seed, vertex_info())?;
		for frame in 0..3u32 {
			let ctx = tc.ctx(frame);
			buffer.update(&ctx, &[frame + 1; 4])?;
		}
		let contents = tc.platform.buffer_contents(buffer.buffer());
		let words: Vec<u32> = bytemuck::pod_collect_to_vec(&contents);
		assert_eq!(words, [1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);

		let ctx = tc.ctx(1);
		buffer.update(&ctx, &[9u32, 9])?;
		let contents = tc.platform.buffer_contents(buffer.buffer());
		let words: Vec<u32> = bytemuck::pod_collect_to_vec(&contents);
		assert_eq!(words, [1, 1, 1, 1, 9, 9, 2, 2, 3, 3, 3, 3]);

		assert!(tc.platform.take_commands().contains(&Command::Barrier {
			buffer: buffer.buffer().id,
			offset: 16,
			size: 8,
			consumer: BufferConsumer::Vertex,
		}));
		buffer.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	fn uniform_stride_is_aligned() -> anyhow::Result<()> {
		let mut tc = TestContext::new(2)?;
		let mut buffer = PerFrameBuffer::new(
			&tc.platform,
			tc.seed,
			PerFrameBufferCreateInfo {
				name: "test uniforms",
				usage: BufferUsage::UNIFORM,
				consumer: BufferConsumer::Uniform,
				uniform: Some(UniformLayout::ObjectData),
				element_size: 4,
				min_capacity: 2,
			},
		)?;
		assert_eq!(buffer.element_size(), 256);
		assert_eq!(buffer.buffer().size, 256 * 2 * 2);

		let ctx = tc.ctx(1);
		buffer.update(&ctx, &[7u32, 8])?;
		let contents = tc.platform.buffer_contents(buffer.buffer());
		assert_eq!(contents[512..516], 7u32.to_ne_bytes());
		assert_eq!(contents[768..772], 8u32.to_ne_bytes());
		assert!(contents[516..768].iter().all(|b| *b == 0));
		assert_eq!(tc.platform.live_count(Kind::DescriptorPool), 1);
		buffer.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	fn grows_and_queues_old_storage() -> anyhow::Result<()> {
		let mut tc = TestContext::new(2)?;
		let mut buffer = PerFrameBuffer::new(&tc.platform, tc.seed, vertex_info())?;
		let old = buffer.buffer().id;
		let ctx = tc.ctx(0);
		buffer.update(&ctx, &[1u32; 5])?;
		assert_eq!(buffer.capacity(), 10);
		assert_eq!(buffer.buffer().size, 10 * 4 * 2);
		assert_eq!(tc.deletion.pending_jobs(), 1);
		assert!(!tc.platform.is_destroyed(Kind::Buffer, old));
		buffer.destroy(&tc.deletion);
		tc.finish()?;
		assert!(tc.platform.is_destroyed(Kind::Buffer, old));
		Ok(())
	}
}
