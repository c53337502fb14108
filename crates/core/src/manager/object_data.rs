use crate::deletion::DeletionQueue;
use crate::error::RenderError;
use crate::frame_in_flight::{FrameInFlight, SeedInFlight};
use crate::manager::UpdateContext;
use crate::manager::per_frame::{BufferBinding, PerFrameBuffer, PerFrameBufferCreateInfo};
use crate::platform::{BufferConsumer, BufferUsage, FramePlatform, UniformLayout};
use glam::Mat4;
use std::mem::size_of;

pub const DEFAULT_MIN_OBJECT_CAPACITY: u64 = 256;

/// Per object model transforms, bound as a dynamic uniform buffer with one element per object.
pub struct ObjectDataManager<P: FramePlatform> {
	transforms: PerFrameBuffer<P>,
	len: u32,
}

impl<P: FramePlatform> ObjectDataManager<P> {
	pub fn new(platform: &P, seed: SeedInFlight, min_capacity: u64) -> Result<Self, RenderError> {
		Ok(Self {
			transforms: PerFrameBuffer::new(
				platform,
				seed,
				PerFrameBufferCreateInfo {
					name: "object data",
					usage: BufferUsage::UNIFORM,
					consumer: BufferConsumer::Uniform,
					uniform: Some(UniformLayout::ObjectData),
					element_size: size_of::<Mat4>() as u64,
					min_capacity,
				},
			)?,
			len: 0,
		})
	}

	pub fn update(&mut self, ctx: &UpdateContext<P>, transforms: &[Mat4]) -> Result<(), RenderError> {
		self.transforms.update(ctx, transforms)?;
		self.len = transforms.len() as u32;
		Ok(())
	}

	pub fn capacity(&self) -> u64 {
		self.transforms.capacity()
	}

	pub fn binding(&self, frame: FrameInFlight) -> BufferBinding<'_, P> {
		self.transforms.binding(frame, self.len)
	}

	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		self.transforms.destroy(deletion);
	}
}
