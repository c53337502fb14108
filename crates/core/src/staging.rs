use crate::deletion::{DeletionJob, DeletionQueue};
use crate::error::RenderError;
use crate::platform::{BufferCreateInfo, BufferUsage, FramePlatform};

pub const DEFAULT_STAGING_CAPACITY: u64 = 4 * 1024 * 1024;

/// A range of a [`StagingAllocator`]'s buffer, valid until the allocator is reset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StagingRegion {
	pub offset: u64,
	pub size: u64,
}

/// Bump allocator over a host visible transfer source buffer, one per frame in flight. Reset at the start of the draw
/// call that reuses its slot.
pub struct StagingAllocator<P: FramePlatform> {
	buffer: P::Buffer,
	capacity: u64,
	next_offset: u64,
}

impl<P: FramePlatform> StagingAllocator<P> {
	pub fn new(platform: &P, name: &str, capacity: u64) -> Result<Self, RenderError> {
		let buffer = unsafe {
			platform.create_buffer(&BufferCreateInfo {
				name,
				size: capacity,
				usage: BufferUsage::TRANSFER_SRC,
			})
		}
		.map_err(|e| RenderError::allocation(name, capacity, e))?;
		Ok(Self {
			buffer,
			capacity,
			next_offset: 0,
		})
	}

	pub fn buffer(&self) -> &P::Buffer {
		&self.buffer
	}

	pub fn capacity(&self) -> u64 {
		self.capacity
	}

	pub fn used(&self) -> u64 {
		self.next_offset
	}

	/// Reserve `size` bytes aligned to `align`, which must be a power of two.
	///
	/// # Panics
	/// If the staging buffer is exhausted.
	pub fn alloc(&mut self, size: u64, align: u64) -> StagingRegion {
		assert!(align.is_power_of_two(), "alignment {} is not a power of two", align);
		let offset = self.next_offset.next_multiple_of(align);
		assert!(
			offset + size <= self.capacity,
			"staging buffer exhausted: {} bytes requested at offset {} of {}",
			size,
			offset,
			self.capacity
		);
		self.next_offset = offset + size;
		StagingRegion { offset, size }
	}

	/// # Safety
	/// `region` must have been allocated from this allocator since the last reset.
	pub unsafe fn write(&self, platform: &P, region: StagingRegion, data: &[u8]) {
		assert!(data.len() as u64 <= region.size);
		unsafe { platform.write_buffer(&self.buffer, region.offset, data) };
	}

	/// Makes the entire capacity available again.
	///
	/// # Safety
	/// All transfers reading from this buffer must have completed.
	pub unsafe fn reset(&mut self) {
		self.next_offset = 0;
	}

	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		deletion.destroy(DeletionJob::Buffer(self.buffer));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::frame_in_flight::SeedInFlight;
	use crate::platform::dummy::{DummyPlatform, Kind};

	#[test]
	fn aligned_offsets() -> anyhow::Result<()> {
		let platform = DummyPlatform::default();
		let mut staging = StagingAllocator::new(&platform, "staging", 1024)?;
		assert_eq!(staging.alloc(3, 1), StagingRegion { offset: 0, size: 3 });
		assert_eq!(staging.alloc(8, 4), StagingRegion { offset: 4, size: 8 });
		assert_eq!(staging.alloc(1, 256), StagingRegion { offset: 256, size: 1 });
		assert_eq!(staging.used(), 257);

		unsafe { staging.reset() };
		assert_eq!(staging.alloc(16, 16).offset, 0);

		let deletion = DeletionQueue::new(SeedInFlight::new(2));
		staging.destroy(&deletion);
		unsafe { deletion.flush_all_jobs(&platform)? };
		assert_eq!(platform.live_count(Kind::Buffer), 0);
		Ok(())
	}

	#[test]
	fn write_lands_at_offset() -> anyhow::Result<()> {
		let platform = DummyPlatform::default();
		let mut staging = StagingAllocator::new(&platform, "staging", 16)?;
		staging.alloc(2, 1);
		let region = staging.alloc(4, 4);
		unsafe { staging.write(&platform, region, &[1, 2, 3, 4]) };
		assert_eq!(platform.buffer_contents(staging.buffer())[..8], [0, 0, 0, 0, 1, 2, 3, 4]);
		let deletion = DeletionQueue::new(SeedInFlight::new(2));
		staging.destroy(&deletion);
		unsafe { deletion.flush_all_jobs(&platform)? };
		Ok(())
	}

	#[test]
	#[should_panic(expected = "staging buffer exhausted")]
	fn exhaustion_panics() {
		let platform = DummyPlatform::default();
		let mut staging = StagingAllocator::new(&platform, "staging", 64).unwrap();
		staging.alloc(60, 1);
		staging.alloc(8, 8);
	}
}
