use crate::frame_in_flight::FRAMES_LIMIT;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering::Relaxed;

type ValueType = u16;

/// The index of a frame that is in flight. See [mod](self) for docs.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct FrameInFlight<'a> {
	value: ValueType,
	phantom: PhantomData<&'a ()>,
}

impl FrameInFlight<'_> {
	/// `FrameInFlight` should be handled carefully as it allows access to a resource that may be in flight. The lifetime
	/// constrains it to the closure or draw call it was handed to.
	///
	/// # Safety
	/// One may not use the `FrameInFlight` to write a Resource that the GPU may still be reading.
	#[inline]
	pub unsafe fn new(seed: impl Into<SeedInFlight>, frame_index: u32) -> Self {
		let seed = seed.into();
		assert!(
			frame_index < seed.frames_in_flight(),
			"frame index {} out of bounds for {:?}",
			frame_index,
			seed
		);
		FrameInFlight {
			value: seed.0 | (frame_index as ValueType & 0xF),
			phantom: PhantomData,
		}
	}

	#[inline]
	pub fn frame_index(&self) -> usize {
		(self.value & 0xF) as usize
	}

	#[inline]
	pub fn seed(&self) -> SeedInFlight {
		SeedInFlight(self.value & 0xFFF0)
	}

	/// The index of the frame after this one, wrapping around.
	///
	/// # Safety
	/// Same as [`Self::new`].
	#[inline]
	pub unsafe fn next(&self) -> Self {
		unsafe {
			let seed = self.seed();
			Self::new(seed, (self.frame_index() as u32 + 1) % seed.frames_in_flight())
		}
	}
}

impl Debug for FrameInFlight<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FrameInFlight")
			.field("seed", &self.seed().seed_u8())
			.field("frames_in_flight", &self.seed().frames_in_flight())
			.field("frame_index", &self.frame_index())
			.finish()
	}
}

impl From<FrameInFlight<'_>> for usize {
	fn from(value: FrameInFlight) -> Self {
		value.frame_index()
	}
}

impl From<FrameInFlight<'_>> for u32 {
	fn from(value: FrameInFlight) -> Self {
		value.frame_index() as u32
	}
}

impl From<&FrameInFlight<'_>> for SeedInFlight {
	fn from(value: &FrameInFlight<'_>) -> Self {
		value.seed()
	}
}

/// The seed is the configuration of the Frame in flight system and ensures different seeds are not mixed or matched.
/// See [mod](self) for docs.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct SeedInFlight(ValueType);

impl SeedInFlight {
	#[must_use]
	pub fn new(frames_in_flight: u32) -> Self {
		static SEED_CNT: AtomicU8 = AtomicU8::new(42);
		let seed = SEED_CNT.fetch_add(1, Relaxed);
		// SAFETY: global atomic counter ensures seeds are unique
		unsafe { Self::assemble(seed, frames_in_flight) }
	}

	/// # Safety
	/// Only there for internal testing. The seed must never repeat, which `Self::new()` ensures.
	#[must_use]
	pub unsafe fn assemble(seed: u8, frames_in_flight: u32) -> Self {
		assert!(frames_in_flight != 0, "frames_in_flight must not be 0");
		assert!(
			frames_in_flight <= FRAMES_LIMIT,
			"frames_in_flight of {} is over FRAMES_LIMIT {}",
			frames_in_flight,
			FRAMES_LIMIT
		);
		let mut out = 0;
		out |= (seed as ValueType) << 8;
		out |= (((frames_in_flight - 1) as ValueType) & 0xF) << 4;
		Self(out)
	}

	/// Iterate all frames of this seed.
	///
	/// # Safety
	/// The returned FrameInFlight may be used to access any ResourceInFlight, of which some indexes may be in use
	/// right now.
	pub unsafe fn iter(&self) -> impl Iterator<Item = FrameInFlight<'static>> {
		let seed = *self;
		(0..self.frames_in_flight()).map(move |frame| unsafe { FrameInFlight::new(seed, frame) })
	}

	#[must_use]
	#[inline]
	pub fn frames_in_flight(&self) -> u32 {
		((self.0 >> 4) & 0xF) as u32 + 1
	}

	#[must_use]
	#[inline]
	fn seed_u8(&self) -> u8 {
		((self.0 >> 8) & 0xFF) as u8
	}
}

impl Debug for SeedInFlight {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SeedInFlight")
			.field("seed", &self.seed_u8())
			.field("frames_in_flight", &self.frames_in_flight())
			.finish()
	}
}
