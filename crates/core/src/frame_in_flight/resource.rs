use crate::frame_in_flight::{FRAMES_SMALLVEC, FrameInFlight, SeedInFlight};
use smallvec::SmallVec;

/// A `ResourceInFlight` is a resource that is allocated once per frame that may be in flight at the same time. See
/// [mod](crate::frame_in_flight) for docs.
///
/// Indexing is done with plain fns instead of the [`Index`] trait, as the returned reference must not outlive the
/// [`FrameInFlight`] it was indexed with.
///
/// [`Index`]: core::ops::Index
#[derive(Debug)]
pub struct ResourceInFlight<T> {
	vec: SmallVec<[T; FRAMES_SMALLVEC]>,
	seed: SeedInFlight,
}

impl<T> ResourceInFlight<T> {
	/// Calls the supplied function for each frame in flight the seed has, so that one resource may be created per frame.
	#[must_use]
	pub fn new<F>(seed: impl Into<SeedInFlight>, mut f: F) -> Self
	where
		F: FnMut(FrameInFlight) -> T,
	{
		let seed = seed.into();
		let vec = SmallVec::from_iter((0..seed.frames_in_flight()).map(|i| {
			// SAFETY: allows access to other ResourceInFlights it may depend on, but only with the same index
			let fif = unsafe { FrameInFlight::new(seed, i) };
			f(fif)
		}));
		Self { seed, vec }
	}

	/// Fallible variant of [`Self::new`], stops at the first error. Resources created before the error are dropped.
	pub fn try_new<F, E>(seed: impl Into<SeedInFlight>, mut f: F) -> Result<Self, E>
	where
		F: FnMut(FrameInFlight) -> Result<T, E>,
	{
		let seed = seed.into();
		let vec = (0..seed.frames_in_flight())
			.map(|i| {
				// SAFETY: same as in new()
				let fif = unsafe { FrameInFlight::new(seed, i) };
				f(fif)
			})
			.collect::<Result<SmallVec<_>, E>>()?;
		Ok(Self { seed, vec })
	}

	#[inline(always)]
	pub fn seed(&self) -> SeedInFlight {
		self.seed
	}

	#[inline]
	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.vec.iter()
	}

	#[inline]
	pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
		self.vec.iter_mut()
	}

	/// Consume all resources, used for teardown.
	pub fn into_resources(self) -> impl Iterator<Item = T> {
		self.vec.into_iter()
	}
}

#[allow(clippy::should_implement_trait)]
impl<T> ResourceInFlight<T> {
	#[must_use]
	#[inline]
	pub fn index<'a>(&'a self, index: FrameInFlight<'a>) -> &'a T {
		assert_eq!(self.seed, index.seed());
		// SAFETY: self.seed.frames_in_flight is the initialized size of the array,
		// the assert above verifies that index is not greater than frames_in_flight
		unsafe { self.vec.get_unchecked(index.frame_index()) }
	}

	#[must_use]
	#[inline]
	pub fn index_mut<'a>(&'a mut self, index: FrameInFlight<'a>) -> &'a mut T {
		assert_eq!(self.seed, index.seed());
		// SAFETY: see index()
		unsafe { self.vec.get_unchecked_mut(index.frame_index()) }
	}
}

impl<T> From<&ResourceInFlight<T>> for SeedInFlight {
	fn from(value: &ResourceInFlight<T>) -> Self {
		value.seed()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::frame_in_flight::FRAMES_LIMIT;
	use std::rc::Rc;

	#[test]
	fn resource_happy() {
		unsafe {
			for n in 1..=FRAMES_LIMIT {
				let seed = SeedInFlight::new(n);
				let resource = ResourceInFlight::new(seed, |i| i.frame_index() as u32);

				for i in 0..n {
					let fif = FrameInFlight::new(seed, i);
					assert_eq!(*resource.index(fif), i);
				}
			}
		}
	}

	#[test]
	fn resource_try_new_stops_at_error() {
		let seed = SeedInFlight::new(3);
		let rc = Rc::new(());
		let result = ResourceInFlight::try_new(seed, |i| {
			if i.frame_index() == 2 {
				Err("boom")
			} else {
				Ok(rc.clone())
			}
		});
		assert_eq!(result.unwrap_err(), "boom");
		assert_eq!(Rc::strong_count(&rc), 1);
	}

	#[test]
	fn resource_drop() {
		for i in 1..FRAMES_LIMIT {
			let seed = SeedInFlight::new(i);
			let rc = Rc::new(());
			let resource = ResourceInFlight::new(seed, |_| rc.clone());
			assert_eq!(Rc::strong_count(&rc), i as usize + 1);

			drop(resource);
			assert_eq!(Rc::strong_count(&rc), 1);
		}
	}

	#[test]
	#[should_panic]
	fn resource_wrong_seed() {
		let seed = SeedInFlight::new(FRAMES_LIMIT);
		let resource = ResourceInFlight::new(seed, |i| i.frame_index());
		let seed2 = SeedInFlight::new(FRAMES_LIMIT);
		let fif2 = unsafe { FrameInFlight::new(seed2, 0) };
		let _ = *resource.index(fif2);
	}
}
