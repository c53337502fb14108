//! Managers of GPU state that changes every draw call. All of them are owned by the [`FrameOrchestrator`] and updated
//! in a fixed order at the start of every draw call through an [`UpdateContext`].
//!
//! [`FrameOrchestrator`]: crate::orchestrator::FrameOrchestrator

use crate::deletion::DeletionQueue;
use crate::frame_in_flight::FrameInFlight;
use crate::platform::FramePlatform;
use crate::staging::StagingAllocator;
use parking_lot::Mutex;
use std::mem;

pub mod gui;
pub mod line;
pub mod native_window;
pub mod object_data;
pub mod per_frame;
pub mod texture;
pub mod viewport;

/// Everything a manager may touch while updating for the frame in flight `frame`.
pub struct UpdateContext<'a, P: FramePlatform> {
	pub platform: &'a P,
	pub deletion: &'a DeletionQueue<P>,
	pub frame: FrameInFlight<'a>,
	/// The main command buffer of this draw call, currently recording
	pub cmd: P::CommandBuffer,
	pub staging: &'a mut StagingAllocator<P>,
}

/// A creation or deletion requested by any thread.
#[derive(Debug, PartialEq)]
pub enum Job<C, D> {
	Create(C),
	Delete(D),
}

/// Creations and deletions share a single lock and keep the order they were requested in, a batch taken by the draw
/// call never contains a deletion without the creation preceding it.
pub struct JobQueue<C, D> {
	jobs: Mutex<Vec<Job<C, D>>>,
}

impl<C, D> Default for JobQueue<C, D> {
	fn default() -> Self {
		Self {
			jobs: Mutex::new(Vec::new()),
		}
	}
}

impl<C, D> JobQueue<C, D> {
	pub fn create(&self, create: C) {
		self.jobs.lock().push(Job::Create(create));
	}

	pub fn delete(&self, delete: D) {
		self.jobs.lock().push(Job::Delete(delete));
	}

	pub fn take(&self) -> Vec<Job<C, D>> {
		mem::take(&mut *self.jobs.lock())
	}
}

impl<Id: Copy + Eq> JobQueue<Id, Id> {
	/// Take all queued jobs in order. A creation followed by a deletion of the same id cancels out, neither is returned.
	pub fn take_uncancelled(&self) -> Vec<Job<Id, Id>> {
		let mut jobs = self.take().into_iter().map(Some).collect::<Vec<_>>();
		for i in 0..jobs.len() {
			if let Some(Job::Create(id)) = jobs[i] {
				let delete = jobs[i + 1..]
					.iter()
					.position(|job| matches!(job, Some(Job::Delete(deleted)) if *deleted == id));
				if let Some(delete) = delete {
					jobs[i] = None;
					jobs[i + 1 + delete] = None;
				}
			}
		}
		jobs.into_iter().flatten().collect()
	}
}
