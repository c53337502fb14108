//! # Deferred deletion
//! GPU resources may still be read by submitted work when the CPU decides to drop them, so they are never destroyed
//! directly. Instead they are handed to the [`DeletionQueue`] as a [`DeletionJob`] and destroyed later:
//! * *tick-deferred* jobs queued with [`DeletionQueue::destroy`] run once the frame in flight slot that was current when
//!   they were queued comes around again, which is when all work that may have referenced them has completed.
//! * *fence-gated* jobs queued with [`DeletionQueue::destroy_fenced`] run once their fence signals, for resources used
//!   by submissions outside the regular frame cadence.

mod ab;

use crate::deletion::ab::{AB, ABArray};
use crate::error::RenderError;
use crate::frame_in_flight::{FrameInFlight, ResourceInFlight, SeedInFlight};
use crate::platform::{FenceStatus, FramePlatform, WaitResult};
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::mem;
use std::time::Duration;

/// A resource waiting for destruction. Owning the handle ensures it is destroyed at most once.
pub enum DeletionJob<P: FramePlatform> {
	Buffer(P::Buffer),
	Image(P::Image),
	ImageView(P::ImageView),
	Framebuffer(P::Framebuffer),
	DescriptorPool(P::DescriptorPool),
	CommandPool(P::CommandPool),
	Semaphore(P::Semaphore),
	Fence(P::Fence),
	Swapchain(P::Swapchain),
	Surface(P::Surface),
	Custom(Box<dyn FnOnce(&P) + Send + 'static>),
}

impl<P: FramePlatform> DeletionJob<P> {
	pub fn custom(f: impl FnOnce(&P) + Send + 'static) -> Self {
		Self::Custom(Box::new(f))
	}

	/// # Safety
	/// The resource must not be in use by the device anymore.
	pub unsafe fn execute(self, platform: &P) {
		unsafe {
			match self {
				DeletionJob::Buffer(b) => platform.destroy_buffer(b),
				DeletionJob::Image(i) => platform.destroy_image(i),
				DeletionJob::ImageView(v) => platform.destroy_image_view(v),
				DeletionJob::Framebuffer(f) => platform.destroy_framebuffer(f),
				DeletionJob::DescriptorPool(d) => platform.destroy_descriptor_pool(d),
				DeletionJob::CommandPool(c) => platform.destroy_command_pool(c),
				DeletionJob::Semaphore(s) => platform.destroy_semaphore(s),
				DeletionJob::Fence(f) => platform.destroy_fence(f),
				DeletionJob::Swapchain(s) => platform.destroy_swapchain(s),
				DeletionJob::Surface(s) => platform.destroy_surface(s),
				DeletionJob::Custom(f) => f(platform),
			}
		}
	}
}

impl<P: FramePlatform> Debug for DeletionJob<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			DeletionJob::Buffer(b) => f.debug_tuple("Buffer").field(b).finish(),
			DeletionJob::Image(i) => f.debug_tuple("Image").field(i).finish(),
			DeletionJob::ImageView(v) => f.debug_tuple("ImageView").field(v).finish(),
			DeletionJob::Framebuffer(fb) => f.debug_tuple("Framebuffer").field(fb).finish(),
			DeletionJob::DescriptorPool(d) => f.debug_tuple("DescriptorPool").field(d).finish(),
			DeletionJob::CommandPool(c) => f.debug_tuple("CommandPool").field(c).finish(),
			DeletionJob::Semaphore(s) => f.debug_tuple("Semaphore").field(s).finish(),
			DeletionJob::Fence(fence) => f.debug_tuple("Fence").field(fence).finish(),
			DeletionJob::Swapchain(s) => f.debug_tuple("Swapchain").field(s).finish(),
			DeletionJob::Surface(s) => f.debug_tuple("Surface").field(s).finish(),
			DeletionJob::Custom(_) => f.write_str("Custom"),
		}
	}
}

/// A job gated by a fence. The fence is destroyed together with the job.
pub struct FencedJob<P: FramePlatform> {
	pub fence: P::Fence,
	pub job: DeletionJob<P>,
}

impl<P: FramePlatform> Debug for FencedJob<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FencedJob")
			.field("fence", &self.fence)
			.field("job", &self.job)
			.finish()
	}
}

struct Queues<P: FramePlatform> {
	/// jobs queued since the last tick
	live: Vec<DeletionJob<P>>,
	/// jobs queued during the tick that last ran on each slot
	slots: ResourceInFlight<Vec<DeletionJob<P>>>,
	fenced: ABArray<Vec<FencedJob<P>>>,
	fenced_current: AB,
}

pub struct DeletionQueue<P: FramePlatform> {
	queues: Mutex<Queues<P>>,
}

impl<P: FramePlatform> DeletionQueue<P> {
	pub fn new(seed: SeedInFlight) -> Self {
		Self {
			queues: Mutex::new(Queues {
				live: Vec::new(),
				slots: ResourceInFlight::new(seed, |_| Vec::new()),
				fenced: ABArray::new(Vec::new),
				fenced_current: AB::A,
			}),
		}
	}

	pub fn seed(&self) -> SeedInFlight {
		self.queues.lock().slots.seed()
	}

	/// Queue a job to be executed once the frame in flight slot of the current draw call comes around again.
	pub fn destroy(&self, job: DeletionJob<P>) {
		self.queues.lock().live.push(job);
	}

	pub fn destroy_all(&self, jobs: impl IntoIterator<Item = DeletionJob<P>>) {
		self.queues.lock().live.extend(jobs);
	}

	/// Queue a job to be executed once `fence` has signaled. The fence is destroyed afterwards.
	pub fn destroy_fenced(&self, fence: P::Fence, job: DeletionJob<P>) {
		let mut queues = self.queues.lock();
		let current = queues.fenced_current;
		queues.fenced[current].push(FencedJob { fence, job });
	}

	pub fn pending_jobs(&self) -> usize {
		let queues = self.queues.lock();
		queues.live.len() + queues.slots.iter().map(Vec::len).sum::<usize>()
	}

	pub fn pending_fenced_jobs(&self) -> usize {
		let queues = self.queues.lock();
		queues.fenced.iter().map(Vec::len).sum()
	}

	/// Execute all jobs queued the last time `frame` was current, then move all jobs queued since into its slot.
	/// Afterwards scans the fence-gated jobs and executes those whose fence has signaled.
	///
	/// # Safety
	/// Must be called exactly once per draw call, after all work submitted `frames_in_flight` draw calls ago has
	/// completed.
	pub unsafe fn execute_tick(&self, platform: &P, frame: FrameInFlight) -> Result<(), RenderError> {
		profiling::function_scope!();
		let expired = {
			let mut queues = self.queues.lock();
			let live = mem::take(&mut queues.live);
			mem::replace(queues.slots.index_mut(frame), live)
		};
		if !expired.is_empty() {
			log::debug!("Destroying {} resources of {:?}", expired.len(), frame);
		}
		for job in expired {
			unsafe { job.execute(platform) };
		}
		unsafe { self.execute_fenced(platform) }
	}

	unsafe fn execute_fenced(&self, platform: &P) -> Result<(), RenderError> {
		let (current_ab, current) = {
			let mut queues = self.queues.lock();
			let current_ab = queues.fenced_current;
			(current_ab, mem::take(&mut queues.fenced[current_ab]))
		};
		if current.is_empty() {
			return Ok(());
		}

		let mut carried = Vec::new();
		let mut result = Ok(());
		let mut jobs = current.into_iter();
		for fenced in jobs.by_ref() {
			match unsafe { platform.fence_status(fenced.fence) } {
				Ok(FenceStatus::Signaled) => unsafe {
					fenced.job.execute(platform);
					platform.destroy_fence(fenced.fence);
				},
				Ok(FenceStatus::NotReady) => carried.push(fenced),
				Err(e) => {
					carried.push(fenced);
					result = Err(RenderError::device_lost(e));
					break;
				}
			}
		}
		carried.extend(jobs);

		let mut queues = self.queues.lock();
		let (current, next) = queues.fenced.split_mut(current_ab);
		next.append(&mut carried);
		// jobs queued by other threads while the lock was released
		next.append(current);
		queues.fenced_current = !current_ab;
		result
	}

	/// Execute every queued job, blocking on all outstanding fences. Only for teardown.
	///
	/// # Safety
	/// The device must be idle, apart from fence-gated work.
	pub unsafe fn flush_all_jobs(&self, platform: &P) -> Result<(), RenderError> {
		profiling::function_scope!();
		let (jobs, fenced) = {
			let mut queues = self.queues.lock();
			let mut jobs = Vec::new();
			for slot in queues.slots.iter_mut() {
				jobs.append(slot);
			}
			jobs.append(&mut queues.live);
			let mut fenced = Vec::new();
			let current = queues.fenced_current;
			let (a, b) = queues.fenced.split_mut(current);
			fenced.append(a);
			fenced.append(b);
			(jobs, fenced)
		};
		log::debug!("Flushing {} resources and {} fenced resources", jobs.len(), fenced.len());

		let mut result = Ok(());
		for fenced in fenced {
			if result.is_ok() {
				match unsafe { platform.wait_for_fence(fenced.fence, Duration::MAX) } {
					Ok(WaitResult::Signaled) => (),
					Ok(WaitResult::Timeout) => {
						result = Err(RenderError::DeviceTimeout {
							what: "fenced deletion",
							timeout: Duration::MAX,
						})
					}
					Err(e) => result = Err(RenderError::device_lost(e)),
				}
			}
			unsafe {
				fenced.job.execute(platform);
				platform.destroy_fence(fenced.fence);
			}
		}
		for job in jobs {
			unsafe { job.execute(platform) };
		}
		result
	}
}

impl<P: FramePlatform> Drop for DeletionQueue<P> {
	fn drop(&mut self) {
		let pending = self.pending_jobs() + self.pending_fenced_jobs();
		if pending != 0 {
			log::error!("DeletionQueue dropped with {} jobs remaining, leaking their resources", pending);
		}
	}
}
