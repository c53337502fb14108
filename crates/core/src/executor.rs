//! Where draw calls run: directly on the caller thread or on a dedicated rendering thread.

use crate::error::RenderError;
use crate::orchestrator::FrameOrchestrator;
use crate::params::DrawParams;
use crate::platform::FramePlatform;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

pub const RENDERING_THREAD_NAME: &str = "RenderingThread";

/// Runs draw calls on a [`FrameOrchestrator`], selected by [`ThreadingMode`].
///
/// [`ThreadingMode`]: crate::renderer::ThreadingMode
pub trait DrawExecutor<P: FramePlatform>: Send {
	fn draw(&mut self, params: DrawParams) -> Result<(), RenderError>;

	/// Block until every draw call handed to this executor has been submitted.
	fn wait_idle(&mut self) -> Result<(), RenderError>;

	/// Stop executing and hand back the orchestrator for teardown.
	fn shutdown(self: Box<Self>) -> Result<FrameOrchestrator<P>, RenderError>;
}

pub struct SynchronousExecutor<P: FramePlatform> {
	orchestrator: FrameOrchestrator<P>,
}

impl<P: FramePlatform> SynchronousExecutor<P> {
	pub fn new(orchestrator: FrameOrchestrator<P>) -> Self {
		Self { orchestrator }
	}
}

impl<P: FramePlatform> DrawExecutor<P> for SynchronousExecutor<P> {
	fn draw(&mut self, params: DrawParams) -> Result<(), RenderError> {
		self.orchestrator.draw(&params)
	}

	fn wait_idle(&mut self) -> Result<(), RenderError> {
		match self.orchestrator.is_poisoned() {
			true => Err(RenderError::Poisoned),
			false => Ok(()),
		}
	}

	fn shutdown(self: Box<Self>) -> Result<FrameOrchestrator<P>, RenderError> {
		Ok(self.orchestrator)
	}
}

/// The single job slot shared between the producer and the rendering thread.
#[derive(Default)]
struct Slot {
	params: Option<DrawParams>,
	/// The rendering thread is currently drawing
	busy: bool,
	/// Fatal error of the rendering thread, not yet reported to the producer
	error: Option<RenderError>,
	shutdown: bool,
}

#[derive(Default)]
struct Channel {
	slot: Mutex<Slot>,
	job_ready: Condvar,
	slot_free: Condvar,
}

/// Hands draw calls over to a dedicated rendering thread. [`Self::draw`] returns as soon as the params are placed in the
/// job slot, and only blocks if the previous params were not yet picked up. Errors of the rendering thread are reported
/// by the next call.
pub struct ThreadedExecutor<P: FramePlatform> {
	channel: Arc<Channel>,
	worker: Option<thread::JoinHandle<FrameOrchestrator<P>>>,
	poisoned: bool,
}

impl<P: FramePlatform> ThreadedExecutor<P> {
	pub fn new(orchestrator: FrameOrchestrator<P>) -> Result<Self, RenderError> {
		let channel = Arc::new(Channel::default());
		let worker = thread::Builder::new()
			.name(RENDERING_THREAD_NAME.into())
			.spawn({
				let channel = channel.clone();
				move || Self::worker_main(&channel, orchestrator)
			})
			.map_err(|e| RenderError::RenderThread(format!("failed to spawn {}: {}", RENDERING_THREAD_NAME, e)))?;
		Ok(Self {
			channel,
			worker: Some(worker),
			poisoned: false,
		})
	}

	fn worker_main(channel: &Channel, mut orchestrator: FrameOrchestrator<P>) -> FrameOrchestrator<P> {
		profiling::register_thread!(RENDERING_THREAD_NAME);
		loop {
			let params = {
				let mut slot = channel.slot.lock();
				loop {
					if let Some(params) = slot.params.take() {
						slot.busy = true;
						break params;
					}
					if slot.shutdown {
						return orchestrator;
					}
					channel.job_ready.wait(&mut slot);
				}
			};
			channel.slot_free.notify_all();

			let result = panic::catch_unwind(AssertUnwindSafe(|| orchestrator.draw(&params)));
			let error = match result {
				Ok(Ok(())) => None,
				Ok(Err(e)) => Some(e),
				Err(payload) => {
					let msg = panic_message(payload.as_ref());
					log::error!("{} panicked: {}", RENDERING_THREAD_NAME, msg);
					orchestrator.poison();
					Some(RenderError::RenderThread(msg))
				}
			};

			let mut slot = channel.slot.lock();
			slot.busy = false;
			if let Some(error) = error {
				slot.error.get_or_insert(error);
			}
			drop(slot);
			channel.slot_free.notify_all();
		}
	}

	fn take_error(&mut self, slot: &mut Slot) -> Result<(), RenderError> {
		if self.poisoned {
			return Err(RenderError::Poisoned);
		}
		match slot.error.take() {
			None => Ok(()),
			Some(e) => {
				self.poisoned = true;
				Err(e)
			}
		}
	}

	fn join(&mut self) -> Result<FrameOrchestrator<P>, RenderError> {
		let worker = self
			.worker
			.take()
			.ok_or_else(|| RenderError::RenderThread(format!("{} is gone", RENDERING_THREAD_NAME)))?;
		self.channel.slot.lock().shutdown = true;
		self.channel.job_ready.notify_all();
		worker
			.join()
			.map_err(|payload| RenderError::RenderThread(panic_message(payload.as_ref())))
	}
}

impl<P: FramePlatform> DrawExecutor<P> for ThreadedExecutor<P> {
	fn draw(&mut self, params: DrawParams) -> Result<(), RenderError> {
		profiling::function_scope!();
		let channel = self.channel.clone();
		let mut slot = channel.slot.lock();
		while slot.params.is_some() {
			channel.slot_free.wait(&mut slot);
		}
		self.take_error(&mut slot)?;
		slot.params = Some(params);
		drop(slot);
		channel.job_ready.notify_one();
		Ok(())
	}

	fn wait_idle(&mut self) -> Result<(), RenderError> {
		profiling::function_scope!();
		let channel = self.channel.clone();
		let mut slot = channel.slot.lock();
		while slot.params.is_some() || slot.busy {
			channel.slot_free.wait(&mut slot);
		}
		self.take_error(&mut slot)
	}

	fn shutdown(mut self: Box<Self>) -> Result<FrameOrchestrator<P>, RenderError> {
		self.join()
	}
}

impl<P: FramePlatform> Drop for ThreadedExecutor<P> {
	fn drop(&mut self) {
		if self.worker.is_some() {
			log::warn!("{} dropped without shutdown, its resources are leaked", RENDERING_THREAD_NAME);
			if let Err(e) = self.join() {
				log::error!("{}", e);
			}
		}
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&str>() {
		msg.to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"unknown panic payload".into()
	}
}
