use crate::deletion::{DeletionJob, DeletionQueue};
use crate::error::RenderError;
use crate::frame_in_flight::{FrameInFlight, ResourceInFlight, SeedInFlight};
use crate::manager::{Job, JobQueue, UpdateContext};
use crate::manager::gui::GuiWindowUniform;
use crate::params::{NativeWindowEvent, NativeWindowId, NativeWindowUpdate};
use crate::platform::{Extent, FramePlatform, SurfaceProvider, SurfaceRotation};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// Native windows registered and unregistered from any thread, applied during the next draw call.
#[derive(Default)]
pub struct NativeWindowJobs {
	jobs: JobQueue<NativeWindowId, NativeWindowId>,
}

impl NativeWindowJobs {
	pub fn new_native_window(&self, id: NativeWindowId) {
		self.jobs.create(id);
	}

	pub fn delete_native_window(&self, id: NativeWindowId) {
		self.jobs.delete(id);
	}
}

/// A swapchain and everything created per swapchain image.
pub struct WindowSwapchain<P: FramePlatform> {
	pub swapchain: P::Swapchain,
	pub extent: Extent,
	pub rotation: SurfaceRotation,
	pub image_views: SmallVec<[P::ImageView; 4]>,
	pub framebuffers: SmallVec<[P::Framebuffer; 4]>,
	/// Signaled by the main submission, waited upon by the present of that image
	pub render_finished: SmallVec<[P::Semaphore; 4]>,
}

impl<P: FramePlatform> WindowSwapchain<P> {
	fn destroy(self, deletion: &DeletionQueue<P>) {
		deletion.destroy_all(
			self.framebuffers
				.into_iter()
				.map(DeletionJob::Framebuffer)
				.chain(self.image_views.into_iter().map(DeletionJob::ImageView))
				.chain([DeletionJob::Swapchain(self.swapchain)])
				.chain(self.render_finished.into_iter().map(DeletionJob::Semaphore)),
		);
	}
}

pub struct NativeWindow<P: FramePlatform> {
	pub id: NativeWindowId,
	pub surface: P::Surface,
	/// None while the window is minimized
	pub swapchain: Option<WindowSwapchain<P>>,
	/// Signaled by image acquisition, waited upon by the main submission
	pub image_ready: ResourceInFlight<P::Semaphore>,
	/// Acquire or present reported the swapchain no longer matches the surface
	pub out_of_date: bool,
}

impl<P: FramePlatform> NativeWindow<P> {
	pub fn image_ready(&self, frame: FrameInFlight) -> P::Semaphore {
		*self.image_ready.index(frame)
	}

	/// Uniforms of the GUI pass for this window, zeroed while minimized.
	pub fn gui_uniform(&self, update: &NativeWindowUpdate) -> GuiWindowUniform {
		match &self.swapchain {
			Some(swapchain) => GuiWindowUniform::new(swapchain.extent, swapchain.rotation, update.safe_area),
			None => GuiWindowUniform::default(),
		}
	}

	fn destroy(self, deletion: &DeletionQueue<P>) {
		if let Some(swapchain) = self.swapchain {
			swapchain.destroy(deletion);
		}
		deletion.destroy_all(self.image_ready.into_resources().map(DeletionJob::Semaphore));
		deletion.destroy(DeletionJob::Surface(self.surface));
	}
}

pub struct NativeWindowManager<P: FramePlatform> {
	surfaces: Arc<dyn SurfaceProvider<P>>,
	windows: FxHashMap<NativeWindowId, NativeWindow<P>>,
	seed: SeedInFlight,
}

impl<P: FramePlatform> NativeWindowManager<P> {
	pub fn new(surfaces: Arc<dyn SurfaceProvider<P>>, seed: SeedInFlight) -> Self {
		Self {
			surfaces,
			windows: FxHashMap::default(),
			seed,
		}
	}

	pub fn process_jobs(&mut self, ctx: &UpdateContext<P>, jobs: &NativeWindowJobs) -> Result<(), RenderError> {
		for job in jobs.jobs.take_uncancelled() {
			match job {
				Job::Create(id) => {
					assert!(!self.windows.contains_key(&id), "{} created twice", id);
					let window = self.create_window(ctx, id)?;
					log::info!("Created {}", id);
					self.windows.insert(id, window);
				}
				Job::Delete(id) => {
					let window = self
						.windows
						.remove(&id)
						.unwrap_or_else(|| panic!("deleted unknown {}", id));
					window.destroy(ctx.deletion);
					log::info!("Deleted {}", id);
				}
			}
		}
		Ok(())
	}

	fn create_window(&self, ctx: &UpdateContext<P>, id: NativeWindowId) -> Result<NativeWindow<P>, RenderError> {
		let surface = unsafe { self.surfaces.create_surface(ctx.platform, id) }
			.map_err(|source| RenderError::Surface { id: id.0, source })?;
		let image_ready = ResourceInFlight::try_new(self.seed, |frame| unsafe {
			ctx.platform
				.create_semaphore(&format!("{} image ready {}", id, frame.frame_index()))
		});
		let image_ready = match image_ready {
			Ok(image_ready) => image_ready,
			Err(e) => {
				ctx.deletion.destroy(DeletionJob::Surface(surface));
				return Err(RenderError::platform(e));
			}
		};
		let mut window = NativeWindow {
			id,
			surface,
			swapchain: None,
			image_ready,
			out_of_date: false,
		};
		if let Err(e) = Self::rebuild(ctx, &mut window) {
			window.destroy(ctx.deletion);
			return Err(e);
		}
		Ok(window)
	}

	/// Rebuild the swapchains of all windows whose event or out of date flag demands it. Minimized windows are checked
	/// every draw call for having been restored. An event leaves the swapchain untouched if the surface still has the
	/// extent and rotation the swapchain was built with.
	///
	/// # Panics
	/// If an update references a window that was never created.
	pub fn update(&mut self, ctx: &UpdateContext<P>, updates: &[NativeWindowUpdate]) -> Result<(), RenderError> {
		profiling::function_scope!();
		for update in updates {
			let window = self
				.windows
				.get_mut(&update.id)
				.unwrap_or_else(|| panic!("updated unknown {}", update.id));
			if update.event != NativeWindowEvent::None || window.out_of_date || window.swapchain.is_none() {
				Self::rebuild(ctx, window)?;
			}
		}
		Ok(())
	}

	fn rebuild(ctx: &UpdateContext<P>, window: &mut NativeWindow<P>) -> Result<(), RenderError> {
		let platform = ctx.platform;
		let state = unsafe { platform.surface_state(window.surface) }.map_err(RenderError::platform)?;
		let unchanged = window
			.swapchain
			.as_ref()
			.is_some_and(|swapchain| swapchain.extent == state.extent && swapchain.rotation == state.rotation);
		if unchanged && !window.out_of_date {
			return Ok(());
		}
		window.out_of_date = false;
		let old = window.swapchain.take();
		if state.extent.is_empty() {
			if let Some(old) = old {
				log::debug!("{} minimized, releasing its swapchain", window.id);
				old.destroy(ctx.deletion);
			}
			return Ok(());
		}

		let name = format!("{}", window.id);
		let created = unsafe { platform.create_swapchain(window.surface, old.as_ref().map(|s| s.swapchain), &name) };
		if let Some(old) = old {
			old.destroy(ctx.deletion);
		}
		let resources = created.map_err(RenderError::platform)?;
		log::debug!(
			"{} swapchain built with extent {:?} and {:?}",
			window.id,
			resources.extent,
			resources.rotation
		);

		let mut swapchain = WindowSwapchain {
			swapchain: resources.swapchain,
			extent: resources.extent,
			rotation: resources.rotation,
			image_views: resources.image_views,
			framebuffers: resources.framebuffers,
			render_finished: SmallVec::new(),
		};
		for i in 0..swapchain.image_views.len() {
			match unsafe { platform.create_semaphore(&format!("{} render finished {}", name, i)) } {
				Ok(semaphore) => swapchain.render_finished.push(semaphore),
				Err(e) => {
					swapchain.destroy(ctx.deletion);
					return Err(RenderError::platform(e));
				}
			}
		}
		window.swapchain = Some(swapchain);
		Ok(())
	}

	pub fn get(&self, id: NativeWindowId) -> Option<&NativeWindow<P>> {
		self.windows.get(&id)
	}

	pub fn get_mut(&mut self, id: NativeWindowId) -> Option<&mut NativeWindow<P>> {
		self.windows.get_mut(&id)
	}

	pub fn len(&self) -> usize {
		self.windows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.windows.is_empty()
	}

	/// GUI uniforms of every updated window, in order.
	pub fn gui_uniforms(&self, updates: &[NativeWindowUpdate]) -> Vec<GuiWindowUniform> {
		updates
			.iter()
			.map(|update| match self.windows.get(&update.id) {
				Some(window) => window.gui_uniform(update),
				None => GuiWindowUniform::default(),
			})
			.collect()
	}

	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		for (_, window) in self.windows {
			window.destroy(deletion);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::manager::tests::TestContext;
	use crate::platform::SurfaceState;
	use crate::platform::dummy::{DummyHandle, DummyPlatform, DummySurfaceProvider, Kind};
	use std::sync::atomic::AtomicBool;
	use std::sync::atomic::Ordering::Relaxed;

	struct Setup {
		tc: TestContext,
		windows: NativeWindowManager<DummyPlatform>,
		jobs: NativeWindowJobs,
		surface: DummyHandle,
	}

	fn setup(id: NativeWindowId) -> anyhow::Result<Setup> {
		let tc = TestContext::new(2)?;
		let provider = Arc::new(DummySurfaceProvider::default());
		let surface = tc.platform.add_surface(Extent::new(640, 480));
		provider.register(id, surface);
		let windows = NativeWindowManager::new(provider, tc.seed);
		let jobs = NativeWindowJobs::default();
		jobs.new_native_window(id);
		Ok(Setup {
			tc,
			windows,
			jobs,
			surface,
		})
	}

	#[test]
	fn create_and_delete() -> anyhow::Result<()> {
		let id = NativeWindowId(1);
		let Setup {
			mut tc,
			mut windows,
			jobs,
			surface,
		} = setup(id)?;
		windows.process_jobs(&tc.ctx(0), &jobs)?;
		let window = windows.get(id).unwrap();
		let swapchain = window.swapchain.as_ref().unwrap();
		assert_eq!(swapchain.extent, Extent::new(640, 480));
		assert_eq!(swapchain.render_finished.len(), 3);
		assert_eq!(tc.platform.live_count(Kind::Semaphore), 2 + 3);

		jobs.delete_native_window(id);
		windows.process_jobs(&tc.ctx(1), &jobs)?;
		assert!(windows.is_empty());
		assert!(!tc.platform.is_destroyed(Kind::Surface, surface.0));
		tc.finish()?;
		assert!(tc.platform.is_destroyed(Kind::Surface, surface.0));
		Ok(())
	}

	#[test]
	fn resize_chains_old_swapchain() -> anyhow::Result<()> {
		let id = NativeWindowId(1);
		let Setup {
			mut tc,
			mut windows,
			jobs,
			surface,
		} = setup(id)?;
		windows.process_jobs(&tc.ctx(0), &jobs)?;
		let old = windows.get(id).unwrap().swapchain.as_ref().unwrap().swapchain;

		windows.update(&tc.ctx(0), &[NativeWindowUpdate::new(id)])?;
		assert_eq!(windows.get(id).unwrap().swapchain.as_ref().unwrap().swapchain, old);
		assert_eq!(tc.deletion.pending_jobs(), 0);

		tc.platform.set_surface_state(
			surface,
			SurfaceState {
				extent: Extent::new(800, 600),
				rotation: SurfaceRotation::Identity,
			},
		);
		let mut update = NativeWindowUpdate::new(id);
		update.event = NativeWindowEvent::Resize;
		windows.update(&tc.ctx(1), &[update])?;
		let swapchain = windows.get(id).unwrap().swapchain.as_ref().unwrap();
		assert_ne!(swapchain.swapchain, old);
		assert_eq!(swapchain.extent, Extent::new(800, 600));
		// 3 framebuffers, 3 views, the swapchain and 3 semaphores
		assert_eq!(tc.deletion.pending_jobs(), 10);
		assert!(!tc.platform.is_destroyed(Kind::Swapchain, old.0));

		windows.destroy(&tc.deletion);
		tc.finish()?;
		assert!(tc.platform.is_destroyed(Kind::Swapchain, old.0));
		Ok(())
	}

	#[test]
	fn resize_to_same_extent_keeps_swapchain() -> anyhow::Result<()> {
		let id = NativeWindowId(3);
		let Setup {
			mut tc,
			mut windows,
			jobs,
			..
		} = setup(id)?;
		windows.process_jobs(&tc.ctx(0), &jobs)?;
		let old = windows.get(id).unwrap().swapchain.as_ref().unwrap().swapchain;

		for (frame, event) in [(1, NativeWindowEvent::Resize), (0, NativeWindowEvent::Restore)] {
			let mut update = NativeWindowUpdate::new(id);
			update.event = event;
			windows.update(&tc.ctx(frame), &[update])?;
			assert_eq!(windows.get(id).unwrap().swapchain.as_ref().unwrap().swapchain, old);
		}
		assert_eq!(tc.deletion.pending_jobs(), 0);
		assert_eq!(tc.platform.live_count(Kind::Swapchain), 1);

		windows.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	fn create_and_delete_from_another_thread() -> anyhow::Result<()> {
		let mut tc = TestContext::new(2)?;
		let provider = Arc::new(DummySurfaceProvider::default());
		let ids = (0..200).map(NativeWindowId).collect::<Vec<_>>();
		let surfaces = ids
			.iter()
			.map(|id| {
				let surface = tc.platform.add_surface(Extent::new(16, 16));
				provider.register(*id, surface);
				surface
			})
			.collect::<Vec<_>>();
		let mut windows = NativeWindowManager::new(provider, tc.seed);
		let jobs = NativeWindowJobs::default();
		let done = AtomicBool::new(false);
		std::thread::scope(|s| -> anyhow::Result<()> {
			s.spawn(|| {
				for id in &ids {
					jobs.new_native_window(*id);
					jobs.delete_native_window(*id);
				}
				done.store(true, Relaxed);
			});
			while !done.load(Relaxed) {
				windows.process_jobs(&tc.ctx(0), &jobs)?;
			}
			Ok(())
		})?;
		windows.process_jobs(&tc.ctx(1), &jobs)?;
		assert!(windows.is_empty());

		// surfaces of windows cancelled before their creation were never handed out
		unsafe {
			tc.deletion.flush_all_jobs(&tc.platform)?;
			for surface in surfaces {
				if !tc.platform.is_destroyed(Kind::Surface, surface.0) {
					tc.platform.destroy_surface(surface);
				}
			}
		}
		tc.finish()
	}

	#[test]
	fn out_of_date_rebuilds_once() -> anyhow::Result<()> {
		let id = NativeWindowId(4);
		let Setup {
			mut tc,
			mut windows,
			jobs,
			..
		} = setup(id)?;
		windows.process_jobs(&tc.ctx(0), &jobs)?;
		windows.get_mut(id).unwrap().out_of_date = true;

		windows.update(&tc.ctx(1), &[NativeWindowUpdate::new(id)])?;
		assert!(!windows.get(id).unwrap().out_of_date);
		assert_eq!(tc.platform.live_count(Kind::Swapchain), 2);
		windows.update(&tc.ctx(0), &[NativeWindowUpdate::new(id)])?;
		assert_eq!(tc.platform.live_count(Kind::Swapchain), 2);

		windows.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	fn minimize_and_restore() -> anyhow::Result<()> {
		let id = NativeWindowId(2);
		let Setup {
			mut tc,
			mut windows,
			jobs,
			surface,
		} = setup(id)?;
		windows.process_jobs(&tc.ctx(0), &jobs)?;

		tc.platform.set_surface_state(surface, SurfaceState::default());
		let mut update = NativeWindowUpdate::new(id);
		update.event = NativeWindowEvent::Resize;
		windows.update(&tc.ctx(1), &[update])?;
		assert!(windows.get(id).unwrap().swapchain.is_none());
		assert_eq!(windows.gui_uniforms(&[update]), [GuiWindowUniform::default()]);

		tc.platform.set_surface_state(
			surface,
			SurfaceState {
				extent: Extent::new(100, 200),
				rotation: SurfaceRotation::Rotate90,
			},
		);
		update.event = NativeWindowEvent::Restore;
		windows.update(&tc.ctx(0), &[update])?;
		let uniforms = windows.gui_uniforms(&[update]);
		assert_eq!(uniforms[0].extent, glam::Vec2::new(200., 100.));

		windows.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	fn missing_surface_is_an_error() -> anyhow::Result<()> {
		let Setup {
			mut tc,
			mut windows,
			jobs,
			..
		} = setup(NativeWindowId(1))?;
		jobs.new_native_window(NativeWindowId(2));
		let result = windows.process_jobs(&tc.ctx(0), &jobs);
		assert!(matches!(result, Err(RenderError::Surface { id: 2, .. })));
		windows.destroy(&tc.deletion);
		unsafe { tc.deletion.flush_all_jobs(&tc.platform)? };
		assert_eq!(tc.platform.live_count(Kind::Swapchain), 0);
		Ok(())
	}
}
