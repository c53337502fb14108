use crate::deletion::{DeletionJob, DeletionQueue};
use crate::error::RenderError;
use crate::executor::{DrawExecutor, SynchronousExecutor, ThreadedExecutor};
use crate::frame_in_flight::{FRAMES_LIMIT, SeedInFlight};
use crate::manager::gui::{DEFAULT_MIN_GUI_INDEX_CAPACITY, DEFAULT_MIN_GUI_VERTEX_CAPACITY, DEFAULT_MIN_GUI_WINDOW_CAPACITY};
use crate::manager::line::DEFAULT_MIN_LINE_VERTEX_CAPACITY;
use crate::manager::native_window::NativeWindowJobs;
use crate::manager::object_data::DEFAULT_MIN_OBJECT_CAPACITY;
use crate::manager::texture::TextureJobs;
use crate::manager::viewport::ViewportJobs;
use crate::orchestrator::{FrameOrchestrator, PassRecorder};
use crate::params::{DrawParams, NativeWindowId, TextureId, ViewportId};
use crate::platform::{FramePlatform, SurfaceProvider};
use crate::staging::DEFAULT_STAGING_CAPACITY;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;
use std::time::Duration;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum ThreadingMode {
	/// Draw calls run on the thread calling [`Renderer::draw`]
	Synchronous,
	/// Draw calls are handed to a dedicated rendering thread
	#[default]
	Threaded,
}

#[derive(Copy, Clone, Debug)]
pub struct RendererCreateInfo {
	/// Must be within `2..=4`
	pub frames_in_flight: u32,
	pub threading: ThreadingMode,
	/// Size of the staging buffer of each frame in flight, must fit all texture uploads of a single draw call
	pub staging_capacity: u64,
	pub fence_timeout: Duration,
	pub acquire_timeout: Duration,
	pub min_object_capacity: u64,
	pub min_gui_vertex_capacity: u64,
	pub min_gui_index_capacity: u64,
	pub min_gui_window_capacity: u64,
	pub min_line_vertex_capacity: u64,
	/// Viewport render targets are sampled by the GUI pass instead of copied from
	pub editor_mode: bool,
}

impl Default for RendererCreateInfo {
	fn default() -> Self {
		Self {
			frames_in_flight: 3,
			threading: ThreadingMode::default(),
			staging_capacity: DEFAULT_STAGING_CAPACITY,
			fence_timeout: Duration::from_secs(3),
			acquire_timeout: Duration::from_secs(3),
			min_object_capacity: DEFAULT_MIN_OBJECT_CAPACITY,
			min_gui_vertex_capacity: DEFAULT_MIN_GUI_VERTEX_CAPACITY,
			min_gui_index_capacity: DEFAULT_MIN_GUI_INDEX_CAPACITY,
			min_gui_window_capacity: DEFAULT_MIN_GUI_WINDOW_CAPACITY,
			min_line_vertex_capacity: DEFAULT_MIN_LINE_VERTEX_CAPACITY,
			editor_mode: false,
		}
	}
}

/// State shared between the [`Renderer`] handle and the thread drawing, every queue is safe to push to from any
/// thread.
pub struct RendererShared<P: FramePlatform> {
	pub platform: P,
	pub deletion: DeletionQueue<P>,
	pub native_window_jobs: NativeWindowJobs,
	pub viewport_jobs: ViewportJobs,
	pub texture_jobs: TextureJobs,
	tick_count: AtomicU64,
}

impl<P: FramePlatform> RendererShared<P> {
	pub fn new(platform: P, ci: &RendererCreateInfo) -> Self {
		assert!(
			(2..=FRAMES_LIMIT).contains(&ci.frames_in_flight),
			"frames_in_flight must be within 2..={}, got {}",
			FRAMES_LIMIT,
			ci.frames_in_flight
		);
		Self {
			platform,
			deletion: DeletionQueue::new(SeedInFlight::new(ci.frames_in_flight)),
			native_window_jobs: NativeWindowJobs::default(),
			viewport_jobs: ViewportJobs::default(),
			texture_jobs: TextureJobs::default(),
			tick_count: AtomicU64::new(0),
		}
	}

	pub fn seed(&self) -> SeedInFlight {
		self.deletion.seed()
	}

	/// Number of draw calls that completed successfully.
	pub fn tick_count(&self) -> u64 {
		self.tick_count.load(Relaxed)
	}

	pub(crate) fn increment_tick_count(&self) {
		self.tick_count.fetch_add(1, Relaxed);
	}
}

/// The renderer front end. Creating and deleting viewports, native windows and textures is thread-safe and applied at
/// the start of the next draw call. Dropping it waits for the device and releases everything.
pub struct Renderer<P: FramePlatform> {
	shared: Arc<RendererShared<P>>,
	executor: Mutex<Option<Box<dyn DrawExecutor<P>>>>,
}

impl<P: FramePlatform> Renderer<P> {
	pub fn new(
		platform: P,
		surfaces: Arc<dyn SurfaceProvider<P>>,
		recorder: Box<dyn PassRecorder<P>>,
		ci: RendererCreateInfo,
	) -> Result<Self, RenderError> {
		let shared = Arc::new(RendererShared::new(platform, &ci));
		let orchestrator = FrameOrchestrator::new(shared.clone(), surfaces, recorder, &ci)?;
		let executor: Box<dyn DrawExecutor<P>> = match ci.threading {
			ThreadingMode::Synchronous => Box::new(SynchronousExecutor::new(orchestrator)),
			ThreadingMode::Threaded => Box::new(ThreadedExecutor::new(orchestrator)?),
		};
		log::info!(
			"Created renderer with {} frames in flight, {:?}",
			ci.frames_in_flight,
			ci.threading
		);
		Ok(Self {
			shared,
			executor: Mutex::new(Some(executor)),
		})
	}

	pub fn shared(&self) -> &Arc<RendererShared<P>> {
		&self.shared
	}

	pub fn platform(&self) -> &P {
		&self.shared.platform
	}

	pub fn frames_in_flight(&self) -> u32 {
		self.shared.seed().frames_in_flight()
	}

	pub fn tick_count(&self) -> u64 {
		self.shared.tick_count()
	}

	pub fn new_viewport(&self) -> ViewportId {
		self.shared.viewport_jobs.new_viewport()
	}

	pub fn delete_viewport(&self, id: ViewportId) {
		self.shared.viewport_jobs.delete_viewport(id);
	}

	/// The window must have been registered with the [`SurfaceProvider`] under the same id.
	pub fn new_native_window(&self, id: NativeWindowId) {
		self.shared.native_window_jobs.new_native_window(id);
	}

	pub fn delete_native_window(&self, id: NativeWindowId) {
		self.shared.native_window_jobs.delete_native_window(id);
	}

	pub fn new_font_texture(&self, id: TextureId, width: u32, height: u32, pitch: u32, data: &[u8]) {
		self.shared.texture_jobs.new_font_texture(id, width, height, pitch, data);
	}

	pub fn new_texture(&self, id: TextureId, width: u32, height: u32, rgba8: &[u8]) {
		self.shared.texture_jobs.new_texture(id, width, height, rgba8);
	}

	pub fn delete_texture(&self, id: TextureId) {
		self.shared.texture_jobs.delete_texture(id);
	}

	/// Destroy a resource once no draw call in flight may use it anymore.
	pub fn destroy(&self, job: DeletionJob<P>) {
		self.shared.deletion.destroy(job);
	}

	/// Destroy a resource once `fence` has signaled. The fence is destroyed with it.
	pub fn destroy_fenced(&self, fence: P::Fence, job: DeletionJob<P>) {
		self.shared.deletion.destroy_fenced(fence, job);
	}

	/// Render a frame. With [`ThreadingMode::Threaded`] this returns as soon as the rendering thread accepted the
	/// params, errors of that draw call are returned by the next call.
	pub fn draw(&self, params: DrawParams) -> Result<(), RenderError> {
		match self.executor.lock().as_mut() {
			Some(executor) => executor.draw(params),
			None => Err(RenderError::Poisoned),
		}
	}

	/// Block until all previous draw calls were submitted.
	pub fn wait_idle(&self) -> Result<(), RenderError> {
		match self.executor.lock().as_mut() {
			Some(executor) => executor.wait_idle(),
			None => Err(RenderError::Poisoned),
		}
	}
}

impl<P: FramePlatform> Drop for Renderer<P> {
	fn drop(&mut self) {
		profiling::function_scope!();
		let Some(executor) = self.executor.get_mut().take() else {
			return;
		};
		let orchestrator = executor
			.shutdown()
			.inspect_err(|e| log::error!("Failed to shut down draw executor, leaking its resources: {}", e))
			.ok();
		let platform = &self.shared.platform;
		unsafe {
			if let Err(e) = platform.wait_idle() {
				log::error!("Failed to wait for device idle during teardown: {}", e);
			}
			if let Some(orchestrator) = orchestrator {
				orchestrator.destroy(&self.shared.deletion);
			}
			if let Err(e) = self.shared.deletion.flush_all_jobs(platform) {
				log::error!("Failed to flush deletion queue during teardown: {}", e);
			}
		}
		log::info!("Destroyed renderer after {} draw calls", self.tick_count());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::orchestrator::NoopRecorder;
	use crate::params::{NativeWindowEvent, NativeWindowUpdate, ViewportUpdate};
	use crate::platform::Extent;
	use crate::platform::dummy::{DummyPlatform, DummySurfaceProvider, Kind};

	fn renderer(
		threading: ThreadingMode,
	) -> anyhow::Result<(Renderer<DummyPlatform>, Arc<DummySurfaceProvider>)> {
		let surfaces = Arc::new(DummySurfaceProvider::default());
		let renderer = Renderer::new(
			DummyPlatform::default(),
			surfaces.clone(),
			Box::new(NoopRecorder),
			RendererCreateInfo {
				threading,
				..RendererCreateInfo::default()
			},
		)?;
		Ok((renderer, surfaces))
	}

	fn lifecycle(threading: ThreadingMode) -> anyhow::Result<()> {
		let (renderer, surfaces) = renderer(threading)?;
		let window = NativeWindowId(3);
		surfaces.register(window, renderer.platform().add_surface(Extent::new(640, 480)));
		renderer.new_native_window(window);
		let viewport = renderer.new_viewport();
		let texture = TextureId(1);
		renderer.new_texture(texture, 2, 2, &[255; 16]);
		renderer.new_font_texture(TextureId(2), 3, 2, 4, &[1; 8]);

		let mut params = DrawParams {
			texture_ids: vec![texture],
			viewport_updates: vec![ViewportUpdate::new(viewport, 320, 240)],
			native_window_updates: vec![NativeWindowUpdate::new(window)],
			..DrawParams::default()
		};
		for i in 0..8 {
			params.viewport_updates[0].width = 320 + i % 2;
			params.native_window_updates[0].event = match i {
				4 => NativeWindowEvent::Resize,
				_ => NativeWindowEvent::None,
			};
			renderer.draw(params.clone())?;
		}
		renderer.wait_idle()?;
		assert_eq!(renderer.tick_count(), 8);

		renderer.delete_texture(TextureId(2));
		renderer.delete_viewport(viewport);
		renderer.delete_native_window(window);
		for _ in 0..=renderer.frames_in_flight() {
			renderer.draw(DrawParams {
				texture_ids: vec![texture],
				..DrawParams::default()
			})?;
		}
		renderer.wait_idle()?;
		assert_eq!(renderer.platform().live_count(Kind::Swapchain), 0);
		assert_eq!(renderer.platform().live_count(Kind::Surface), 0);
		assert_eq!(renderer.platform().live_count(Kind::Image), 1);

		let shared = renderer.shared().clone();
		drop(renderer);
		assert_eq!(shared.platform.live_total(), 0, "leaked resources");
		assert_eq!(shared.deletion.pending_jobs(), 0);
		Ok(())
	}

	#[test]
	fn lifecycle_synchronous() -> anyhow::Result<()> {
		lifecycle(ThreadingMode::Synchronous)
	}

	#[test]
	fn lifecycle_threaded() -> anyhow::Result<()> {
		lifecycle(ThreadingMode::Threaded)
	}

	#[test]
	fn device_lost_poisons() -> anyhow::Result<()> {
		let (renderer, _surfaces) = renderer(ThreadingMode::Synchronous)?;
		renderer.draw(DrawParams::default())?;
		*renderer.platform().device_lost.lock() = true;
		assert!(renderer.draw(DrawParams::default()).is_err());
		assert!(matches!(renderer.draw(DrawParams::default()), Err(RenderError::Poisoned)));
		assert_eq!(renderer.tick_count(), 1);

		*renderer.platform().device_lost.lock() = false;
		let shared = renderer.shared().clone();
		drop(renderer);
		assert_eq!(shared.platform.live_total(), 0, "leaked resources");
		Ok(())
	}

	#[test]
	fn defaults() {
		let ci = RendererCreateInfo::default();
		assert_eq!(ci.frames_in_flight, 3);
		assert_eq!(ci.threading, ThreadingMode::Threaded);
		assert_eq!(ci.staging_capacity, 4 * 1024 * 1024);
		assert_eq!(ci.fence_timeout, Duration::from_secs(3));
		assert_eq!(ci.min_object_capacity, 256);
		assert_eq!(ci.min_gui_vertex_capacity, 2048);
		assert_eq!(ci.min_gui_window_capacity, 8);
	}

	#[test]
	#[should_panic(expected = "frames_in_flight must be within")]
	fn one_frame_in_flight_panics() {
		RendererShared::new(
			DummyPlatform::default(),
			&RendererCreateInfo {
				frames_in_flight: 1,
				..RendererCreateInfo::default()
			},
		);
	}
}
