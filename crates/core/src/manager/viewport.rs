use crate::deletion::{DeletionJob, DeletionQueue};
use crate::error::RenderError;
use crate::frame_in_flight::{FrameInFlight, SeedInFlight};
use crate::manager::{Job, JobQueue, UpdateContext};
use crate::manager::per_frame::{BufferBinding, PerFrameBuffer, PerFrameBufferCreateInfo};
use crate::params::{GizmoKind, ViewportId, ViewportUpdate};
use crate::platform::{
	BufferConsumer, BufferUsage, Extent, FramePlatform, ImageCreateInfo, ImageFormat, ImageUsage, SubmitInfo,
	UniformLayout,
};
use bytemuck_derive::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use rustc_hash::FxHashMap;
use std::mem::size_of;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;

/// Viewport ids handed out and retired from any thread, applied during the next draw call.
#[derive(Default)]
pub struct ViewportJobs {
	next_id: AtomicU64,
	jobs: JobQueue<ViewportId, ViewportId>,
}

impl ViewportJobs {
	pub fn new_viewport(&self) -> ViewportId {
		let id = ViewportId(self.next_id.fetch_add(1, Relaxed));
		self.jobs.create(id);
		id
	}

	pub fn delete_viewport(&self, id: ViewportId) {
		self.jobs.delete(id);
	}
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
	pub transform: Mat4,
	pub clear_color: Vec4,
	/// `w` is 1 if the viewport shows a gizmo, 0 otherwise
	pub gizmo_position: Vec4,
	/// quaternion
	pub gizmo_rotation: Vec4,
	/// `(scale, quad_offset, quad_scale, kind)`
	pub gizmo_params: Vec4,
}

impl From<&ViewportUpdate> for CameraUniform {
	fn from(update: &ViewportUpdate) -> Self {
		let mut uniform = CameraUniform {
			transform: update.transform,
			clear_color: update.clear_color,
			..CameraUniform::default()
		};
		if let Some(gizmo) = &update.gizmo {
			let kind = match gizmo.kind {
				GizmoKind::Translate => 0.,
				GizmoKind::Rotate => 1.,
				GizmoKind::Scale => 2.,
			};
			uniform.gizmo_position = gizmo.position.extend(1.);
			uniform.gizmo_rotation = Vec4::from(gizmo.rotation);
			uniform.gizmo_params = Vec4::new(gizmo.scale, gizmo.quad_offset, gizmo.quad_scale, kind);
		}
		uniform
	}
}

/// The color image a viewport is rendered into.
#[derive(Debug)]
pub struct RenderTarget<P: FramePlatform> {
	pub image: P::Image,
	pub view: P::ImageView,
	pub framebuffer: P::Framebuffer,
	pub extent: Extent,
}

impl<P: FramePlatform> RenderTarget<P> {
	fn destroy(self, deletion: &DeletionQueue<P>) {
		deletion.destroy_all([
			DeletionJob::Framebuffer(self.framebuffer),
			DeletionJob::ImageView(self.view),
			DeletionJob::Image(self.image),
		]);
	}
}

pub struct ViewportManager<P: FramePlatform> {
	viewports: FxHashMap<ViewportId, Option<RenderTarget<P>>>,
	cameras: PerFrameBuffer<P>,
	camera_len: u32,
	/// Render targets are sampled by the GUI pass instead of being copied from
	editor_mode: bool,
}

impl<P: FramePlatform> ViewportManager<P> {
	pub fn new(platform: &P, seed: SeedInFlight, editor_mode: bool) -> Result<Self, RenderError> {
		Ok(Self {
			viewports: FxHashMap::default(),
			cameras: PerFrameBuffer::new(
				platform,
				seed,
				PerFrameBufferCreateInfo {
					name: "viewport cameras",
					usage: BufferUsage::UNIFORM,
					consumer: BufferConsumer::Uniform,
					uniform: Some(UniformLayout::Camera),
					element_size: size_of::<CameraUniform>() as u64,
					min_capacity: 4,
				},
			)?,
			camera_len: 0,
			editor_mode,
		})
	}

	pub fn process_jobs(&mut self, ctx: &UpdateContext<P>, jobs: &ViewportJobs) {
		for job in jobs.jobs.take_uncancelled() {
			match job {
				Job::Create(id) => {
					log::info!("Created {}", id);
					let prev = self.viewports.insert(id, None);
					assert!(prev.is_none(), "{} created twice", id);
				}
				Job::Delete(id) => {
					let viewport = self
						.viewports
						.remove(&id)
						.unwrap_or_else(|| panic!("deleted unknown {}", id));
					if let Some(target) = viewport {
						target.destroy(ctx.deletion);
					}
					log::info!("Deleted {}", id);
				}
			}
		}
	}

	/// Create, rebuild or keep the render target of every updated viewport, then upload their cameras.
	pub fn update(&mut self, ctx: &UpdateContext<P>, updates: &[ViewportUpdate]) -> Result<(), RenderError> {
		profiling::function_scope!();
		for update in updates {
			let extent = Extent::new(update.width, update.height);
			let slot = self
				.viewports
				.get_mut(&update.id)
				.unwrap_or_else(|| panic!("updated unknown {}", update.id));
			match slot.as_ref() {
				Some(target) if target.extent == extent => continue,
				Some(_) => {
					log::debug!("Rebuilding {} with extent {:?}", update.id, extent);
					if let Some(old) = slot.take() {
						old.destroy(ctx.deletion);
					}
				}
				None => (),
			}
			if !extent.is_empty() {
				*slot = Some(unsafe { Self::create_target(ctx, update.id, extent, self.editor_mode)? });
			}
		}

		let cameras = updates.iter().map(CameraUniform::from).collect::<Vec<_>>();
		self.cameras.update(ctx, &cameras)?;
		self.camera_len = cameras.len() as u32;
		Ok(())
	}

	unsafe fn create_target(
		ctx: &UpdateContext<P>,
		id: ViewportId,
		extent: Extent,
		editor_mode: bool,
	) -> Result<RenderTarget<P>, RenderError> {
		unsafe {
			let name = format!("{}", id);
			let format = ImageFormat::Rgba8Srgb;
			let usage = match editor_mode {
				true => ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED,
				false => ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_SRC,
			};
			let image = ctx
				.platform
				.create_image(&ImageCreateInfo {
					name: &name,
					extent,
					format,
					usage,
				})
				.map_err(|e| {
					let size = extent.width as u64 * extent.height as u64 * format.texel_size();
					RenderError::allocation(&name, size, e)
				})?;
			let view = match ctx.platform.create_image_view(&image, &name) {
				Ok(view) => view,
				Err(e) => {
					ctx.deletion.destroy(DeletionJob::Image(image));
					return Err(RenderError::platform(e));
				}
			};
			let framebuffer = match ctx.platform.create_framebuffer(view, extent, &name) {
				Ok(framebuffer) => framebuffer,
				Err(e) => {
					ctx.deletion
						.destroy_all([DeletionJob::ImageView(view), DeletionJob::Image(image)]);
					return Err(RenderError::platform(e));
				}
			};
			let target = RenderTarget {
				image,
				view,
				framebuffer,
				extent,
			};
			if let Err(e) = Self::transition(ctx, &target.image, editor_mode) {
				target.destroy(ctx.deletion);
				return Err(e);
			}
			Ok(target)
		}
	}

	/// Moves a fresh render target into its initial layout with a one time submission, whose command pool is freed
	/// once its fence signals.
	unsafe fn transition(ctx: &UpdateContext<P>, image: &P::Image, sampled: bool) -> Result<(), RenderError> {
		unsafe {
			let platform = ctx.platform;
			let (pool, cmd) = platform
				.create_command_pool("viewport transition")
				.map_err(RenderError::platform)?;
			let submitted = (|| {
				platform.begin_command_buffer(&pool, cmd)?;
				platform.cmd_prepare_render_target(cmd, image, sampled);
				platform.end_command_buffer(cmd)?;
				let fence = platform.create_fence(false, "viewport transition")?;
				let submit = platform.submit(&SubmitInfo {
					command_buffer: cmd,
					wait_semaphores: &[],
					signal_semaphores: &[],
					fence: Some(fence),
				});
				match submit {
					Ok(()) => Ok(fence),
					Err(e) => {
						ctx.deletion.destroy(DeletionJob::Fence(fence));
						Err(e)
					}
				}
			})();
			match submitted {
				Ok(fence) => {
					ctx.deletion.destroy_fenced(fence, DeletionJob::CommandPool(pool));
					Ok(())
				}
				Err(e) => {
					ctx.deletion.destroy(DeletionJob::CommandPool(pool));
					Err(RenderError::platform(e))
				}
			}
		}
	}

	pub fn target(&self, id: ViewportId) -> Option<&RenderTarget<P>> {
		self.viewports.get(&id).and_then(Option::as_ref)
	}

	pub fn len(&self) -> usize {
		self.viewports.len()
	}

	pub fn is_empty(&self) -> bool {
		self.viewports.is_empty()
	}

	pub fn camera_binding(&self, frame: FrameInFlight) -> BufferBinding<'_, P> {
		self.cameras.binding(frame, self.camera_len)
	}

	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		for target in self.viewports.into_values().flatten() {
			target.destroy(deletion);
		}
		self.cameras.destroy(deletion);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::manager::tests::TestContext;
	use crate::params::Gizmo;
	use crate::platform::dummy::{Command, DummyPlatform, Kind};
	use glam::{Quat, Vec3};
	use std::sync::atomic::AtomicBool;

	fn manager(tc: &TestContext) -> anyhow::Result<ViewportManager<DummyPlatform>> {
		Ok(ViewportManager::new(&tc.platform, tc.seed, true)?)
	}

	#[test]
	fn lazy_create_rebuild_and_keep() -> anyhow::Result<()> {
		let mut tc = TestContext::new(2)?;
		let mut viewports = manager(&tc)?;
		let jobs = ViewportJobs::default();
		let id = jobs.new_viewport();
		viewports.process_jobs(&tc.ctx(0), &jobs);
		assert!(viewports.target(id).is_none());

		viewports.update(&tc.ctx(0), &[ViewportUpdate::new(id, 64, 32)])?;
		let first = viewports.target(id).unwrap().image.id;
		assert_eq!(viewports.target(id).unwrap().extent, Extent::new(64, 32));
		assert!(tc.platform.take_commands().contains(&Command::PrepareRenderTarget {
			image: first,
			sampled: true,
		}));
		assert_eq!(tc.deletion.pending_fenced_jobs(), 1);

		viewports.update(&tc.ctx(1), &[ViewportUpdate::new(id, 64, 32)])?;
		assert_eq!(viewports.target(id).unwrap().image.id, first);
		assert_eq!(tc.deletion.pending_jobs(), 0);

		viewports.update(&tc.ctx(0), &[ViewportUpdate::new(id, 128, 32)])?;
		assert_ne!(viewports.target(id).unwrap().image.id, first);
		assert_eq!(tc.deletion.pending_jobs(), 3);
		assert!(!tc.platform.is_destroyed(Kind::Image, first));

		jobs.delete_viewport(id);
		viewports.process_jobs(&tc.ctx(1), &jobs);
		assert!(viewports.is_empty());
		assert_eq!(tc.deletion.pending_jobs(), 6);

		viewports.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	fn transition_pool_freed_after_fence() -> anyhow::Result<()> {
		let mut tc = TestContext::new(2)?;
		*tc.platform.complete_on_submit.lock() = false;
		let mut viewports = manager(&tc)?;
		let jobs = ViewportJobs::default();
		let id = jobs.new_viewport();
		viewports.process_jobs(&tc.ctx(0), &jobs);
		viewports.update(&tc.ctx(0), &[ViewportUpdate::new(id, 8, 8)])?;

		let fence = tc.platform.take_submissions()[0].fence.unwrap();
		let frame = unsafe { FrameInFlight::new(tc.seed, 0) };
		unsafe { tc.deletion.execute_tick(&tc.platform, frame)? };
		assert_eq!(tc.platform.live_count(Kind::CommandPool), 2);

		tc.platform.signal_fence(crate::platform::dummy::DummyHandle(fence));
		unsafe { tc.deletion.execute_tick(&tc.platform, frame.next())? };
		assert_eq!(tc.platform.live_count(Kind::CommandPool), 1);
		assert!(tc.platform.is_destroyed(Kind::Fence, fence));

		viewports.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	fn camera_uniform_with_gizmo() -> anyhow::Result<()> {
		let mut tc = TestContext::new(2)?;
		let mut viewports = manager(&tc)?;
		let jobs = ViewportJobs::default();
		let a = jobs.new_viewport();
		let b = jobs.new_viewport();
		viewports.process_jobs(&tc.ctx(0), &jobs);

		let mut update_b = ViewportUpdate::new(b, 4, 4);
		update_b.gizmo = Some(Gizmo {
			position: Vec3::new(1., 2., 3.),
			rotation: Quat::IDENTITY,
			scale: 2.,
			kind: GizmoKind::Scale,
			quad_offset: 0.5,
			quad_scale: 0.25,
		});
		viewports.update(&tc.ctx(1), &[ViewportUpdate::new(a, 4, 4), update_b])?;

		let binding = viewports.camera_binding(unsafe { FrameInFlight::new(tc.seed, 1) });
		assert_eq!((binding.stride, binding.len), (256, 2));
		let contents = tc.platform.buffer_contents(viewports.cameras.buffer());
		let start = (binding.offset + binding.stride) as usize;
		let camera: CameraUniform = bytemuck::pod_read_unaligned(&contents[start..start + size_of::<CameraUniform>()]);
		assert_eq!(camera.gizmo_position, Vec4::new(1., 2., 3., 1.));
		assert_eq!(camera.gizmo_params, Vec4::new(2., 0.5, 0.25, 2.));

		viewports.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	fn create_and_delete_from_another_thread() -> anyhow::Result<()> {
		let mut tc = TestContext::new(2)?;
		let mut viewports = manager(&tc)?;
		let jobs = ViewportJobs::default();
		let kept = jobs.new_viewport();
		let done = AtomicBool::new(false);
		std::thread::scope(|s| {
			s.spawn(|| {
				for _ in 0..10_000 {
					let id = jobs.new_viewport();
					jobs.delete_viewport(id);
				}
				done.store(true, Relaxed);
			});
			while !done.load(Relaxed) {
				viewports.process_jobs(&tc.ctx(0), &jobs);
			}
		});
		viewports.process_jobs(&tc.ctx(1), &jobs);
		assert_eq!(viewports.len(), 1);
		assert!(viewports.viewports.contains_key(&kept));

		viewports.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	fn delete_in_same_batch_cancels_creation() -> anyhow::Result<()> {
		let mut tc = TestContext::new(2)?;
		let mut viewports = manager(&tc)?;
		let jobs = ViewportJobs::default();
		let id = jobs.new_viewport();
		jobs.delete_viewport(id);
		viewports.process_jobs(&tc.ctx(0), &jobs);
		assert!(viewports.is_empty());
		assert_eq!(tc.deletion.pending_jobs(), 0);

		viewports.destroy(&tc.deletion);
		tc.finish()
	}

	#[test]
	#[should_panic(expected = "updated unknown")]
	fn unknown_viewport_panics() {
		let mut tc = TestContext::new(2).unwrap();
		let mut viewports = manager(&tc).unwrap();
		let _ = viewports.update(&tc.ctx(0), &[ViewportUpdate::new(ViewportId(9), 4, 4)]);
	}
}
