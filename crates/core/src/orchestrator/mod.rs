//! # Frame orchestrator
//! Turns a single [`DrawParams`] into one correctly synchronized submission. A draw call runs these steps strictly in
//! order:
//! 1. advance the frame in flight index and the main fence index
//! 2. reset the staging allocator of this frame
//! 3. reset the command pool of this frame and begin its command buffer
//! 4. update all managers
//! 5. record the viewport passes
//! 6. wait for the main fence submitted `frames_in_flight - 1` draw calls ago, then reset it
//! 7. acquire a swapchain image of each window and record its GUI pass
//! 8. submit and present each window individually
//!
//! The deletion queue ticks at the end of every draw call, regardless of whether it succeeded. Any error is fatal and
//! poisons the orchestrator.

mod recorder;
pub mod scissor;

pub use recorder::*;

use crate::deletion::{DeletionJob, DeletionQueue};
use crate::error::RenderError;
use crate::frame_in_flight::{FrameInFlight, ResourceInFlight, SeedInFlight};
use crate::manager::UpdateContext;
use crate::manager::gui::{GuiCapacities, GuiResourceManager};
use crate::manager::line::LineVertexManager;
use crate::manager::native_window::NativeWindowManager;
use crate::manager::object_data::ObjectDataManager;
use crate::manager::texture::TextureManager;
use crate::manager::viewport::ViewportManager;
use crate::orchestrator::scissor::{full_scissor, rotated_scissor};
use crate::params::{DrawParams, GuiDrawCmdKind, NativeWindowId};
use crate::platform::{AcquireResult, FramePlatform, PresentResult, SubmitInfo, SurfaceProvider, WaitResult};
use crate::renderer::{RendererCreateInfo, RendererShared};
use crate::staging::StagingAllocator;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Duration;

struct FrameSlot<P: FramePlatform> {
	command_pool: P::CommandPool,
	cmd: P::CommandBuffer,
	staging: StagingAllocator<P>,
}

struct Present<P: FramePlatform> {
	id: NativeWindowId,
	swapchain: P::Swapchain,
	image_index: u32,
	render_finished: P::Semaphore,
}

pub struct FrameOrchestrator<P: FramePlatform> {
	shared: Arc<RendererShared<P>>,
	seed: SeedInFlight,
	next_frame: u32,
	next_fence: usize,
	slots: ResourceInFlight<FrameSlot<P>>,
	/// `frames_in_flight - 1` fences, the CPU may record one frame while the others are executing
	fences: SmallVec<[P::Fence; 4]>,
	fence_timeout: Duration,
	acquire_timeout: Duration,
	native_windows: NativeWindowManager<P>,
	viewports: ViewportManager<P>,
	textures: TextureManager<P>,
	object_data: ObjectDataManager<P>,
	gui: GuiResourceManager<P>,
	lines: LineVertexManager<P>,
	recorder: Box<dyn PassRecorder<P>>,
	poisoned: bool,
}

impl<P: FramePlatform> FrameOrchestrator<P> {
	pub fn new(
		shared: Arc<RendererShared<P>>,
		surfaces: Arc<dyn SurfaceProvider<P>>,
		recorder: Box<dyn PassRecorder<P>>,
		ci: &RendererCreateInfo,
	) -> Result<Self, RenderError> {
		let seed = shared.seed();
		let frames_in_flight = seed.frames_in_flight();
		assert!(
			frames_in_flight >= 2,
			"frames_in_flight must be at least 2, got {}",
			frames_in_flight
		);
		let platform = &shared.platform;

		let slots = ResourceInFlight::try_new(seed, |frame| -> Result<_, RenderError> {
			let name = format!("frame {}", frame.frame_index());
			let (command_pool, cmd) = unsafe { platform.create_command_pool(&name) }.map_err(RenderError::platform)?;
			let staging = StagingAllocator::new(platform, &format!("staging {}", name), ci.staging_capacity)?;
			Ok(FrameSlot {
				command_pool,
				cmd,
				staging,
			})
		})?;
		let fences = (0..frames_in_flight - 1)
			.map(|i| unsafe { platform.create_fence(true, &format!("main fence {}", i)) })
			.collect::<Result<SmallVec<_>, _>>()
			.map_err(RenderError::platform)?;

		let orchestrator = Self {
			seed,
			next_frame: 0,
			next_fence: 0,
			slots,
			fences,
			fence_timeout: ci.fence_timeout,
			acquire_timeout: ci.acquire_timeout,
			native_windows: NativeWindowManager::new(surfaces, seed),
			viewports: ViewportManager::new(platform, seed, ci.editor_mode)?,
			textures: TextureManager::default(),
			object_data: ObjectDataManager::new(platform, seed, ci.min_object_capacity)?,
			gui: GuiResourceManager::new(
				platform,
				seed,
				GuiCapacities {
					min_vertices: ci.min_gui_vertex_capacity,
					min_indices: ci.min_gui_index_capacity,
					min_windows: ci.min_gui_window_capacity,
				},
			)?,
			lines: LineVertexManager::new(platform, seed, ci.min_line_vertex_capacity)?,
			recorder,
			poisoned: false,
			shared,
		};
		Ok(orchestrator)
	}

	pub fn shared(&self) -> &Arc<RendererShared<P>> {
		&self.shared
	}

	pub fn is_poisoned(&self) -> bool {
		self.poisoned
	}

	pub(crate) fn poison(&mut self) {
		self.poisoned = true;
	}

	/// Render one frame. After any error every following call fails with [`RenderError::Poisoned`].
	pub fn draw(&mut self, params: &DrawParams) -> Result<(), RenderError> {
		if self.poisoned {
			return Err(RenderError::Poisoned);
		}
		profiling::function_scope!();

		// SAFETY: the fence wait of the previous draw call ensured this slot is no longer in use
		let frame = unsafe { FrameInFlight::new(self.seed, self.next_frame) };
		self.next_frame = (self.next_frame + 1) % self.seed.frames_in_flight();
		let fence_index = self.next_fence;
		self.next_fence = (fence_index + 1) % self.fences.len();

		let result = unsafe { self.record_and_submit(params, frame, fence_index) };
		let tick = unsafe { self.shared.deletion.execute_tick(&self.shared.platform, frame) };
		match result.and(tick) {
			Ok(()) => {
				self.shared.increment_tick_count();
				Ok(())
			}
			Err(e) => {
				log::error!("Draw call failed, the renderer is no longer usable: {}", e);
				self.poisoned = true;
				Err(e)
			}
		}
	}

	unsafe fn record_and_submit(
		&mut self,
		params: &DrawParams,
		frame: FrameInFlight,
		fence_index: usize,
	) -> Result<(), RenderError> {
		unsafe {
			let Self {
				shared,
				slots,
				fences,
				fence_timeout,
				acquire_timeout,
				native_windows,
				viewports,
				textures,
				object_data,
				gui,
				lines,
				recorder,
				..
			} = self;
			let platform = &shared.platform;
			let slot = slots.index_mut(frame);
			slot.staging.reset();
			platform
				.begin_command_buffer(&slot.command_pool, slot.cmd)
				.map_err(RenderError::platform)?;
			let cmd = slot.cmd;

			{
				profiling::scope!("update managers");
				let mut ctx = UpdateContext {
					platform,
					deletion: &shared.deletion,
					frame,
					cmd,
					staging: &mut slot.staging,
				};
				native_windows.process_jobs(&ctx, &shared.native_window_jobs)?;
				native_windows.update(&ctx, &params.native_window_updates)?;
				viewports.process_jobs(&ctx, &shared.viewport_jobs);
				viewports.update(&ctx, &params.viewport_updates)?;
				textures.process_jobs(&mut ctx, &shared.texture_jobs)?;
				textures.validate(&params.texture_ids);
				object_data.update(&ctx, &params.transforms)?;
				let window_uniforms = native_windows.gui_uniforms(&params.native_window_updates);
				gui.update(&ctx, &params.gui_vertices, &params.gui_indices, &window_uniforms)?;
				lines.update(&ctx, &params.line_vertices, &params.line_draw_cmds)?;
			}

			let resources = FrameResources {
				frame,
				params,
				object_data: object_data.binding(frame),
				cameras: viewports.camera_binding(frame),
				gui_vertices: gui.vertex_binding(frame),
				gui_indices: gui.index_binding(frame),
				gui_windows: gui.windows.binding(frame),
				line_vertices: lines.binding(frame),
				viewports: &*viewports,
				textures: &*textures,
			};

			{
				profiling::scope!("viewport passes");
				for (index, update) in params.viewport_updates.iter().enumerate() {
					if let Some(target) = viewports.target(update.id) {
						platform.cmd_begin_render_pass(cmd, target.framebuffer, target.extent, update.clear_color.to_array());
						recorder.record_viewport(platform, cmd, &resources, index);
						platform.cmd_end_render_pass(cmd);
					}
				}
			}

			let fence = fences[fence_index];
			{
				profiling::scope!("wait for fence");
				match platform.wait_for_fence(fence, *fence_timeout) {
					Ok(WaitResult::Signaled) => (),
					Ok(WaitResult::Timeout) => {
						return Err(RenderError::DeviceTimeout {
							what: "main fence",
							timeout: *fence_timeout,
						});
					}
					Err(e) => return Err(RenderError::device_lost(e)),
				}
				platform.reset_fence(fence).map_err(RenderError::platform)?;
			}

			let mut wait_semaphores = SmallVec::<[P::Semaphore; 4]>::new();
			let mut presents = SmallVec::<[Present<P>; 4]>::new();
			{
				profiling::scope!("gui passes");
				for (index, update) in params.native_window_updates.iter().enumerate() {
					let draw_cmds = update.draw_cmd_offset as usize..(update.draw_cmd_offset + update.draw_cmd_count) as usize;
					assert!(
						draw_cmds.end <= params.gui_draw_cmds.len(),
						"{} draw commands {:?} out of bounds of {}",
						update.id,
						draw_cmds,
						params.gui_draw_cmds.len()
					);
					let window = native_windows
						.get_mut(update.id)
						.unwrap_or_else(|| panic!("updated unknown {}", update.id));
					let Some(swapchain) = &window.swapchain else {
						continue;
					};
					let image_ready = window.image_ready(frame);
					let acquired = platform
						.acquire_next_image(swapchain.swapchain, image_ready, *acquire_timeout)
						.map_err(RenderError::platform)?;
					let image_index = match acquired {
						AcquireResult::Acquired {
							image_index,
							suboptimal,
						} => {
							if suboptimal {
								window.out_of_date = true;
							}
							image_index
						}
						AcquireResult::OutOfDate => {
							log::warn!("{} is out of date, skipping it this frame", update.id);
							window.out_of_date = true;
							continue;
						}
						AcquireResult::Timeout => {
							return Err(RenderError::DeviceTimeout {
								what: "swapchain image",
								timeout: *acquire_timeout,
							});
						}
					};

					let framebuffer = swapchain.framebuffers[image_index as usize];
					platform.cmd_begin_render_pass(cmd, framebuffer, swapchain.extent, update.clear_color.to_array());
					platform.cmd_set_scissor(cmd, full_scissor(swapchain.extent));
					for draw_cmd in &params.gui_draw_cmds[draw_cmds] {
						match draw_cmd.kind {
							GuiDrawCmdKind::Scissor => platform.cmd_set_scissor(
								cmd,
								rotated_scissor(
									swapchain.rotation,
									swapchain.extent,
									draw_cmd.rect_position,
									draw_cmd.rect_extent,
								),
							),
							_ => recorder.record_gui(platform, cmd, &resources, index, draw_cmd),
						}
					}
					platform.cmd_end_render_pass(cmd);

					wait_semaphores.push(image_ready);
					presents.push(Present {
						id: update.id,
						swapchain: swapchain.swapchain,
						image_index,
						render_finished: swapchain.render_finished[image_index as usize],
					});
				}
			}

			{
				profiling::scope!("submit");
				platform.end_command_buffer(cmd).map_err(RenderError::platform)?;
				let signal_semaphores = presents.iter().map(|p| p.render_finished).collect::<SmallVec<[_; 4]>>();
				platform
					.submit(&SubmitInfo {
						command_buffer: cmd,
						wait_semaphores: &wait_semaphores,
						signal_semaphores: &signal_semaphores,
						fence: Some(fence),
					})
					.map_err(RenderError::platform)?;
			}

			profiling::scope!("present");
			for present in presents {
				let result = platform
					.present(present.swapchain, present.image_index, present.render_finished)
					.map_err(RenderError::platform)?;
				if matches!(result, PresentResult::Suboptimal | PresentResult::OutOfDate) {
					log::debug!("{} presented {:?}, rebuilding next frame", present.id, result);
					if let Some(window) = native_windows.get_mut(present.id) {
						window.out_of_date = true;
					}
				}
			}
			Ok(())
		}
	}

	/// Queue every resource for destruction. The caller flushes the deletion queue after waiting for the device.
	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		self.native_windows.destroy(deletion);
		self.viewports.destroy(deletion);
		self.textures.destroy(deletion);
		self.object_data.destroy(deletion);
		self.gui.destroy(deletion);
		self.lines.destroy(deletion);
		for slot in self.slots.into_resources() {
			slot.staging.destroy(deletion);
			deletion.destroy(DeletionJob::CommandPool(slot.command_pool));
		}
		deletion.destroy_all(self.fences.into_iter().map(DeletionJob::Fence));
	}
}
