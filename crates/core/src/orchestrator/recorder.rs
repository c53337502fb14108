use crate::frame_in_flight::FrameInFlight;
use crate::manager::per_frame::BufferBinding;
use crate::manager::texture::TextureManager;
use crate::manager::viewport::ViewportManager;
use crate::params::{DrawParams, GuiDrawCmd, TextureId, ViewportId};
use crate::platform::FramePlatform;

/// The per-frame storage of every manager for the draw call being recorded.
pub struct FrameResources<'a, P: FramePlatform> {
	pub frame: FrameInFlight<'a>,
	pub params: &'a DrawParams,
	/// One `Mat4` per entry of [`DrawParams::transforms`]
	pub object_data: BufferBinding<'a, P>,
	/// One [`CameraUniform`] per entry of [`DrawParams::viewport_updates`]
	///
	/// [`CameraUniform`]: crate::manager::viewport::CameraUniform
	pub cameras: BufferBinding<'a, P>,
	pub gui_vertices: BufferBinding<'a, P>,
	pub gui_indices: BufferBinding<'a, P>,
	/// One [`GuiWindowUniform`] per entry of [`DrawParams::native_window_updates`]
	///
	/// [`GuiWindowUniform`]: crate::manager::gui::GuiWindowUniform
	pub gui_windows: BufferBinding<'a, P>,
	pub line_vertices: BufferBinding<'a, P>,
	pub(super) viewports: &'a ViewportManager<P>,
	pub(super) textures: &'a TextureManager<P>,
}

impl<P: FramePlatform> FrameResources<'_, P> {
	/// The render target of a viewport, as drawn by the viewport passes of this frame.
	pub fn viewport_view(&self, id: ViewportId) -> Option<P::ImageView> {
		self.viewports.target(id).map(|target| target.view)
	}

	pub fn texture_view(&self, id: TextureId) -> Option<P::ImageView> {
		self.textures.get(id).map(|texture| texture.view)
	}
}

/// Records the content of the passes the orchestrator begins and ends. Pipelines and draw commands are entirely up to
/// the implementation.
pub trait PassRecorder<P: FramePlatform>: Send + 'static {
	/// Record the content of the viewport `params.viewport_updates[viewport_index]`.
	///
	/// # Safety
	/// `cmd` is recording within the render pass of the viewport's render target.
	unsafe fn record_viewport(
		&mut self,
		platform: &P,
		cmd: P::CommandBuffer,
		resources: &FrameResources<P>,
		viewport_index: usize,
	) {
		let _ = (platform, cmd, resources, viewport_index);
	}

	/// Record a single GUI draw command into the window `params.native_window_updates[window_index]`. Scissor commands
	/// are handled by the orchestrator.
	///
	/// # Safety
	/// `cmd` is recording within the render pass of the window's swapchain image.
	unsafe fn record_gui(
		&mut self,
		platform: &P,
		cmd: P::CommandBuffer,
		resources: &FrameResources<P>,
		window_index: usize,
		draw_cmd: &GuiDrawCmd,
	) {
		let _ = (platform, cmd, resources, window_index, draw_cmd);
	}
}

/// Records nothing, leaving passes with only their clear.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopRecorder;

impl<P: FramePlatform> PassRecorder<P> for NoopRecorder {}
