use crate::params::NativeWindowId;
use bitflags::bitflags;
use glam::Mat2;
use smallvec::SmallVec;
use std::error::Error;
use std::fmt::Debug;
use std::time::Duration;

/// Internal interface for device API calls, may change at any time!
///
/// All handle types are plain handles without drop glue: the only way to release one is passing it back to the
/// matching `destroy_*` fn, which the core exclusively does through the [`DeletionQueue`].
///
/// [`DeletionQueue`]: crate::deletion::DeletionQueue
pub unsafe trait FramePlatform: Sized + Send + Sync + 'static {
	type Buffer: 'static + Send + Sync + Debug;
	type Image: 'static + Send + Sync + Debug;
	type ImageView: 'static + Copy + Send + Sync + Debug;
	type Framebuffer: 'static + Copy + Send + Sync + Debug;
	type DescriptorPool: 'static + Send + Sync + Debug;
	type DescriptorSet: 'static + Copy + Send + Sync + Debug;
	type CommandPool: 'static + Send + Sync + Debug;
	type CommandBuffer: 'static + Copy + Send + Sync + Debug;
	type Fence: 'static + Copy + Send + Sync + Debug;
	type Semaphore: 'static + Copy + Send + Sync + Debug;
	type Surface: 'static + Copy + Send + Sync + Debug;
	type Swapchain: 'static + Copy + Send + Sync + Debug;
	type Error: 'static + Error + Send + Sync;

	fn limits(&self) -> DeviceLimits;

	/// Wait until the device has finished all submitted work. Only used for teardown.
	unsafe fn wait_idle(&self) -> Result<(), Self::Error>;

	// memory
	unsafe fn create_buffer(&self, create_info: &BufferCreateInfo) -> Result<Self::Buffer, Self::Error>;

	/// Copy `data` into the host-visible `buffer` at `offset`. The caller guarantees the GPU is not reading this range.
	unsafe fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

	unsafe fn destroy_buffer(&self, buffer: Self::Buffer);

	unsafe fn create_image(&self, create_info: &ImageCreateInfo) -> Result<Self::Image, Self::Error>;

	unsafe fn create_image_view(&self, image: &Self::Image, name: &str) -> Result<Self::ImageView, Self::Error>;

	unsafe fn destroy_image(&self, image: Self::Image);

	unsafe fn destroy_image_view(&self, image_view: Self::ImageView);

	/// Create a framebuffer for a viewport render target, compatible with [`Self::cmd_begin_render_pass`].
	unsafe fn create_framebuffer(
		&self,
		image_view: Self::ImageView,
		extent: Extent,
		name: &str,
	) -> Result<Self::Framebuffer, Self::Error>;

	unsafe fn destroy_framebuffer(&self, framebuffer: Self::Framebuffer);

	/// Create a descriptor pool and a single set binding `range` bytes of `buffer` as a dynamic uniform buffer.
	unsafe fn create_uniform_descriptor(
		&self,
		layout: UniformLayout,
		buffer: &Self::Buffer,
		range: u64,
		name: &str,
	) -> Result<(Self::DescriptorPool, Self::DescriptorSet), Self::Error>;

	/// Descriptor sets allocated from the pool are freed implicitly.
	unsafe fn destroy_descriptor_pool(&self, pool: Self::DescriptorPool);

	// sync
	unsafe fn create_fence(&self, signaled: bool, name: &str) -> Result<Self::Fence, Self::Error>;

	/// Non-blocking query of the fence status. Must only error on device loss.
	unsafe fn fence_status(&self, fence: Self::Fence) -> Result<FenceStatus, Self::Error>;

	unsafe fn wait_for_fence(&self, fence: Self::Fence, timeout: Duration) -> Result<WaitResult, Self::Error>;

	unsafe fn reset_fence(&self, fence: Self::Fence) -> Result<(), Self::Error>;

	unsafe fn destroy_fence(&self, fence: Self::Fence);

	unsafe fn create_semaphore(&self, name: &str) -> Result<Self::Semaphore, Self::Error>;

	unsafe fn destroy_semaphore(&self, semaphore: Self::Semaphore);

	// commands
	/// Create a command pool with a single primary command buffer allocated from it.
	unsafe fn create_command_pool(&self, name: &str) -> Result<(Self::CommandPool, Self::CommandBuffer), Self::Error>;

	/// Reset the pool, then begin recording its command buffer for one time submission.
	unsafe fn begin_command_buffer(
		&self,
		pool: &Self::CommandPool,
		cmd: Self::CommandBuffer,
	) -> Result<(), Self::Error>;

	unsafe fn end_command_buffer(&self, cmd: Self::CommandBuffer) -> Result<(), Self::Error>;

	unsafe fn destroy_command_pool(&self, pool: Self::CommandPool);

	/// Make host writes into `buffer[offset..offset + size]` visible to the stage consuming it as `consumer`.
	unsafe fn cmd_host_write_barrier(
		&self,
		cmd: Self::CommandBuffer,
		buffer: &Self::Buffer,
		offset: u64,
		size: u64,
		consumer: BufferConsumer,
	);

	/// Copy tightly packed texels from `src` at `src_offset` into the entire `dst` image, leaving it ready for sampling.
	unsafe fn cmd_upload_image(&self, cmd: Self::CommandBuffer, src: &Self::Buffer, src_offset: u64, dst: &Self::Image);

	/// Transition a freshly created render target out of its undefined layout. `sampled` selects whether the image is
	/// sampled by the GUI pass afterwards or copied from.
	unsafe fn cmd_prepare_render_target(&self, cmd: Self::CommandBuffer, image: &Self::Image, sampled: bool);

	unsafe fn cmd_begin_render_pass(
		&self,
		cmd: Self::CommandBuffer,
		framebuffer: Self::Framebuffer,
		extent: Extent,
		clear_color: [f32; 4],
	);

	unsafe fn cmd_set_scissor(&self, cmd: Self::CommandBuffer, scissor: ScissorRect);

	unsafe fn cmd_end_render_pass(&self, cmd: Self::CommandBuffer);

	unsafe fn submit(&self, submit: &SubmitInfo<'_, Self>) -> Result<(), Self::Error>;

	// presentation
	unsafe fn surface_state(&self, surface: Self::Surface) -> Result<SurfaceState, Self::Error>;

	/// Create a swapchain for `surface`, chained from `old_swapchain` if any. Also creates a view and a framebuffer
	/// compatible with [`Self::cmd_begin_render_pass`] per swapchain image.
	unsafe fn create_swapchain(
		&self,
		surface: Self::Surface,
		old_swapchain: Option<Self::Swapchain>,
		name: &str,
	) -> Result<SwapchainResources<Self>, Self::Error>;

	/// Destroys the swapchain and its images, but not the views or framebuffers created for them.
	unsafe fn destroy_swapchain(&self, swapchain: Self::Swapchain);

	unsafe fn destroy_surface(&self, surface: Self::Surface);

	unsafe fn acquire_next_image(
		&self,
		swapchain: Self::Swapchain,
		signal: Self::Semaphore,
		timeout: Duration,
	) -> Result<AcquireResult, Self::Error>;

	unsafe fn present(
		&self,
		swapchain: Self::Swapchain,
		image_index: u32,
		wait: Self::Semaphore,
	) -> Result<PresentResult, Self::Error>;
}

/// Creates the presentable surfaces of native windows, implemented by the windowing integration.
pub trait SurfaceProvider<P: FramePlatform>: Send + Sync + 'static {
	/// Create the surface for the native window registered as `id`.
	///
	/// # Safety
	/// The window must outlive the surface.
	unsafe fn create_surface(&self, platform: &P, id: NativeWindowId) -> anyhow::Result<P::Surface>;
}

#[derive(Copy, Clone, Debug)]
pub struct DeviceLimits {
	pub min_uniform_buffer_offset_alignment: u64,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Extent {
	pub width: u32,
	pub height: u32,
}

impl Extent {
	pub const fn new(width: u32, height: u32) -> Self {
		Self { width, height }
	}

	pub fn is_empty(&self) -> bool {
		self.width == 0 || self.height == 0
	}
}

impl From<[u32; 2]> for Extent {
	fn from(value: [u32; 2]) -> Self {
		Self::new(value[0], value[1])
	}
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ScissorRect {
	pub x: i32,
	pub y: i32,
	pub width: u32,
	pub height: u32,
}

bitflags! {
	#[repr(transparent)]
	#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
	pub struct BufferUsage: u32 {
		const UNIFORM = 0b1;
		const VERTEX = 0b10;
		const INDEX = 0b100;
		const TRANSFER_SRC = 0b1000;
	}
}

/// All buffers are host visible and persistently mapped.
#[derive(Copy, Clone, Debug)]
pub struct BufferCreateInfo<'a> {
	pub name: &'a str,
	pub size: u64,
	pub usage: BufferUsage,
}

/// The shader stage reading a buffer, selects the destination of [`FramePlatform::cmd_host_write_barrier`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BufferConsumer {
	Uniform,
	Vertex,
	Index,
}

/// Descriptor set layouts of the per-frame uniform managers, each a single dynamic uniform buffer binding.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum UniformLayout {
	ObjectData,
	Camera,
	GuiWindow,
}

impl UniformLayout {
	pub const VALUES: [UniformLayout; 3] = [UniformLayout::ObjectData, UniformLayout::Camera, UniformLayout::GuiWindow];
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ImageFormat {
	/// Viewport render targets and color textures
	Rgba8Srgb,
	/// Font glyph coverage
	R8Unorm,
}

impl ImageFormat {
	pub fn texel_size(&self) -> u64 {
		match self {
			ImageFormat::Rgba8Srgb => 4,
			ImageFormat::R8Unorm => 1,
		}
	}
}

bitflags! {
	#[repr(transparent)]
	#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
	pub struct ImageUsage: u32 {
		const COLOR_ATTACHMENT = 0b1;
		const SAMPLED = 0b10;
		const TRANSFER_SRC = 0b100;
		const TRANSFER_DST = 0b1000;
	}
}

#[derive(Copy, Clone, Debug)]
pub struct ImageCreateInfo<'a> {
	pub name: &'a str,
	pub extent: Extent,
	pub format: ImageFormat,
	pub usage: ImageUsage,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FenceStatus {
	Signaled,
	NotReady,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaitResult {
	Signaled,
	Timeout,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AcquireResult {
	Acquired { image_index: u32, suboptimal: bool },
	OutOfDate,
	Timeout,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PresentResult {
	Presented,
	Suboptimal,
	OutOfDate,
}

/// The pre-transform the presentation engine applies to a surface, content must be rendered rotated by it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum SurfaceRotation {
	#[default]
	Identity,
	Rotate90,
	Rotate180,
	Rotate270,
}

impl SurfaceRotation {
	/// Rotation matrix applied to normalized device coordinates.
	pub fn matrix(&self) -> Mat2 {
		match self {
			SurfaceRotation::Identity => Mat2::from_cols_array(&[1., 0., 0., 1.]),
			SurfaceRotation::Rotate90 => Mat2::from_cols_array(&[0., 1., -1., 0.]),
			SurfaceRotation::Rotate180 => Mat2::from_cols_array(&[-1., 0., 0., -1.]),
			SurfaceRotation::Rotate270 => Mat2::from_cols_array(&[0., -1., 1., 0.]),
		}
	}

	pub fn swaps_extent(&self) -> bool {
		matches!(self, SurfaceRotation::Rotate90 | SurfaceRotation::Rotate270)
	}
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SurfaceState {
	/// The extent the swapchain would currently be created with, zero if minimized.
	pub extent: Extent,
	pub rotation: SurfaceRotation,
}

pub struct SwapchainResources<P: FramePlatform> {
	pub swapchain: P::Swapchain,
	pub extent: Extent,
	pub rotation: SurfaceRotation,
	pub image_views: SmallVec<[P::ImageView; 4]>,
	pub framebuffers: SmallVec<[P::Framebuffer; 4]>,
}

pub struct SubmitInfo<'a, P: FramePlatform> {
	pub command_buffer: P::CommandBuffer,
	/// Waited upon at the color attachment output stage
	pub wait_semaphores: &'a [P::Semaphore],
	pub signal_semaphores: &'a [P::Semaphore],
	pub fence: Option<P::Fence>,
}
