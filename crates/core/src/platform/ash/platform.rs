use crate::platform::ash::render_pass::RenderPassCache;
use crate::platform::{
	AcquireResult, BufferConsumer, BufferCreateInfo, DeviceLimits, Extent, FenceStatus, FramePlatform, ImageCreateInfo,
	ImageUsage, PresentResult, ScissorRect, SubmitInfo, SurfaceState, SwapchainResources, UniformLayout, WaitResult,
};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::vk::{
	BufferImageCopy, BufferMemoryBarrier2, ClearColorValue, ClearValue, CommandBufferAllocateInfo,
	CommandBufferBeginInfo, CommandBufferLevel, CommandBufferUsageFlags, CommandPoolCreateFlags,
	CommandPoolCreateInfo, CommandPoolResetFlags, ComponentMapping, DebugUtilsObjectNameInfoEXT, DependencyInfo,
	DescriptorBufferInfo, DescriptorPoolCreateInfo, DescriptorPoolSize, DescriptorSetAllocateInfo, DescriptorSetLayout,
	DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, DescriptorType, FenceCreateFlags, FenceCreateInfo,
	FramebufferCreateInfo, Handle, ImageAspectFlags, ImageLayout, ImageMemoryBarrier2, ImageSubresourceLayers,
	ImageSubresourceRange, ImageTiling, ImageViewCreateInfo, ImageViewType, Offset2D, PipelineStageFlags,
	RenderPassBeginInfo, SampleCountFlags, SemaphoreCreateInfo, ShaderStageFlags, SharingMode, SubpassContents,
	WriteDescriptorSet,
};
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use parking_lot::lock_api::MutexGuard;
use parking_lot::{Mutex, RawMutex};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use static_assertions::assert_impl_all;
use std::cell::UnsafeCell;
use std::ffi::CString;
use std::ops::Deref;
use std::slice;
use std::time::Duration;
use thiserror::Error;

/// Queries the extent a window wants its swapchain to be, for surfaces whose extent is determined by the swapchain.
pub type SurfaceExtentFn = Box<dyn Fn() -> Extent + Send + Sync>;

pub struct Ash {
	pub create_info: AshCreateInfo,
	limits: DeviceLimits,
	uniform_layouts: [DescriptorSetLayout; 3],
	render_passes: RenderPassCache,
	pub(super) surface_extents: Mutex<FxHashMap<ash::vk::SurfaceKHR, SurfaceExtentFn>>,
}
assert_impl_all!(Ash: Send, Sync);

impl Ash {
	pub fn new(create_info: AshCreateInfo) -> Result<Self, AshError> {
		unsafe {
			let properties = create_info
				.instance
				.get_physical_device_properties(create_info.physical_device);
			let limits = DeviceLimits {
				min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
			};

			let mut uniform_layouts = [DescriptorSetLayout::null(); 3];
			for (i, layout) in UniformLayout::VALUES.into_iter().enumerate() {
				let binding = DescriptorSetLayoutBinding::default()
					.binding(0)
					.descriptor_type(DescriptorType::UNIFORM_BUFFER_DYNAMIC)
					.descriptor_count(1)
					.stage_flags(ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT);
				match create_info.device.create_descriptor_set_layout(
					&DescriptorSetLayoutCreateInfo::default().bindings(slice::from_ref(&binding)),
					None,
				) {
					Ok(set_layout) => uniform_layouts[i] = set_layout,
					Err(e) => {
						for set_layout in &uniform_layouts[..i] {
							create_info.device.destroy_descriptor_set_layout(*set_layout, None);
						}
						return Err(e.into());
					}
				}
				log::trace!("Created uniform descriptor set layout {:?}", layout);
			}

			Ok(Ash {
				create_info,
				limits,
				uniform_layouts,
				render_passes: RenderPassCache::default(),
				surface_extents: Mutex::new(FxHashMap::default()),
			})
		}
	}

	pub unsafe fn set_debug_object_name(&self, handle: impl Handle, name: &str) -> VkResult<()> {
		unsafe {
			if let Some(debug_marker) = self.extensions.debug_utils.as_ref() {
				debug_marker.set_debug_utils_object_name(
					&DebugUtilsObjectNameInfoEXT::default()
						.object_handle(handle)
						.object_name(&CString::new(name).unwrap_or_default()),
				)?;
			}
			Ok(())
		}
	}

	/// The descriptor set layout pipelines must use to bind the uniforms of `layout`.
	pub fn uniform_layout(&self, layout: UniformLayout) -> DescriptorSetLayout {
		let index = UniformLayout::VALUES
			.iter()
			.position(|l| *l == layout)
			.unwrap_or_default();
		self.uniform_layouts[index]
	}

	/// The render pass framebuffers of images with `format` are created against. Pipelines must be created with a
	/// dynamic viewport and scissor state.
	pub fn render_pass(&self, format: ash::vk::Format) -> VkResult<ash::vk::RenderPass> {
		unsafe {
			self.render_passes
				.get(&self.device, format, ImageLayout::SHADER_READ_ONLY_OPTIMAL)
		}
	}

	pub(super) unsafe fn cached_render_pass(
		&self,
		format: ash::vk::Format,
		final_layout: ImageLayout,
	) -> VkResult<ash::vk::RenderPass> {
		unsafe { self.render_passes.get(&self.device, format, final_layout) }
	}

	/// Register how to query the extent of a window, for surfaces that don't report an extent themselves.
	pub fn set_surface_extent_fn(&self, surface: ash::vk::SurfaceKHR, extent: SurfaceExtentFn) {
		self.surface_extents.lock().insert(surface, extent);
	}

	pub(super) unsafe fn create_ash_image_view(
		&self,
		image: ash::vk::Image,
		format: ash::vk::Format,
		final_layout: ImageLayout,
		name: &str,
	) -> Result<AshImageView, AshError> {
		unsafe {
			let image_view = self.device.create_image_view(
				&ImageViewCreateInfo::default()
					.image(image)
					.view_type(ImageViewType::TYPE_2D)
					.format(format)
					.components(ComponentMapping::default()) // identity
					.subresource_range(color_subresource_range()),
				None,
			)?;
			if let Err(e) = self.set_debug_object_name(image_view, name) {
				self.device.destroy_image_view(image_view, None);
				return Err(e.into());
			}
			Ok(AshImageView {
				image_view,
				format,
				final_layout,
			})
		}
	}

	pub(super) unsafe fn create_ash_framebuffer(
		&self,
		image_view: AshImageView,
		extent: Extent,
		name: &str,
	) -> Result<AshFramebuffer, AshError> {
		unsafe {
			let render_pass = self.cached_render_pass(image_view.format, image_view.final_layout)?;
			let framebuffer = self.device.create_framebuffer(
				&FramebufferCreateInfo::default()
					.render_pass(render_pass)
					.attachments(slice::from_ref(&image_view.image_view))
					.width(extent.width)
					.height(extent.height)
					.layers(1),
				None,
			)?;
			if let Err(e) = self.set_debug_object_name(framebuffer, name) {
				self.device.destroy_framebuffer(framebuffer, None);
				return Err(e.into());
			}
			Ok(AshFramebuffer {
				framebuffer,
				render_pass,
			})
		}
	}

	fn free_allocation(&self, allocation: Allocation) {
		if let Err(e) = self.memory_allocator().free(allocation) {
			log::error!("Failed to free memory allocation: {}", e);
		}
	}

	unsafe fn cmd_image_barrier(&self, cmd: ash::vk::CommandBuffer, barrier: ImageMemoryBarrier2) {
		unsafe {
			self.device.cmd_pipeline_barrier2(
				cmd,
				&DependencyInfo::default().image_memory_barriers(slice::from_ref(&barrier)),
			);
		}
	}
}

fn color_subresource_range() -> ImageSubresourceRange {
	ImageSubresourceRange {
		aspect_mask: ImageAspectFlags::COLOR,
		base_mip_level: 0,
		level_count: 1,
		base_array_layer: 0,
		layer_count: 1,
	}
}

fn image_barrier(
	image: ash::vk::Image,
	(old_layout, src_stage, src_access): (ImageLayout, ash::vk::PipelineStageFlags2, ash::vk::AccessFlags2),
	(new_layout, dst_stage, dst_access): (ImageLayout, ash::vk::PipelineStageFlags2, ash::vk::AccessFlags2),
) -> ImageMemoryBarrier2<'static> {
	ImageMemoryBarrier2::default()
		.image(image)
		.old_layout(old_layout)
		.new_layout(new_layout)
		.src_stage_mask(src_stage)
		.src_access_mask(src_access)
		.dst_stage_mask(dst_stage)
		.dst_access_mask(dst_access)
		.subresource_range(color_subresource_range())
}

impl Deref for Ash {
	type Target = AshCreateInfo;

	fn deref(&self) -> &Self::Target {
		&self.create_info
	}
}

impl Drop for Ash {
	fn drop(&mut self) {
		unsafe {
			if let Err(e) = self.device.device_wait_idle() {
				log::error!("Failed to wait for device idle before destruction: {}", e);
			}
			self.render_passes.destroy(&self.create_info.device);
			for set_layout in self.uniform_layouts {
				self.create_info.device.destroy_descriptor_set_layout(set_layout, None);
			}
		}
	}
}

pub struct AshCreateInfo {
	pub entry: ash::Entry,
	pub instance: ash::Instance,
	pub physical_device: ash::vk::PhysicalDevice,
	pub device: ash::Device,
	pub memory_allocator: Option<Mutex<Allocator>>,
	pub queue_family_index: u32,
	pub queue: Mutex<ash::vk::Queue>,
	pub extensions: AshExtensions,
	pub destroy: Option<AshDestroyFn>,
}

pub type AshDestroyFn = Box<dyn FnOnce(&mut AshCreateInfo) + Send + Sync>;

#[derive(Default)]
#[non_exhaustive]
pub struct AshExtensions {
	pub debug_utils: Option<debug_utils::Device>,
	pub surface: Option<surface::Instance>,
	pub swapchain: Option<swapchain::Device>,
}

impl AshExtensions {
	pub fn debug_utils(&self) -> Result<&debug_utils::Device, AshError> {
		self.debug_utils.as_ref().ok_or(AshError::MISSING_EXTENSION)
	}

	pub fn surface(&self) -> Result<&surface::Instance, AshError> {
		self.surface.as_ref().ok_or(AshError::MISSING_EXTENSION)
	}

	pub fn swapchain(&self) -> Result<&swapchain::Device, AshError> {
		self.swapchain.as_ref().ok_or(AshError::MISSING_EXTENSION)
	}
}

impl AshCreateInfo {
	pub fn memory_allocator(&self) -> MutexGuard<'_, RawMutex, Allocator> {
		self.memory_allocator
			.as_ref()
			.expect("memory allocator used after destruction")
			.lock()
	}
}

impl Drop for AshCreateInfo {
	fn drop(&mut self) {
		if let Some(destroy) = self.destroy.take() {
			destroy(self);
		}
	}
}

/// Wraps gpu-allocator's Allocation to be able to [`Option::take`] it on destruction.
///
/// # Safety
/// UnsafeCell: Required to gain mutable access for writing mapped memory, see [`FramePlatform::write_buffer`].
#[derive(Debug)]
pub struct AshMemoryAllocation(UnsafeCell<Option<Allocation>>);

impl AshMemoryAllocation {
	/// # Safety
	/// You must [`Self::take`] the Allocation and free it manually before dropping self
	pub unsafe fn new(allocation: Allocation) -> Self {
		Self(UnsafeCell::new(Some(allocation)))
	}

	/// Get exclusive mutable access to the Allocation
	///
	/// # Safety
	/// You must ensure you have exclusive mutable access to the Allocation
	#[allow(clippy::mut_from_ref)]
	pub unsafe fn get_mut(&self) -> &mut Allocation {
		unsafe { (*self.0.get()).as_mut().expect("allocation already freed") }
	}

	pub fn take(&self) -> Option<Allocation> {
		unsafe { (*self.0.get()).take() }
	}
}

/// Safety: Allocation is Send and Sync, mutable access is guarded by the safety contracts of the platform fns
unsafe impl Send for AshMemoryAllocation {}
unsafe impl Sync for AshMemoryAllocation {}

#[derive(Debug)]
pub struct AshBuffer {
	pub buffer: ash::vk::Buffer,
	pub size: u64,
	pub allocation: AshMemoryAllocation,
}

#[derive(Debug)]
pub struct AshImage {
	pub image: ash::vk::Image,
	pub extent: Extent,
	pub format: ash::vk::Format,
	pub usage: ImageUsage,
	pub allocation: AshMemoryAllocation,
}

#[derive(Copy, Clone, Debug)]
pub struct AshImageView {
	pub image_view: ash::vk::ImageView,
	pub format: ash::vk::Format,
	/// the layout the image is left in by render passes drawing to it
	pub final_layout: ImageLayout,
}

#[derive(Copy, Clone, Debug)]
pub struct AshFramebuffer {
	pub framebuffer: ash::vk::Framebuffer,
	pub render_pass: ash::vk::RenderPass,
}

#[derive(Error)]
pub enum AshError {
	#[error("VkResult: {0}")]
	Vk(#[from] ash::vk::Result),
	#[error("gpu-allocator Error: {0}")]
	Allocation(#[from] gpu_allocator::AllocationError),
}

impl AshError {
	const MISSING_EXTENSION: Self = AshError::Vk(ash::vk::Result::ERROR_EXTENSION_NOT_PRESENT);
}

impl core::fmt::Debug for AshError {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

unsafe impl FramePlatform for Ash {
	type Buffer = AshBuffer;
	type Image = AshImage;
	type ImageView = AshImageView;
	type Framebuffer = AshFramebuffer;
	type DescriptorPool = ash::vk::DescriptorPool;
	type DescriptorSet = ash::vk::DescriptorSet;
	type CommandPool = ash::vk::CommandPool;
	type CommandBuffer = ash::vk::CommandBuffer;
	type Fence = ash::vk::Fence;
	type Semaphore = ash::vk::Semaphore;
	type Surface = ash::vk::SurfaceKHR;
	type Swapchain = ash::vk::SwapchainKHR;
	type Error = AshError;

	fn limits(&self) -> DeviceLimits {
		self.limits
	}

	unsafe fn wait_idle(&self) -> Result<(), AshError> {
		unsafe { Ok(self.device.device_wait_idle()?) }
	}

	unsafe fn create_buffer(&self, create_info: &BufferCreateInfo) -> Result<AshBuffer, AshError> {
		unsafe {
			let buffer = self.device.create_buffer(
				&ash::vk::BufferCreateInfo::default()
					.usage(create_info.usage.to_ash_buffer_usage_flags())
					.size(create_info.size)
					.sharing_mode(SharingMode::EXCLUSIVE),
				None,
			)?;
			let allocation = (|| -> Result<Allocation, AshError> {
				self.set_debug_object_name(buffer, create_info.name)?;
				let requirements = self.device.get_buffer_memory_requirements(buffer);
				let allocation = self.memory_allocator().allocate(&AllocationCreateDesc {
					requirements,
					name: create_info.name,
					location: MemoryLocation::CpuToGpu,
					allocation_scheme: AllocationScheme::GpuAllocatorManaged,
					linear: true,
				})?;
				if let Err(e) = self
					.device
					.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
				{
					self.free_allocation(allocation);
					return Err(e.into());
				}
				Ok(allocation)
			})();
			match allocation {
				Ok(allocation) => Ok(AshBuffer {
					buffer,
					size: create_info.size,
					allocation: AshMemoryAllocation::new(allocation),
				}),
				Err(e) => {
					self.device.destroy_buffer(buffer, None);
					Err(e)
				}
			}
		}
	}

	unsafe fn write_buffer(&self, buffer: &AshBuffer, offset: u64, data: &[u8]) {
		unsafe {
			let slab = buffer.allocation.get_mut();
			if let Err(e) = presser::copy_from_slice_to_offset(data, slab, offset as usize) {
				panic!(
					"writing {} bytes at offset {} out of bounds of buffer with {} bytes: {:?}",
					data.len(),
					offset,
					buffer.size,
					e
				);
			}
		}
	}

	unsafe fn destroy_buffer(&self, buffer: AshBuffer) {
		unsafe {
			if let Some(allocation) = buffer.allocation.take() {
				self.free_allocation(allocation);
			}
			self.device.destroy_buffer(buffer.buffer, None);
		}
	}

	unsafe fn create_image(&self, create_info: &ImageCreateInfo) -> Result<AshImage, AshError> {
		unsafe {
			let format = create_info.format.to_ash_format();
			let image = self.device.create_image(
				&ash::vk::ImageCreateInfo::default()
					.image_type(ash::vk::ImageType::TYPE_2D)
					.format(format)
					.extent(create_info.extent.into())
					.mip_levels(1)
					.array_layers(1)
					.samples(SampleCountFlags::TYPE_1)
					.tiling(ImageTiling::OPTIMAL)
					.usage(create_info.usage.to_ash_image_usage_flags())
					.sharing_mode(SharingMode::EXCLUSIVE)
					.initial_layout(ImageLayout::UNDEFINED),
				None,
			)?;
			let allocation = (|| -> Result<Allocation, AshError> {
				self.set_debug_object_name(image, create_info.name)?;
				let requirements = self.device.get_image_memory_requirements(image);
				let allocation = self.memory_allocator().allocate(&AllocationCreateDesc {
					requirements,
					name: create_info.name,
					location: MemoryLocation::GpuOnly,
					allocation_scheme: AllocationScheme::GpuAllocatorManaged,
					linear: false,
				})?;
				if let Err(e) = self
					.device
					.bind_image_memory(image, allocation.memory(), allocation.offset())
				{
					self.free_allocation(allocation);
					return Err(e.into());
				}
				Ok(allocation)
			})();
			match allocation {
				Ok(allocation) => Ok(AshImage {
					image,
					extent: create_info.extent,
					format,
					usage: create_info.usage,
					allocation: AshMemoryAllocation::new(allocation),
				}),
				Err(e) => {
					self.device.destroy_image(image, None);
					Err(e)
				}
			}
		}
	}

	unsafe fn create_image_view(&self, image: &AshImage, name: &str) -> Result<AshImageView, AshError> {
		unsafe { self.create_ash_image_view(image.image, image.format, image.usage.to_ash_resting_layout(), name) }
	}

	unsafe fn destroy_image(&self, image: AshImage) {
		unsafe {
			if let Some(allocation) = image.allocation.take() {
				self.free_allocation(allocation);
			}
			self.device.destroy_image(image.image, None);
		}
	}

	unsafe fn destroy_image_view(&self, image_view: AshImageView) {
		unsafe {
			self.device.destroy_image_view(image_view.image_view, None);
		}
	}

	unsafe fn create_framebuffer(
		&self,
		image_view: AshImageView,
		extent: Extent,
		name: &str,
	) -> Result<AshFramebuffer, AshError> {
		unsafe { self.create_ash_framebuffer(image_view, extent, name) }
	}

	unsafe fn destroy_framebuffer(&self, framebuffer: AshFramebuffer) {
		unsafe {
			// the render pass is owned by the cache
			self.device.destroy_framebuffer(framebuffer.framebuffer, None);
		}
	}

	unsafe fn create_uniform_descriptor(
		&self,
		layout: UniformLayout,
		buffer: &AshBuffer,
		range: u64,
		name: &str,
	) -> Result<(ash::vk::DescriptorPool, ash::vk::DescriptorSet), AshError> {
		unsafe {
			let pool = self.device.create_descriptor_pool(
				&DescriptorPoolCreateInfo::default()
					.pool_sizes(&[DescriptorPoolSize::default()
						.ty(DescriptorType::UNIFORM_BUFFER_DYNAMIC)
						.descriptor_count(1)])
					.max_sets(1),
				None,
			)?;
			let set = (|| -> Result<ash::vk::DescriptorSet, AshError> {
				self.set_debug_object_name(pool, name)?;
				let sets = self.device.allocate_descriptor_sets(
					&DescriptorSetAllocateInfo::default()
						.descriptor_pool(pool)
						.set_layouts(&[self.uniform_layout(layout)]),
				)?;
				let set = sets
					.into_iter()
					.next()
					.ok_or(AshError::Vk(ash::vk::Result::ERROR_OUT_OF_POOL_MEMORY))?;
				let buffer_info = DescriptorBufferInfo::default()
					.buffer(buffer.buffer)
					.offset(0)
					.range(range);
				self.device.update_descriptor_sets(
					&[WriteDescriptorSet::default()
						.dst_set(set)
						.dst_binding(0)
						.descriptor_type(DescriptorType::UNIFORM_BUFFER_DYNAMIC)
						.buffer_info(slice::from_ref(&buffer_info))],
					&[],
				);
				Ok(set)
			})();
			match set {
				Ok(set) => Ok((pool, set)),
				Err(e) => {
					self.device.destroy_descriptor_pool(pool, None);
					Err(e)
				}
			}
		}
	}

	unsafe fn destroy_descriptor_pool(&self, pool: ash::vk::DescriptorPool) {
		unsafe {
			self.device.destroy_descriptor_pool(pool, None);
		}
	}

	unsafe fn create_fence(&self, signaled: bool, name: &str) -> Result<ash::vk::Fence, AshError> {
		unsafe {
			let flags = if signaled {
				FenceCreateFlags::SIGNALED
			} else {
				FenceCreateFlags::empty()
			};
			let fence = self.device.create_fence(&FenceCreateInfo::default().flags(flags), None)?;
			self.set_debug_object_name(fence, name)?;
			Ok(fence)
		}
	}

	unsafe fn fence_status(&self, fence: ash::vk::Fence) -> Result<FenceStatus, AshError> {
		unsafe {
			Ok(match self.device.get_fence_status(fence)? {
				true => FenceStatus::Signaled,
				false => FenceStatus::NotReady,
			})
		}
	}

	unsafe fn wait_for_fence(&self, fence: ash::vk::Fence, timeout: Duration) -> Result<WaitResult, AshError> {
		unsafe {
			let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
			match self.device.wait_for_fences(&[fence], true, nanos) {
				Ok(()) => Ok(WaitResult::Signaled),
				Err(ash::vk::Result::TIMEOUT) => Ok(WaitResult::Timeout),
				Err(e) => Err(e.into()),
			}
		}
	}

	unsafe fn reset_fence(&self, fence: ash::vk::Fence) -> Result<(), AshError> {
		unsafe { Ok(self.device.reset_fences(&[fence])?) }
	}

	unsafe fn destroy_fence(&self, fence: ash::vk::Fence) {
		unsafe {
			self.device.destroy_fence(fence, None);
		}
	}

	unsafe fn create_semaphore(&self, name: &str) -> Result<ash::vk::Semaphore, AshError> {
		unsafe {
			let semaphore = self.device.create_semaphore(&SemaphoreCreateInfo::default(), None)?;
			self.set_debug_object_name(semaphore, name)?;
			Ok(semaphore)
		}
	}

	unsafe fn destroy_semaphore(&self, semaphore: ash::vk::Semaphore) {
		unsafe {
			self.device.destroy_semaphore(semaphore, None);
		}
	}

	unsafe fn create_command_pool(
		&self,
		name: &str,
	) -> Result<(ash::vk::CommandPool, ash::vk::CommandBuffer), AshError> {
		unsafe {
			let pool = self.device.create_command_pool(
				&CommandPoolCreateInfo::default()
					.flags(CommandPoolCreateFlags::TRANSIENT)
					.queue_family_index(self.queue_family_index),
				None,
			)?;
			let cmd = (|| -> Result<ash::vk::CommandBuffer, AshError> {
				self.set_debug_object_name(pool, name)?;
				let buffers = self.device.allocate_command_buffers(
					&CommandBufferAllocateInfo::default()
						.command_pool(pool)
						.level(CommandBufferLevel::PRIMARY)
						.command_buffer_count(1),
				)?;
				let cmd = buffers
					.into_iter()
					.next()
					.ok_or(AshError::Vk(ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;
				self.set_debug_object_name(cmd, name)?;
				Ok(cmd)
			})();
			match cmd {
				Ok(cmd) => Ok((pool, cmd)),
				Err(e) => {
					self.device.destroy_command_pool(pool, None);
					Err(e)
				}
			}
		}
	}

	unsafe fn begin_command_buffer(
		&self,
		pool: &ash::vk::CommandPool,
		cmd: ash::vk::CommandBuffer,
	) -> Result<(), AshError> {
		unsafe {
			self.device.reset_command_pool(*pool, CommandPoolResetFlags::empty())?;
			self.device.begin_command_buffer(
				cmd,
				&CommandBufferBeginInfo::default().flags(CommandBufferUsageFlags::ONE_TIME_SUBMIT),
			)?;
			Ok(())
		}
	}

	unsafe fn end_command_buffer(&self, cmd: ash::vk::CommandBuffer) -> Result<(), AshError> {
		unsafe { Ok(self.device.end_command_buffer(cmd)?) }
	}

	unsafe fn destroy_command_pool(&self, pool: ash::vk::CommandPool) {
		unsafe {
			self.device.destroy_command_pool(pool, None);
		}
	}

	unsafe fn cmd_host_write_barrier(
		&self,
		cmd: ash::vk::CommandBuffer,
		buffer: &AshBuffer,
		offset: u64,
		size: u64,
		consumer: BufferConsumer,
	) {
		unsafe {
			let (dst_stage, dst_access) = consumer.to_ash_stage_access();
			let barrier = BufferMemoryBarrier2::default()
				.buffer(buffer.buffer)
				.offset(offset)
				.size(size)
				.src_stage_mask(ash::vk::PipelineStageFlags2::HOST)
				.src_access_mask(ash::vk::AccessFlags2::HOST_WRITE)
				.dst_stage_mask(dst_stage)
				.dst_access_mask(dst_access);
			self.device.cmd_pipeline_barrier2(
				cmd,
				&DependencyInfo::default().buffer_memory_barriers(slice::from_ref(&barrier)),
			);
		}
	}

	unsafe fn cmd_upload_image(&self, cmd: ash::vk::CommandBuffer, src: &AshBuffer, src_offset: u64, dst: &AshImage) {
		unsafe {
			use ash::vk::{AccessFlags2 as A, PipelineStageFlags2 as S};
			self.cmd_image_barrier(
				cmd,
				image_barrier(
					dst.image,
					(ImageLayout::UNDEFINED, S::NONE, A::NONE),
					(ImageLayout::TRANSFER_DST_OPTIMAL, S::COPY, A::TRANSFER_WRITE),
				),
			);
			let region = BufferImageCopy::default()
				.buffer_offset(src_offset)
				.buffer_row_length(0)
				.buffer_image_height(0)
				.image_subresource(ImageSubresourceLayers {
					aspect_mask: ImageAspectFlags::COLOR,
					mip_level: 0,
					base_array_layer: 0,
					layer_count: 1,
				})
				.image_extent(dst.extent.into());
			self.device.cmd_copy_buffer_to_image(
				cmd,
				src.buffer,
				dst.image,
				ImageLayout::TRANSFER_DST_OPTIMAL,
				slice::from_ref(&region),
			);
			self.cmd_image_barrier(
				cmd,
				image_barrier(
					dst.image,
					(ImageLayout::TRANSFER_DST_OPTIMAL, S::COPY, A::TRANSFER_WRITE),
					(
						ImageLayout::SHADER_READ_ONLY_OPTIMAL,
						S::FRAGMENT_SHADER,
						A::SHADER_SAMPLED_READ,
					),
				),
			);
		}
	}

	unsafe fn cmd_prepare_render_target(&self, cmd: ash::vk::CommandBuffer, image: &AshImage, sampled: bool) {
		unsafe {
			use ash::vk::{AccessFlags2 as A, PipelineStageFlags2 as S};
			let layout = if sampled {
				ImageLayout::SHADER_READ_ONLY_OPTIMAL
			} else {
				ImageLayout::TRANSFER_SRC_OPTIMAL
			};
			debug_assert_eq!(layout, image.usage.to_ash_resting_layout());
			self.cmd_image_barrier(
				cmd,
				image_barrier(
					image.image,
					(ImageLayout::UNDEFINED, S::NONE, A::NONE),
					(layout, S::ALL_COMMANDS, A::MEMORY_READ),
				),
			);
		}
	}

	unsafe fn cmd_begin_render_pass(
		&self,
		cmd: ash::vk::CommandBuffer,
		framebuffer: AshFramebuffer,
		extent: Extent,
		clear_color: [f32; 4],
	) {
		unsafe {
			let clear_value = ClearValue {
				color: ClearColorValue { float32: clear_color },
			};
			self.device.cmd_begin_render_pass(
				cmd,
				&RenderPassBeginInfo::default()
					.render_pass(framebuffer.render_pass)
					.framebuffer(framebuffer.framebuffer)
					.render_area(ash::vk::Rect2D {
						offset: Offset2D::default(),
						extent: extent.into(),
					})
					.clear_values(slice::from_ref(&clear_value)),
				SubpassContents::INLINE,
			);
			self.device.cmd_set_viewport(
				cmd,
				0,
				&[ash::vk::Viewport {
					x: 0.,
					y: 0.,
					width: extent.width as f32,
					height: extent.height as f32,
					min_depth: 0.,
					max_depth: 1.,
				}],
			);
		}
	}

	unsafe fn cmd_set_scissor(&self, cmd: ash::vk::CommandBuffer, scissor: ScissorRect) {
		unsafe {
			self.device.cmd_set_scissor(
				cmd,
				0,
				&[ash::vk::Rect2D {
					offset: Offset2D {
						x: scissor.x,
						y: scissor.y,
					},
					extent: Extent::new(scissor.width, scissor.height).into(),
				}],
			);
		}
	}

	unsafe fn cmd_end_render_pass(&self, cmd: ash::vk::CommandBuffer) {
		unsafe {
			self.device.cmd_end_render_pass(cmd);
		}
	}

	unsafe fn submit(&self, submit: &SubmitInfo<'_, Self>) -> Result<(), AshError> {
		unsafe {
			let wait_stages = submit
				.wait_semaphores
				.iter()
				.map(|_| PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
				.collect::<SmallVec<[_; 4]>>();
			let info = ash::vk::SubmitInfo::default()
				.wait_semaphores(submit.wait_semaphores)
				.wait_dst_stage_mask(&wait_stages)
				.command_buffers(slice::from_ref(&submit.command_buffer))
				.signal_semaphores(submit.signal_semaphores);
			let queue = self.queue.lock();
			self.device.queue_submit(
				*queue,
				slice::from_ref(&info),
				submit.fence.unwrap_or(ash::vk::Fence::null()),
			)?;
			Ok(())
		}
	}

	unsafe fn surface_state(&self, surface: ash::vk::SurfaceKHR) -> Result<SurfaceState, AshError> {
		unsafe { self.query_surface_state(surface) }
	}

	unsafe fn create_swapchain(
		&self,
		surface: ash::vk::SurfaceKHR,
		old_swapchain: Option<ash::vk::SwapchainKHR>,
		name: &str,
	) -> Result<SwapchainResources<Self>, AshError> {
		unsafe { self.create_ash_swapchain(surface, old_swapchain, name) }
	}

	unsafe fn destroy_swapchain(&self, swapchain: ash::vk::SwapchainKHR) {
		unsafe {
			match self.extensions.swapchain() {
				Ok(ext) => ext.destroy_swapchain(swapchain, None),
				Err(e) => log::error!("Failed to destroy swapchain {:?}: {}", swapchain, e),
			}
		}
	}

	unsafe fn destroy_surface(&self, surface: ash::vk::SurfaceKHR) {
		unsafe {
			self.surface_extents.lock().remove(&surface);
			match self.extensions.surface() {
				Ok(ext) => ext.destroy_surface(surface, None),
				Err(e) => log::error!("Failed to destroy surface {:?}: {}", surface, e),
			}
		}
	}

	unsafe fn acquire_next_image(
		&self,
		swapchain: ash::vk::SwapchainKHR,
		signal: ash::vk::Semaphore,
		timeout: Duration,
	) -> Result<AcquireResult, AshError> {
		unsafe { self.acquire_ash_image(swapchain, signal, timeout) }
	}

	unsafe fn present(
		&self,
		swapchain: ash::vk::SwapchainKHR,
		image_index: u32,
		wait: ash::vk::Semaphore,
	) -> Result<PresentResult, AshError> {
		unsafe { self.present_ash_image(swapchain, image_index, wait) }
	}
}
