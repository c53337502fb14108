//! A recording [`FramePlatform`] for tests: handles are plain ids, buffers are host memory and every destruction and
//! recorded command is logged.

use crate::params::NativeWindowId;
use crate::platform::{
	AcquireResult, BufferConsumer, BufferCreateInfo, DeviceLimits, Extent, FenceStatus, FramePlatform, ImageCreateInfo,
	ImageFormat, PresentResult, ScissorRect, SubmitInfo, SurfaceProvider, SurfaceRotation, SurfaceState,
	SwapchainResources, UniformLayout, WaitResult,
};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;
use std::time::Duration;
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
	Buffer,
	Image,
	ImageView,
	Framebuffer,
	DescriptorPool,
	CommandPool,
	Fence,
	Semaphore,
	Swapchain,
	Surface,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DummyHandle(pub u64);

#[derive(Debug, Eq, PartialEq, Hash)]
pub struct DummyBuffer {
	pub id: u64,
	pub size: u64,
}

#[derive(Debug, Eq, PartialEq, Hash)]
pub struct DummyImage {
	pub id: u64,
	pub extent: Extent,
	pub format: ImageFormat,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
	Begin,
	End,
	Barrier {
		buffer: u64,
		offset: u64,
		size: u64,
		consumer: BufferConsumer,
	},
	UploadImage {
		buffer: u64,
		offset: u64,
		image: u64,
	},
	PrepareRenderTarget {
		image: u64,
		sampled: bool,
	},
	BeginRenderPass {
		framebuffer: u64,
		extent: Extent,
	},
	Scissor(ScissorRect),
	EndRenderPass,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
	pub command_buffer: u64,
	pub wait_semaphores: Vec<u64>,
	pub signal_semaphores: Vec<u64>,
	pub fence: Option<u64>,
}

#[derive(Debug, Error)]
pub enum DummyError {
	#[error("device lost")]
	DeviceLost,
	#[error("out of device memory")]
	OutOfMemory,
}

#[derive(Default)]
struct State {
	live: FxHashSet<(Kind, u64)>,
	destroyed: Vec<(Kind, u64)>,
	buffers: FxHashMap<u64, Vec<u8>>,
	fences: FxHashMap<u64, bool>,
	/// surface -> state
	surfaces: FxHashMap<u64, SurfaceState>,
	/// swapchain -> (surface, image count)
	swapchains: FxHashMap<u64, (u64, u32)>,
	next_image: FxHashMap<u64, u32>,
	out_of_date_surfaces: FxHashSet<u64>,
	commands: Vec<Command>,
	submissions: Vec<Submission>,
	presents: Vec<(u64, u32)>,
}

pub struct DummyPlatform {
	next_id: AtomicU64,
	state: Mutex<State>,
	pub min_uniform_alignment: u64,
	pub swapchain_images: u32,
	/// A wait on an unsignaled fence signals it, as if the GPU caught up, instead of timing out.
	pub complete_on_wait: Mutex<bool>,
	/// Fences of submissions are signaled immediately.
	pub complete_on_submit: Mutex<bool>,
	pub device_lost: Mutex<bool>,
	/// Buffers larger than this fail to allocate.
	pub max_buffer_size: Mutex<u64>,
}

impl Default for DummyPlatform {
	fn default() -> Self {
		Self {
			next_id: AtomicU64::new(1),
			state: Mutex::new(State::default()),
			min_uniform_alignment: 256,
			swapchain_images: 3,
			complete_on_wait: Mutex::new(true),
			complete_on_submit: Mutex::new(true),
			device_lost: Mutex::new(false),
			max_buffer_size: Mutex::new(u64::MAX),
		}
	}
}

impl DummyPlatform {
	fn create(&self, kind: Kind) -> u64 {
		let id = self.next_id.fetch_add(1, Relaxed);
		self.state.lock().live.insert((kind, id));
		id
	}

	fn destroy(&self, kind: Kind, id: u64) {
		let mut state = self.state.lock();
		assert!(state.live.remove(&(kind, id)), "{:?} {} destroyed twice or never created", kind, id);
		state.destroyed.push((kind, id));
	}

	fn record(&self, command: Command) {
		self.state.lock().commands.push(command);
	}

	pub fn is_destroyed(&self, kind: Kind, id: u64) -> bool {
		self.state.lock().destroyed.contains(&(kind, id))
	}

	pub fn destroyed(&self, kind: Kind) -> Vec<u64> {
		let state = self.state.lock();
		state
			.destroyed
			.iter()
			.filter(|(k, _)| *k == kind)
			.map(|(_, id)| *id)
			.collect()
	}

	pub fn live_count(&self, kind: Kind) -> usize {
		self.state.lock().live.iter().filter(|(k, _)| *k == kind).count()
	}

	pub fn live_total(&self) -> usize {
		self.state.lock().live.len()
	}

	pub fn buffer_contents(&self, buffer: &DummyBuffer) -> Vec<u8> {
		self.state.lock().buffers[&buffer.id].clone()
	}

	pub fn signal_fence(&self, fence: DummyHandle) {
		self.state.lock().fences.insert(fence.0, true);
	}

	pub fn add_surface(&self, extent: Extent) -> DummyHandle {
		let id = self.create(Kind::Surface);
		self.state.lock().surfaces.insert(
			id,
			SurfaceState {
				extent,
				rotation: SurfaceRotation::Identity,
			},
		);
		DummyHandle(id)
	}

	pub fn set_surface_state(&self, surface: DummyHandle, state: SurfaceState) {
		self.state.lock().surfaces.insert(surface.0, state);
	}

	/// Acquire and present report [`AcquireResult::OutOfDate`] for all swapchains of this surface.
	pub fn set_out_of_date(&self, surface: DummyHandle, out_of_date: bool) {
		let mut state = self.state.lock();
		if out_of_date {
			state.out_of_date_surfaces.insert(surface.0);
		} else {
			state.out_of_date_surfaces.remove(&surface.0);
		}
	}

	pub fn swapchain_surface(&self, swapchain: DummyHandle) -> u64 {
		self.state.lock().swapchains[&swapchain.0].0
	}

	pub fn take_commands(&self) -> Vec<Command> {
		std::mem::take(&mut self.state.lock().commands)
	}

	pub fn take_submissions(&self) -> Vec<Submission> {
		std::mem::take(&mut self.state.lock().submissions)
	}

	pub fn take_presents(&self) -> Vec<(u64, u32)> {
		std::mem::take(&mut self.state.lock().presents)
	}

	fn check_device(&self) -> Result<(), DummyError> {
		if *self.device_lost.lock() {
			Err(DummyError::DeviceLost)
		} else {
			Ok(())
		}
	}
}

unsafe impl FramePlatform for DummyPlatform {
	type Buffer = DummyBuffer;
	type Image = DummyImage;
	type ImageView = DummyHandle;
	type Framebuffer = DummyHandle;
	type DescriptorPool = DummyHandle;
	type DescriptorSet = DummyHandle;
	type CommandPool = DummyHandle;
	type CommandBuffer = DummyHandle;
	type Fence = DummyHandle;
	type Semaphore = DummyHandle;
	type Surface = DummyHandle;
	type Swapchain = DummyHandle;
	type Error = DummyError;

	fn limits(&self) -> DeviceLimits {
		DeviceLimits {
			min_uniform_buffer_offset_alignment: self.min_uniform_alignment,
		}
	}

	unsafe fn wait_idle(&self) -> Result<(), Self::Error> {
		self.check_device()?;
		let mut state = self.state.lock();
		state.fences.values_mut().for_each(|signaled| *signaled = true);
		Ok(())
	}

	unsafe fn create_buffer(&self, create_info: &BufferCreateInfo) -> Result<Self::Buffer, Self::Error> {
		if create_info.size > *self.max_buffer_size.lock() {
			return Err(DummyError::OutOfMemory);
		}
		let id = self.create(Kind::Buffer);
		self.state
			.lock()
			.buffers
			.insert(id, vec![0; create_info.size as usize]);
		Ok(DummyBuffer {
			id,
			size: create_info.size,
		})
	}

	unsafe fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) {
		let mut state = self.state.lock();
		let memory = state.buffers.get_mut(&buffer.id).expect("write to destroyed buffer");
		memory[offset as usize..offset as usize + data.len()].copy_from_slice(data);
	}

	unsafe fn destroy_buffer(&self, buffer: Self::Buffer) {
		self.destroy(Kind::Buffer, buffer.id);
		self.state.lock().buffers.remove(&buffer.id);
	}

	unsafe fn create_image(&self, create_info: &ImageCreateInfo) -> Result<Self::Image, Self::Error> {
		Ok(DummyImage {
			id: self.create(Kind::Image),
			extent: create_info.extent,
			format: create_info.format,
		})
	}

	unsafe fn create_image_view(&self, _image: &Self::Image, _name: &str) -> Result<Self::ImageView, Self::Error> {
		Ok(DummyHandle(self.create(Kind::ImageView)))
	}

	unsafe fn destroy_image(&self, image: Self::Image) {
		self.destroy(Kind::Image, image.id);
	}

	unsafe fn destroy_image_view(&self, image_view: Self::ImageView) {
		self.destroy(Kind::ImageView, image_view.0);
	}

	unsafe fn create_framebuffer(
		&self,
		_image_view: Self::ImageView,
		_extent: Extent,
		_name: &str,
	) -> Result<Self::Framebuffer, Self::Error> {
		Ok(DummyHandle(self.create(Kind::Framebuffer)))
	}

	unsafe fn destroy_framebuffer(&self, framebuffer: Self::Framebuffer) {
		self.destroy(Kind::Framebuffer, framebuffer.0);
	}

	unsafe fn create_uniform_descriptor(
		&self,
		_layout: UniformLayout,
		_buffer: &Self::Buffer,
		_range: u64,
		_name: &str,
	) -> Result<(Self::DescriptorPool, Self::DescriptorSet), Self::Error> {
		let pool = self.create(Kind::DescriptorPool);
		Ok((DummyHandle(pool), DummyHandle(pool)))
	}

	unsafe fn destroy_descriptor_pool(&self, pool: Self::DescriptorPool) {
		self.destroy(Kind::DescriptorPool, pool.0);
	}

	unsafe fn create_fence(&self, signaled: bool, _name: &str) -> Result<Self::Fence, Self::Error> {
		let id = self.create(Kind::Fence);
		self.state.lock().fences.insert(id, signaled);
		Ok(DummyHandle(id))
	}

	unsafe fn fence_status(&self, fence: Self::Fence) -> Result<FenceStatus, Self::Error> {
		self.check_device()?;
		Ok(match self.state.lock().fences[&fence.0] {
			true => FenceStatus::Signaled,
			false => FenceStatus::NotReady,
		})
	}

	unsafe fn wait_for_fence(&self, fence: Self::Fence, _timeout: Duration) -> Result<WaitResult, Self::Error> {
		self.check_device()?;
		let complete_on_wait = *self.complete_on_wait.lock();
		let mut state = self.state.lock();
		let signaled = state.fences.get_mut(&fence.0).expect("wait on destroyed fence");
		if complete_on_wait {
			*signaled = true;
		}
		Ok(match *signaled {
			true => WaitResult::Signaled,
			false => WaitResult::Timeout,
		})
	}

	unsafe fn reset_fence(&self, fence: Self::Fence) -> Result<(), Self::Error> {
		self.state.lock().fences.insert(fence.0, false);
		Ok(())
	}

	unsafe fn destroy_fence(&self, fence: Self::Fence) {
		self.destroy(Kind::Fence, fence.0);
		self.state.lock().fences.remove(&fence.0);
	}

	unsafe fn create_semaphore(&self, _name: &str) -> Result<Self::Semaphore, Self::Error> {
		Ok(DummyHandle(self.create(Kind::Semaphore)))
	}

	unsafe fn destroy_semaphore(&self, semaphore: Self::Semaphore) {
		self.destroy(Kind::Semaphore, semaphore.0);
	}

	unsafe fn create_command_pool(&self, _name: &str) -> Result<(Self::CommandPool, Self::CommandBuffer), Self::Error> {
		let pool = self.create(Kind::CommandPool);
		Ok((DummyHandle(pool), DummyHandle(pool)))
	}

	unsafe fn begin_command_buffer(
		&self,
		_pool: &Self::CommandPool,
		_cmd: Self::CommandBuffer,
	) -> Result<(), Self::Error> {
		self.check_device()?;
		self.record(Command::Begin);
		Ok(())
	}

	unsafe fn end_command_buffer(&self, _cmd: Self::CommandBuffer) -> Result<(), Self::Error> {
		self.record(Command::End);
		Ok(())
	}

	unsafe fn destroy_command_pool(&self, pool: Self::CommandPool) {
		self.destroy(Kind::CommandPool, pool.0);
	}

	unsafe fn cmd_host_write_barrier(
		&self,
		_cmd: Self::CommandBuffer,
		buffer: &Self::Buffer,
		offset: u64,
		size: u64,
		consumer: BufferConsumer,
	) {
		self.record(Command::Barrier {
			buffer: buffer.id,
			offset,
			size,
			consumer,
		});
	}

	unsafe fn cmd_upload_image(&self, _cmd: Self::CommandBuffer, src: &Self::Buffer, src_offset: u64, dst: &Self::Image) {
		self.record(Command::UploadImage {
			buffer: src.id,
			offset: src_offset,
			image: dst.id,
		});
	}

	unsafe fn cmd_prepare_render_target(&self, _cmd: Self::CommandBuffer, image: &Self::Image, sampled: bool) {
		self.record(Command::PrepareRenderTarget {
			image: image.id,
			sampled,
		});
	}

	unsafe fn cmd_begin_render_pass(
		&self,
		_cmd: Self::CommandBuffer,
		framebuffer: Self::Framebuffer,
		extent: Extent,
		_clear_color: [f32; 4],
	) {
		self.record(Command::BeginRenderPass {
			framebuffer: framebuffer.0,
			extent,
		});
	}

	unsafe fn cmd_set_scissor(&self, _cmd: Self::CommandBuffer, scissor: ScissorRect) {
		self.record(Command::Scissor(scissor));
	}

	unsafe fn cmd_end_render_pass(&self, _cmd: Self::CommandBuffer) {
		self.record(Command::EndRenderPass);
	}

	unsafe fn submit(&self, submit: &SubmitInfo<'_, Self>) -> Result<(), Self::Error> {
		self.check_device()?;
		let complete = *self.complete_on_submit.lock();
		let mut state = self.state.lock();
		if let Some(fence) = submit.fence {
			let signaled = state.fences.get_mut(&fence.0).expect("submit with destroyed fence");
			assert!(!*signaled, "submitted with a signaled fence");
			*signaled = complete;
		}
		state.submissions.push(Submission {
			command_buffer: submit.command_buffer.0,
			wait_semaphores: submit.wait_semaphores.iter().map(|s| s.0).collect(),
			signal_semaphores: submit.signal_semaphores.iter().map(|s| s.0).collect(),
			fence: submit.fence.map(|f| f.0),
		});
		Ok(())
	}

	unsafe fn surface_state(&self, surface: Self::Surface) -> Result<SurfaceState, Self::Error> {
		Ok(self.state.lock().surfaces[&surface.0])
	}

	unsafe fn create_swapchain(
		&self,
		surface: Self::Surface,
		old_swapchain: Option<Self::Swapchain>,
		_name: &str,
	) -> Result<SwapchainResources<Self>, Self::Error> {
		if let Some(old) = old_swapchain {
			assert_eq!(self.swapchain_surface(old), surface.0, "old swapchain of another surface");
		}
		let swapchain = self.create(Kind::Swapchain);
		let surface_state = {
			let mut state = self.state.lock();
			state.swapchains.insert(swapchain, (surface.0, self.swapchain_images));
			state.surfaces[&surface.0]
		};
		let image_views = (0..self.swapchain_images)
			.map(|_| DummyHandle(self.create(Kind::ImageView)))
			.collect::<SmallVec<_>>();
		let framebuffers = (0..self.swapchain_images)
			.map(|_| DummyHandle(self.create(Kind::Framebuffer)))
			.collect::<SmallVec<_>>();
		Ok(SwapchainResources {
			swapchain: DummyHandle(swapchain),
			extent: surface_state.extent,
			rotation: surface_state.rotation,
			image_views,
			framebuffers,
		})
	}

	unsafe fn destroy_swapchain(&self, swapchain: Self::Swapchain) {
		self.destroy(Kind::Swapchain, swapchain.0);
	}

	unsafe fn destroy_surface(&self, surface: Self::Surface) {
		self.destroy(Kind::Surface, surface.0);
	}

	unsafe fn acquire_next_image(
		&self,
		swapchain: Self::Swapchain,
		_signal: Self::Semaphore,
		_timeout: Duration,
	) -> Result<AcquireResult, Self::Error> {
		self.check_device()?;
		let mut state = self.state.lock();
		let (surface, image_count) = state.swapchains[&swapchain.0];
		if state.out_of_date_surfaces.contains(&surface) {
			return Ok(AcquireResult::OutOfDate);
		}
		let next = state.next_image.entry(swapchain.0).or_insert(0);
		let image_index = *next;
		*next = (*next + 1) % image_count;
		Ok(AcquireResult::Acquired {
			image_index,
			suboptimal: false,
		})
	}

	unsafe fn present(
		&self,
		swapchain: Self::Swapchain,
		image_index: u32,
		_wait: Self::Semaphore,
	) -> Result<PresentResult, Self::Error> {
		self.check_device()?;
		let mut state = self.state.lock();
		let (surface, _) = state.swapchains[&swapchain.0];
		if state.out_of_date_surfaces.contains(&surface) {
			return Ok(PresentResult::OutOfDate);
		}
		state.presents.push((swapchain.0, image_index));
		Ok(PresentResult::Presented)
	}
}

/// Hands out surfaces registered up front with [`DummySurfaceProvider::register`].
#[derive(Default)]
pub struct DummySurfaceProvider {
	surfaces: Mutex<FxHashMap<NativeWindowId, DummyHandle>>,
}

impl DummySurfaceProvider {
	pub fn register(&self, id: NativeWindowId, surface: DummyHandle) {
		self.surfaces.lock().insert(id, surface);
	}
}

impl SurfaceProvider<DummyPlatform> for DummySurfaceProvider {
	unsafe fn create_surface(&self, _platform: &DummyPlatform, id: NativeWindowId) -> anyhow::Result<DummyHandle> {
		self.surfaces
			.lock()
			.get(&id)
			.copied()
			.ok_or_else(|| anyhow::anyhow!("no surface registered for {}", id))
	}
}
