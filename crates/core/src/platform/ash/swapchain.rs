use crate::platform::ash::{Ash, AshError, AshFramebuffer, AshImageView};
use crate::platform::{AcquireResult, Extent, PresentResult, SurfaceRotation, SurfaceState, SwapchainResources};
use ash::vk::{
	ColorSpaceKHR, CompositeAlphaFlagsKHR, Format, ImageLayout, ImageUsageFlags, PresentInfoKHR, PresentModeKHR,
	SharingMode, SurfaceCapabilitiesKHR, SurfaceKHR, SurfaceTransformFlagsKHR, SwapchainCreateInfoKHR, SwapchainKHR,
};
use smallvec::SmallVec;
use std::slice;
use std::time::Duration;

#[derive(Debug, Copy, Clone)]
pub struct AshSwapchainParams {
	pub image_count: u32,
	pub format: Format,
	pub colorspace: ColorSpaceKHR,
	pub present_mode: PresentModeKHR,
	pub pre_transform: SurfaceTransformFlagsKHR,
	pub composite_alpha: CompositeAlphaFlagsKHR,
}

#[derive(Debug, Copy, Clone)]
pub enum SwapchainImageFormatPreference {
	UNORM,
	SRGB,
}

impl SwapchainImageFormatPreference {
	pub fn value_format(&self, format: Format) -> i32 {
		match self {
			SwapchainImageFormatPreference::UNORM => match format {
				Format::R8G8B8A8_UNORM => 50,
				Format::B8G8R8A8_UNORM => 40,
				Format::R8G8B8A8_SRGB => 30,
				Format::B8G8R8A8_SRGB => 20,
				_ => 0,
			},
			SwapchainImageFormatPreference::SRGB => match format {
				Format::R8G8B8A8_SRGB => 50,
				Format::B8G8R8A8_SRGB => 40,
				Format::R8G8B8A8_UNORM => 30,
				Format::B8G8R8A8_UNORM => 20,
				_ => 0,
			},
		}
	}
}

impl AshSwapchainParams {
	fn create_info(&self, surface: SurfaceKHR, extent: Extent) -> SwapchainCreateInfoKHR<'_> {
		SwapchainCreateInfoKHR::default()
			.surface(surface)
			.min_image_count(self.image_count)
			.image_format(self.format)
			.image_color_space(self.colorspace)
			.image_extent(extent.into())
			.image_array_layers(1)
			.image_usage(ImageUsageFlags::COLOR_ATTACHMENT)
			.image_sharing_mode(SharingMode::EXCLUSIVE)
			.pre_transform(self.pre_transform)
			.composite_alpha(self.composite_alpha)
			.present_mode(self.present_mode)
			.clipped(true)
	}

	pub unsafe fn automatic_best(
		ash: &Ash,
		surface: SurfaceKHR,
		capabilities: &SurfaceCapabilitiesKHR,
		format_preference: SwapchainImageFormatPreference,
	) -> Result<Self, AshError> {
		unsafe {
			let surface_ext = ash.extensions.surface()?;
			let phy = ash.physical_device;

			let (format, colorspace) = surface_ext
				.get_physical_device_surface_formats(phy, surface)?
				.into_iter()
				.map(|e| (e.format, e.color_space))
				.filter(|(_, c)| *c == ColorSpaceKHR::SRGB_NONLINEAR)
				.max_by_key(|(format, _)| format_preference.value_format(*format))
				.ok_or(AshError::Vk(ash::vk::Result::ERROR_FORMAT_NOT_SUPPORTED))?;

			let present_mode = surface_ext
				.get_physical_device_surface_present_modes(phy, surface)?
				.into_iter()
				.max_by_key(|p| match *p {
					PresentModeKHR::MAILBOX => 100,
					_ => 0,
				})
				// FIFO is always available
				.unwrap_or(PresentModeKHR::FIFO);

			let image_count = {
				let mut best_count = if present_mode == PresentModeKHR::MAILBOX {
					// try to request a 3 image swapchain if we use MailBox
					3
				} else {
					// Fifo wants 2 images
					2
				};
				if capabilities.max_image_count != 0 {
					best_count = best_count.min(capabilities.max_image_count);
				}
				best_count.max(capabilities.min_image_count)
			};

			let composite_alpha = if capabilities
				.supported_composite_alpha
				.contains(CompositeAlphaFlagsKHR::OPAQUE)
			{
				CompositeAlphaFlagsKHR::OPAQUE
			} else {
				CompositeAlphaFlagsKHR::INHERIT
			};

			Ok(Self {
				image_count,
				format,
				colorspace,
				present_mode,
				// rendering is rotated manually, so the compositor doesn't have to
				pre_transform: capabilities.current_transform,
				composite_alpha,
			})
		}
	}
}

impl Ash {
	unsafe fn surface_capabilities(&self, surface: SurfaceKHR) -> Result<SurfaceCapabilitiesKHR, AshError> {
		unsafe {
			Ok(self
				.extensions
				.surface()?
				.get_physical_device_surface_capabilities(self.physical_device, surface)?)
		}
	}

	fn state_from_capabilities(&self, surface: SurfaceKHR, capabilities: &SurfaceCapabilitiesKHR) -> SurfaceState {
		let current = capabilities.current_extent;
		let extent = if current.width == u32::MAX && current.height == u32::MAX {
			// the swapchain determines the surface extent, eg. on wayland
			let requested = self
				.surface_extents
				.lock()
				.get(&surface)
				.map(|extent| extent())
				.unwrap_or_default();
			if requested.is_empty() {
				Extent::default()
			} else {
				let min = capabilities.min_image_extent;
				let max = capabilities.max_image_extent;
				Extent::new(
					u32::clamp(requested.width, min.width, max.width.max(min.width)),
					u32::clamp(requested.height, min.height, max.height.max(min.height)),
				)
			}
		} else {
			Extent::from(current)
		};
		SurfaceState {
			extent,
			rotation: SurfaceRotation::from_ash_transform(capabilities.current_transform),
		}
	}

	pub(super) unsafe fn query_surface_state(&self, surface: SurfaceKHR) -> Result<SurfaceState, AshError> {
		unsafe {
			let capabilities = self.surface_capabilities(surface)?;
			Ok(self.state_from_capabilities(surface, &capabilities))
		}
	}

	pub(super) unsafe fn create_ash_swapchain(
		&self,
		surface: SurfaceKHR,
		old_swapchain: Option<SwapchainKHR>,
		name: &str,
	) -> Result<SwapchainResources<Ash>, AshError> {
		profiling::function_scope!();
		unsafe {
			let swapchain_ext = self.extensions.swapchain()?;
			let capabilities = self.surface_capabilities(surface)?;
			let state = self.state_from_capabilities(surface, &capabilities);
			let params =
				AshSwapchainParams::automatic_best(self, surface, &capabilities, SwapchainImageFormatPreference::SRGB)?;

			let swapchain = swapchain_ext.create_swapchain(
				&params
					.create_info(surface, state.extent)
					.old_swapchain(old_swapchain.unwrap_or(SwapchainKHR::null())),
				None,
			)?;

			let mut image_views = SmallVec::<[AshImageView; 4]>::new();
			let mut framebuffers = SmallVec::<[AshFramebuffer; 4]>::new();
			let result = (|| -> Result<(), AshError> {
				self.set_debug_object_name(swapchain, name)?;
				for (id, image) in swapchain_ext.get_swapchain_images(swapchain)?.into_iter().enumerate() {
					let debug_name = format!("{} Image {}", name, id);
					self.set_debug_object_name(image, &debug_name)?;
					let image_view =
						self.create_ash_image_view(image, params.format, ImageLayout::PRESENT_SRC_KHR, &debug_name)?;
					image_views.push(image_view);
					framebuffers.push(self.create_ash_framebuffer(image_view, state.extent, &debug_name)?);
				}
				Ok(())
			})();

			if let Err(e) = result {
				for framebuffer in framebuffers {
					self.device.destroy_framebuffer(framebuffer.framebuffer, None);
				}
				for image_view in image_views {
					self.device.destroy_image_view(image_view.image_view, None);
				}
				swapchain_ext.destroy_swapchain(swapchain, None);
				return Err(e);
			}

			log::debug!(
				"Created swapchain {} with {} images of {:?} in {:?}",
				name,
				image_views.len(),
				params.format,
				params.present_mode
			);
			Ok(SwapchainResources {
				swapchain,
				extent: state.extent,
				rotation: state.rotation,
				image_views,
				framebuffers,
			})
		}
	}

	pub(super) unsafe fn acquire_ash_image(
		&self,
		swapchain: SwapchainKHR,
		signal: ash::vk::Semaphore,
		timeout: Duration,
	) -> Result<AcquireResult, AshError> {
		profiling::function_scope!();
		unsafe {
			let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
			match self.extensions.swapchain()?.acquire_next_image(
				swapchain,
				nanos,
				signal,
				ash::vk::Fence::null(),
			) {
				Ok((image_index, suboptimal)) => Ok(AcquireResult::Acquired {
					image_index,
					suboptimal,
				}),
				Err(ash::vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
				Err(ash::vk::Result::TIMEOUT | ash::vk::Result::NOT_READY) => Ok(AcquireResult::Timeout),
				Err(e) => Err(e.into()),
			}
		}
	}

	pub(super) unsafe fn present_ash_image(
		&self,
		swapchain: SwapchainKHR,
		image_index: u32,
		wait: ash::vk::Semaphore,
	) -> Result<PresentResult, AshError> {
		profiling::function_scope!();
		unsafe {
			let swapchain_ext = self.extensions.swapchain()?;
			let queue = self.queue.lock();
			match swapchain_ext.queue_present(
				*queue,
				&PresentInfoKHR::default()
					.wait_semaphores(slice::from_ref(&wait))
					.swapchains(slice::from_ref(&swapchain))
					.image_indices(slice::from_ref(&image_index)),
			) {
				Ok(false) => Ok(PresentResult::Presented),
				Ok(true) => Ok(PresentResult::Suboptimal),
				Err(ash::vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
				Err(e) => Err(e.into()),
			}
		}
	}
}
