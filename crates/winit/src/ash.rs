use crate::WinitWindows;
use anyhow::Context;
use ash::ext::metal_surface;
use ash::khr::{android_surface, surface, wayland_surface, win32_surface, xcb_surface, xlib_surface};
use ash::prelude::VkResult;
use framekeeper_core::params::NativeWindowId;
use framekeeper_core::platform::ash::Ash;
use framekeeper_core::platform::{Extent, SurfaceProvider};
use std::ffi::CStr;
use std::sync::Arc;
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};

/// The instance extensions required to create surfaces on `display_handle`, pass them to
/// `AshSingleGraphicsQueueCreateInfo::instance_extensions`.
pub fn ash_enumerate_required_extensions(display_handle: RawDisplayHandle) -> VkResult<&'static [&'static CStr]> {
	Ok(match display_handle {
		RawDisplayHandle::Windows(_) => &[surface::NAME, win32_surface::NAME],
		RawDisplayHandle::Wayland(_) => &[surface::NAME, wayland_surface::NAME],
		RawDisplayHandle::Xlib(_) => &[surface::NAME, xlib_surface::NAME],
		RawDisplayHandle::Xcb(_) => &[surface::NAME, xcb_surface::NAME],
		RawDisplayHandle::Android(_) => &[surface::NAME, android_surface::NAME],
		RawDisplayHandle::AppKit(_) | RawDisplayHandle::UiKit(_) => &[surface::NAME, metal_surface::NAME],
		_ => return Err(ash::vk::Result::ERROR_EXTENSION_NOT_PRESENT),
	})
}

impl SurfaceProvider<Ash> for WinitWindows {
	unsafe fn create_surface(&self, ash: &Ash, id: NativeWindowId) -> anyhow::Result<ash::vk::SurfaceKHR> {
		profiling::function_scope!();
		unsafe {
			let window = self
				.get(id)
				.with_context(|| format!("{} is not a registered winit window", id))?;
			let surface = ash_window::create_surface(
				&ash.entry,
				&ash.instance,
				window.display_handle()?.as_raw(),
				window.window_handle()?.as_raw(),
				None,
			)?;

			// some platforms let the swapchain decide the surface extent, use the window's size then
			let weak = Arc::downgrade(&window);
			ash.set_surface_extent_fn(
				surface,
				Box::new(move || {
					weak.upgrade()
						.map(|window| {
							let size = window.inner_size();
							Extent::new(size.width, size.height)
						})
						.unwrap_or_default()
				}),
			);
			log::info!("Created surface for {}", id);
			Ok(surface)
		}
	}
}
