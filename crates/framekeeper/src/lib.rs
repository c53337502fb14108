/// The primary platform is Ash
#[cfg(feature = "ash")]
pub type P = framekeeper_core::platform::ash::Ash;
#[cfg(not(any(feature = "ash")))]
compile_error!("Must select a primary platform by enabling a feature like \"ash\"");

pub mod deletion {
	pub type DeletionJob = framekeeper_core::deletion::DeletionJob<crate::P>;
	pub type DeletionQueue = framekeeper_core::deletion::DeletionQueue<crate::P>;
	pub type FencedJob = framekeeper_core::deletion::FencedJob<crate::P>;
}

pub mod error {
	pub use framekeeper_core::error::*;
}

pub mod executor {
	pub type SynchronousExecutor = framekeeper_core::executor::SynchronousExecutor<crate::P>;
	pub type ThreadedExecutor = framekeeper_core::executor::ThreadedExecutor<crate::P>;

	pub use framekeeper_core::executor::*;
}

pub mod frame_in_flight {
	pub use framekeeper_core::frame_in_flight::*;
}

pub mod manager {
	pub type UpdateContext<'a> = framekeeper_core::manager::UpdateContext<'a, crate::P>;
	pub type NativeWindow = framekeeper_core::manager::native_window::NativeWindow<crate::P>;
	pub type WindowSwapchain = framekeeper_core::manager::native_window::WindowSwapchain<crate::P>;
	pub type RenderTarget = framekeeper_core::manager::viewport::RenderTarget<crate::P>;
	pub type Texture = framekeeper_core::manager::texture::Texture<crate::P>;
	pub type BufferBinding<'a> = framekeeper_core::manager::per_frame::BufferBinding<'a, crate::P>;

	pub use framekeeper_core::manager::*;
}

pub mod orchestrator {
	pub type FrameOrchestrator = framekeeper_core::orchestrator::FrameOrchestrator<crate::P>;
	pub type FrameResources<'a> = framekeeper_core::orchestrator::FrameResources<'a, crate::P>;

	pub use framekeeper_core::orchestrator::*;
}

pub mod params {
	pub use framekeeper_core::params::*;
}

pub mod platform {
	pub type SwapchainResources = framekeeper_core::platform::SwapchainResources<crate::P>;

	pub use framekeeper_core::platform::*;
}

pub mod renderer {
	pub type Renderer = framekeeper_core::renderer::Renderer<crate::P>;
	pub type RendererShared = framekeeper_core::renderer::RendererShared<crate::P>;

	pub use framekeeper_core::renderer::*;
}

pub mod staging {
	pub type StagingAllocator = framekeeper_core::staging::StagingAllocator<crate::P>;

	pub use framekeeper_core::staging::*;
}

pub mod __private {
	pub use framekeeper_core::__private::*;
}
