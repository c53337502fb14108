//! Frame-pipelined GPU resource lifecycle management. Decides when GPU resources written or released by one draw call
//! may be touched again, given that up to `frames_in_flight` draw calls execute on the GPU concurrently.

pub mod deletion;
pub mod error;
pub mod executor;
pub mod frame_in_flight;
pub mod manager;
pub mod orchestrator;
pub mod params;
pub mod platform;
pub mod renderer;
pub mod staging;

pub mod __private {
	#[cfg(feature = "ash")]
	pub use ash::vk::make_api_version;
	pub use konst;
}
