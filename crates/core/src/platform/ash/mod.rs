mod convert;
pub mod init;
mod platform;
mod render_pass;
mod swapchain;

pub use platform::*;
pub use swapchain::{AshSwapchainParams, SwapchainImageFormatPreference};
