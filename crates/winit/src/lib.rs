//! Connects winit windows to the renderer: creates their presentation surfaces and translates window events.

#[cfg(feature = "ash")]
pub mod ash;
pub mod events;
mod windows;

pub use windows::*;
