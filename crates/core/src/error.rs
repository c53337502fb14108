use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Fatal failures of a draw call. Any of these invalidates the renderer, see [`RenderError::Poisoned`].
///
/// Out of date presentation surfaces never surface as an error, they are absorbed by the affected window.
#[derive(Error)]
pub enum RenderError {
	#[error("Failed to allocate {size} bytes for {name}: {source}")]
	AllocationFailure {
		name: String,
		size: u64,
		#[source]
		source: BoxError,
	},
	#[error("Timed out after {timeout:?} waiting for {what}")]
	DeviceTimeout { what: &'static str, timeout: Duration },
	#[error("Device lost: {0}")]
	DeviceLost(#[source] BoxError),
	#[error("Platform error: {0}")]
	Platform(#[source] BoxError),
	#[error("Failed to create surface for native window {id}: {source}")]
	Surface {
		id: u64,
		#[source]
		source: anyhow::Error,
	},
	#[error("Renderer is unusable after a previous fatal error")]
	Poisoned,
	#[error("Rendering thread failed: {0}")]
	RenderThread(String),
}

impl RenderError {
	pub fn platform(err: impl Error + Send + Sync + 'static) -> Self {
		Self::Platform(Box::new(err))
	}

	pub fn device_lost(err: impl Error + Send + Sync + 'static) -> Self {
		Self::DeviceLost(Box::new(err))
	}

	pub fn allocation(name: impl Into<String>, size: u64, err: impl Error + Send + Sync + 'static) -> Self {
		Self::AllocationFailure {
			name: name.into(),
			size,
			source: Box::new(err),
		}
	}
}

impl Debug for RenderError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(self, f)
	}
}
