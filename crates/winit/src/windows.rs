use framekeeper_core::params::NativeWindowId;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use static_assertions::assert_impl_all;
use std::sync::Arc;
use winit::window::{Window, WindowId};

/// The [`NativeWindowId`] a winit window is registered as.
pub fn native_window_id(window_id: WindowId) -> NativeWindowId {
	NativeWindowId(u64::from(window_id))
}

/// Registry of the winit windows the renderer may create surfaces for, shared with the renderer as its
/// `SurfaceProvider`.
///
/// A window must stay registered until the renderer processed its `delete_native_window`, as the surface must not
/// outlive the window.
#[derive(Default)]
pub struct WinitWindows {
	windows: Mutex<FxHashMap<NativeWindowId, Arc<Window>>>,
}
assert_impl_all!(WinitWindows: Send, Sync);

impl WinitWindows {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a window, returning the id to pass to `Renderer::new_native_window`.
	pub fn register(&self, window: Arc<Window>) -> NativeWindowId {
		let id = native_window_id(window.id());
		let prev = self.windows.lock().insert(id, window);
		assert!(prev.is_none(), "{} registered twice", id);
		id
	}

	pub fn unregister(&self, id: NativeWindowId) -> Option<Arc<Window>> {
		self.windows.lock().remove(&id)
	}

	pub fn get(&self, id: NativeWindowId) -> Option<Arc<Window>> {
		self.windows.lock().get(&id).cloned()
	}

	pub fn len(&self) -> usize {
		self.windows.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
