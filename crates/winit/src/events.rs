use crate::native_window_id;
use framekeeper_core::params::{NativeWindowEvent, NativeWindowId, NativeWindowUpdate};
use winit::event::WindowEvent;
use winit::window::WindowId;

/// The renderer side event of a winit window event, if the renderer has to react to it.
pub fn native_window_event(event: &WindowEvent) -> Option<NativeWindowEvent> {
	match event {
		WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => Some(NativeWindowEvent::Resize),
		WindowEvent::Occluded(false) => Some(NativeWindowEvent::Restore),
		_ => None,
	}
}

/// Collects the window events of a frame into the [`NativeWindowEvent`] of each window's next
/// [`NativeWindowUpdate`]. A resize supersedes a restore.
#[derive(Debug, Default)]
pub struct NativeWindowEvents {
	pending: Vec<(NativeWindowId, NativeWindowEvent)>,
}

impl NativeWindowEvents {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn handle(&mut self, window_id: WindowId, event: &WindowEvent) {
		if let Some(event) = native_window_event(event) {
			self.push(native_window_id(window_id), event);
		}
	}

	fn push(&mut self, id: NativeWindowId, event: NativeWindowEvent) {
		match self.pending.iter_mut().find(|(pending_id, _)| *pending_id == id) {
			Some((_, pending)) => {
				if *pending != NativeWindowEvent::Resize {
					*pending = event;
				}
			}
			None => self.pending.push((id, event)),
		}
	}

	/// Write the collected event of the window into `update` and forget it.
	pub fn apply(&mut self, update: &mut NativeWindowUpdate) {
		if let Some(index) = self.pending.iter().position(|(id, _)| *id == update.id) {
			update.event = self.pending.swap_remove(index).1;
		}
	}
}
