//! The per draw call snapshot handed to [`Renderer::draw`] and the ids referenced from it.
//!
//! [`Renderer::draw`]: crate::renderer::Renderer::draw

use bytemuck_derive::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use std::fmt::{Display, Formatter};

macro_rules! id_type {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
		pub struct $name(pub u64);

		impl $name {
			pub const INVALID: Self = Self(u64::MAX);

			pub fn is_valid(&self) -> bool {
				*self != Self::INVALID
			}
		}

		impl Display for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
				write!(f, "{}#{}", stringify!($name), self.0)
			}
		}
	};
}

id_type!(
	/// A texture or font glyph atlas uploaded with [`Renderer::new_texture`] or [`Renderer::new_font_texture`].
	///
	/// [`Renderer::new_texture`]: crate::renderer::Renderer::new_texture
	/// [`Renderer::new_font_texture`]: crate::renderer::Renderer::new_font_texture
	TextureId
);
id_type!(
	/// Handed out by [`Renderer::new_viewport`].
	///
	/// [`Renderer::new_viewport`]: crate::renderer::Renderer::new_viewport
	ViewportId
);
id_type!(
	/// Chosen by the caller when registering a window with [`Renderer::new_native_window`].
	///
	/// [`Renderer::new_native_window`]: crate::renderer::Renderer::new_native_window
	NativeWindowId
);

#[derive(Clone, Debug, Default)]
pub struct DrawParams {
	pub texture_ids: Vec<TextureId>,
	pub transforms: Vec<Mat4>,
	pub line_draw_cmds: Vec<LineDrawCmd>,
	pub line_vertices: Vec<Vec3>,
	pub gui_vertices: Vec<GuiVertex>,
	pub gui_indices: Vec<u32>,
	pub gui_draw_cmds: Vec<GuiDrawCmd>,
	pub viewport_updates: Vec<ViewportUpdate>,
	pub native_window_updates: Vec<NativeWindowUpdate>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewportUpdate {
	pub id: ViewportId,
	pub width: u32,
	pub height: u32,
	pub transform: Mat4,
	pub clear_color: Vec4,
	pub gizmo: Option<Gizmo>,
}

impl ViewportUpdate {
	pub fn new(id: ViewportId, width: u32, height: u32) -> Self {
		Self {
			id,
			width,
			height,
			transform: Mat4::IDENTITY,
			clear_color: Vec4::new(0., 0., 0., 1.),
			gizmo: None,
		}
	}
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GizmoKind {
	#[default]
	Translate,
	Rotate,
	Scale,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Gizmo {
	pub position: Vec3,
	pub rotation: Quat,
	pub scale: f32,
	pub kind: GizmoKind,
	pub quad_offset: f32,
	pub quad_scale: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GuiVertex {
	pub position: Vec2,
	pub uv: Vec2,
}

/// A range into [`DrawParams::gui_vertices`] and [`DrawParams::gui_indices`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MeshSpan {
	pub index_count: u32,
	pub vertex_offset: u32,
	pub index_offset: u32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GuiDrawCmdKind {
	/// Restricts all following commands to the rect
	Scissor,
	FilledMesh { mesh: MeshSpan, color: Vec4 },
	TextGlyph { utf_value: u32, color: Vec4 },
	Viewport { id: ViewportId },
}

/// A GUI draw command, the rect is in normalized window coordinates with the origin at the top left.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GuiDrawCmd {
	pub kind: GuiDrawCmdKind,
	pub rect_position: Vec2,
	pub rect_extent: Vec2,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum NativeWindowEvent {
	#[default]
	None,
	Resize,
	Restore,
}

/// Insets of the window area obstructed by system UI, in pixels.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SafeArea {
	pub left: u32,
	pub top: u32,
	pub right: u32,
	pub bottom: u32,
}

/// Per draw call state of a native window.
///
/// There is no requested extent: the swapchain always takes the extent and rotation the surface currently reports.
/// `event` only decides whether the surface is queried again, the swapchain is rebuilt only if those changed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NativeWindowUpdate {
	pub id: NativeWindowId,
	pub event: NativeWindowEvent,
	pub clear_color: Vec4,
	pub safe_area: SafeArea,
	/// Range of [`DrawParams::gui_draw_cmds`] drawn into this window
	pub draw_cmd_offset: u32,
	pub draw_cmd_count: u32,
}

impl NativeWindowUpdate {
	pub fn new(id: NativeWindowId) -> Self {
		Self {
			id,
			event: NativeWindowEvent::None,
			clear_color: Vec4::new(0., 0., 0., 1.),
			safe_area: SafeArea::default(),
			draw_cmd_offset: 0,
			draw_cmd_count: 0,
		}
	}
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LineDrawCmd {
	pub color: Vec4,
	/// Consecutive vertices of [`DrawParams::line_vertices`] used by this command
	pub vertex_count: u32,
}
