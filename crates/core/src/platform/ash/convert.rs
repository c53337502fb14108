use crate::platform::{BufferConsumer, BufferUsage, Extent, ImageFormat, ImageUsage, SurfaceRotation};
use ash::vk::{
	AccessFlags2, BufferUsageFlags, Extent2D, Extent3D, Format, ImageLayout, ImageUsageFlags, PipelineStageFlags2,
	SurfaceTransformFlagsKHR,
};

impl BufferUsage {
	pub fn to_ash_buffer_usage_flags(&self) -> BufferUsageFlags {
		let mut out = BufferUsageFlags::empty();
		if self.contains(BufferUsage::UNIFORM) {
			out |= BufferUsageFlags::UNIFORM_BUFFER;
		}
		if self.contains(BufferUsage::VERTEX) {
			out |= BufferUsageFlags::VERTEX_BUFFER;
		}
		if self.contains(BufferUsage::INDEX) {
			out |= BufferUsageFlags::INDEX_BUFFER;
		}
		if self.contains(BufferUsage::TRANSFER_SRC) {
			out |= BufferUsageFlags::TRANSFER_SRC;
		}
		assert!(!out.is_empty(), "buffers must have some usage");
		out
	}
}

impl ImageUsage {
	pub fn to_ash_image_usage_flags(&self) -> ImageUsageFlags {
		let mut out = ImageUsageFlags::empty();
		if self.contains(ImageUsage::COLOR_ATTACHMENT) {
			out |= ImageUsageFlags::COLOR_ATTACHMENT;
		}
		if self.contains(ImageUsage::SAMPLED) {
			out |= ImageUsageFlags::SAMPLED;
		}
		if self.contains(ImageUsage::TRANSFER_SRC) {
			out |= ImageUsageFlags::TRANSFER_SRC;
		}
		if self.contains(ImageUsage::TRANSFER_DST) {
			out |= ImageUsageFlags::TRANSFER_DST;
		}
		out
	}

	/// The layout an image rests in between passes.
	pub fn to_ash_resting_layout(&self) -> ImageLayout {
		if self.contains(ImageUsage::SAMPLED) {
			ImageLayout::SHADER_READ_ONLY_OPTIMAL
		} else if self.contains(ImageUsage::TRANSFER_SRC) {
			ImageLayout::TRANSFER_SRC_OPTIMAL
		} else {
			ImageLayout::GENERAL
		}
	}
}

impl ImageFormat {
	pub fn to_ash_format(&self) -> Format {
		match self {
			ImageFormat::Rgba8Srgb => Format::R8G8B8A8_SRGB,
			ImageFormat::R8Unorm => Format::R8_UNORM,
		}
	}
}

impl BufferConsumer {
	pub fn to_ash_stage_access(&self) -> (PipelineStageFlags2, AccessFlags2) {
		match self {
			BufferConsumer::Uniform => (
				PipelineStageFlags2::VERTEX_SHADER | PipelineStageFlags2::FRAGMENT_SHADER,
				AccessFlags2::UNIFORM_READ,
			),
			BufferConsumer::Vertex => (
				PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
				AccessFlags2::VERTEX_ATTRIBUTE_READ,
			),
			BufferConsumer::Index => (PipelineStageFlags2::INDEX_INPUT, AccessFlags2::INDEX_READ),
		}
	}
}

impl SurfaceRotation {
	pub fn from_ash_transform(transform: SurfaceTransformFlagsKHR) -> Self {
		if transform.contains(SurfaceTransformFlagsKHR::ROTATE_90) {
			SurfaceRotation::Rotate90
		} else if transform.contains(SurfaceTransformFlagsKHR::ROTATE_180) {
			SurfaceRotation::Rotate180
		} else if transform.contains(SurfaceTransformFlagsKHR::ROTATE_270) {
			SurfaceRotation::Rotate270
		} else {
			SurfaceRotation::Identity
		}
	}

	pub fn to_ash_transform(&self) -> SurfaceTransformFlagsKHR {
		match self {
			SurfaceRotation::Identity => SurfaceTransformFlagsKHR::IDENTITY,
			SurfaceRotation::Rotate90 => SurfaceTransformFlagsKHR::ROTATE_90,
			SurfaceRotation::Rotate180 => SurfaceTransformFlagsKHR::ROTATE_180,
			SurfaceRotation::Rotate270 => SurfaceTransformFlagsKHR::ROTATE_270,
		}
	}
}

impl From<Extent> for Extent2D {
	fn from(value: Extent) -> Self {
		Extent2D {
			width: value.width,
			height: value.height,
		}
	}
}

impl From<Extent> for Extent3D {
	fn from(value: Extent) -> Self {
		Extent3D {
			width: value.width,
			height: value.height,
			depth: 1,
		}
	}
}

impl From<Extent2D> for Extent {
	fn from(value: Extent2D) -> Self {
		Extent::new(value.width, value.height)
	}
}
