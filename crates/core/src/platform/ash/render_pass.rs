use ash::prelude::VkResult;
use ash::vk::{
	AccessFlags, AttachmentDescription, AttachmentLoadOp, AttachmentReference, AttachmentStoreOp, Format, ImageLayout,
	PipelineBindPoint, PipelineStageFlags, RenderPass, RenderPassCreateInfo, SUBPASS_EXTERNAL, SampleCountFlags,
	SubpassDependency, SubpassDescription,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::slice;

/// Single subpass render passes with one cleared color attachment, created on first use per format and final layout.
/// Render passes only differing in their final layout are compatible, so pipelines may be created against any of them.
#[derive(Default)]
pub struct RenderPassCache {
	passes: Mutex<FxHashMap<(Format, ImageLayout), RenderPass>>,
}

impl RenderPassCache {
	pub unsafe fn get(&self, device: &ash::Device, format: Format, final_layout: ImageLayout) -> VkResult<RenderPass> {
		unsafe {
			let mut passes = self.passes.lock();
			if let Some(pass) = passes.get(&(format, final_layout)) {
				return Ok(*pass);
			}

			let attachment = AttachmentDescription::default()
				.format(format)
				.samples(SampleCountFlags::TYPE_1)
				.load_op(AttachmentLoadOp::CLEAR)
				.store_op(AttachmentStoreOp::STORE)
				.stencil_load_op(AttachmentLoadOp::DONT_CARE)
				.stencil_store_op(AttachmentStoreOp::DONT_CARE)
				.initial_layout(ImageLayout::UNDEFINED)
				.final_layout(final_layout);
			let color = AttachmentReference {
				attachment: 0,
				layout: ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
			};
			let subpass = SubpassDescription::default()
				.pipeline_bind_point(PipelineBindPoint::GRAPHICS)
				.color_attachments(slice::from_ref(&color));
			let consumers = PipelineStageFlags::FRAGMENT_SHADER | PipelineStageFlags::TRANSFER;
			let dependencies = [
				// previous readers of the attachment, and the image acquire of swapchain images
				SubpassDependency::default()
					.src_subpass(SUBPASS_EXTERNAL)
					.dst_subpass(0)
					.src_stage_mask(PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | consumers)
					.dst_stage_mask(PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
					.src_access_mask(AccessFlags::empty())
					.dst_access_mask(AccessFlags::COLOR_ATTACHMENT_WRITE),
				SubpassDependency::default()
					.src_subpass(0)
					.dst_subpass(SUBPASS_EXTERNAL)
					.src_stage_mask(PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
					.dst_stage_mask(consumers)
					.src_access_mask(AccessFlags::COLOR_ATTACHMENT_WRITE)
					.dst_access_mask(AccessFlags::SHADER_READ | AccessFlags::TRANSFER_READ),
			];
			let pass = device.create_render_pass(
				&RenderPassCreateInfo::default()
					.attachments(slice::from_ref(&attachment))
					.subpasses(slice::from_ref(&subpass))
					.dependencies(&dependencies),
				None,
			)?;
			log::debug!("Created render pass for {:?} ending in {:?}", format, final_layout);
			passes.insert((format, final_layout), pass);
			Ok(pass)
		}
	}

	pub unsafe fn destroy(&self, device: &ash::Device) {
		unsafe {
			for (_, pass) in self.passes.lock().drain() {
				device.destroy_render_pass(pass, None);
			}
		}
	}
}
