use crate::deletion::{DeletionJob, DeletionQueue};
use crate::error::RenderError;
use crate::manager::{Job, JobQueue, UpdateContext};
use crate::params::TextureId;
use crate::platform::{Extent, FramePlatform, ImageCreateInfo, ImageFormat, ImageUsage};
use rustc_hash::FxHashMap;

/// Required alignment of buffer offsets of buffer to image copies.
const UPLOAD_ALIGNMENT: u64 = 16;

pub struct TextureUpload {
	pub id: TextureId,
	pub extent: Extent,
	pub format: ImageFormat,
	/// Tightly packed texels
	pub data: Vec<u8>,
}

/// Texture uploads and deletions queued from any thread, applied during the next draw call.
#[derive(Default)]
pub struct TextureJobs {
	jobs: JobQueue<TextureUpload, TextureId>,
}

impl TextureJobs {
	/// Upload tightly packed RGBA8 texels. Uploading an existing id replaces the texture.
	pub fn new_texture(&self, id: TextureId, width: u32, height: u32, rgba8: &[u8]) {
		let size = width as usize * height as usize * 4;
		assert_eq!(rgba8.len(), size, "{} has {} bytes of texels, expected {}", id, rgba8.len(), size);
		self.jobs.create(TextureUpload {
			id,
			extent: Extent::new(width, height),
			format: ImageFormat::Rgba8Srgb,
			data: rgba8.to_vec(),
		});
	}

	/// Upload a font glyph atlas of single byte coverage values. Rows are `pitch` bytes apart in `data`.
	pub fn new_font_texture(&self, id: TextureId, width: u32, height: u32, pitch: u32, data: &[u8]) {
		let (width, height, pitch) = (width as usize, height as usize, pitch as usize);
		assert!(pitch >= width, "{} has a pitch of {} smaller than its width {}", id, pitch, width);
		assert!(
			height == 0 || data.len() >= (height - 1) * pitch + width,
			"{} has only {} bytes of glyph data",
			id,
			data.len()
		);
		let mut packed = Vec::with_capacity(width * height);
		for row in 0..height {
			packed.extend_from_slice(&data[row * pitch..row * pitch + width]);
		}
		self.jobs.create(TextureUpload {
			id,
			extent: Extent::new(width as u32, height as u32),
			format: ImageFormat::R8Unorm,
			data: packed,
		});
	}

	pub fn delete_texture(&self, id: TextureId) {
		self.jobs.delete(id);
	}
}

pub struct Texture<P: FramePlatform> {
	pub image: P::Image,
	pub view: P::ImageView,
	pub extent: Extent,
	pub format: ImageFormat,
}

impl<P: FramePlatform> Texture<P> {
	fn destroy(self, deletion: &DeletionQueue<P>) {
		deletion.destroy_all([DeletionJob::ImageView(self.view), DeletionJob::Image(self.image)]);
	}
}

pub struct TextureManager<P: FramePlatform> {
	textures: FxHashMap<TextureId, Texture<P>>,
}

impl<P: FramePlatform> Default for TextureManager<P> {
	fn default() -> Self {
		Self {
			textures: FxHashMap::default(),
		}
	}
}

impl<P: FramePlatform> TextureManager<P> {
	/// Apply all queued uploads and deletions in the order they were queued. Uploads are copied through the staging
	/// buffer of this frame and recorded into the main command buffer.
	pub fn process_jobs(&mut self, ctx: &mut UpdateContext<P>, jobs: &TextureJobs) -> Result<(), RenderError> {
		profiling::function_scope!();
		for job in jobs.jobs.take() {
			match job {
				Job::Create(upload) => self.upload(ctx, upload)?,
				Job::Delete(id) => {
					let texture = self
						.textures
						.remove(&id)
						.unwrap_or_else(|| panic!("deleted unknown texture {}", id));
					texture.destroy(ctx.deletion);
				}
			}
		}
		Ok(())
	}

	fn upload(&mut self, ctx: &mut UpdateContext<P>, upload: TextureUpload) -> Result<(), RenderError> {
		profiling::scope!("upload texture", &format!("{}", upload.id));
		assert!(!upload.extent.is_empty(), "{} has an empty extent", upload.id);
		let name = format!("{}", upload.id);
		unsafe {
			let image = ctx
				.platform
				.create_image(&ImageCreateInfo {
					name: &name,
					extent: upload.extent,
					format: upload.format,
					usage: ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
				})
				.map_err(|e| RenderError::allocation(&name, upload.data.len() as u64, e))?;
			let view = match ctx.platform.create_image_view(&image, &name) {
				Ok(view) => view,
				Err(e) => {
					ctx.deletion.destroy(DeletionJob::Image(image));
					return Err(RenderError::platform(e));
				}
			};

			let region = ctx.staging.alloc(upload.data.len() as u64, UPLOAD_ALIGNMENT);
			ctx.staging.write(ctx.platform, region, &upload.data);
			ctx.platform
				.cmd_upload_image(ctx.cmd, ctx.staging.buffer(), region.offset, &image);

			let texture = Texture {
				image,
				view,
				extent: upload.extent,
				format: upload.format,
			};
			if let Some(old) = self.textures.insert(upload.id, texture) {
				log::debug!("Replacing {}", upload.id);
				old.destroy(ctx.deletion);
			}
		}
		Ok(())
	}

	/// # Panics
	/// If any id was never uploaded or already deleted.
	pub fn validate(&self, ids: &[TextureId]) {
		for id in ids {
			assert!(self.textures.contains_key(id), "{} is not a texture", id);
		}
	}

	pub fn get(&self, id: TextureId) -> Option<&Texture<P>> {
		self.textures.get(&id)
	}

	pub fn len(&self) -> usize {
		self.textures.len()
	}

	pub fn is_empty(&self) -> bool {
		self.textures.is_empty()
	}

	pub fn destroy(self, deletion: &DeletionQueue<P>) {
		for (_, texture) in self.textures {
			texture.destroy(deletion);
		}
	}
}
