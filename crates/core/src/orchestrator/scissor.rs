use crate::platform::{Extent, ScissorRect, SurfaceRotation};
use glam::Vec2;

/// Rotate a rect in normalized window coordinates by the surface pre-transform, returning the normalized rect within
/// the swapchain image as `(min, max)`.
pub fn rotate_rect(rotation: SurfaceRotation, position: Vec2, extent: Vec2) -> (Vec2, Vec2) {
	let matrix = rotation.matrix();
	let transform = |p: Vec2| (matrix * (p * 2. - Vec2::ONE) + Vec2::ONE) / 2.;
	let a = transform(position);
	let b = transform(position + extent);
	(a.min(b), a.max(b))
}

/// The scissor of a GUI rect within a swapchain image of `image_extent`, clamped to the image.
pub fn rotated_scissor(rotation: SurfaceRotation, image_extent: Extent, position: Vec2, extent: Vec2) -> ScissorRect {
	let (min, max) = rotate_rect(rotation, position, extent);
	let size = Vec2::new(image_extent.width as f32, image_extent.height as f32);
	let min = (min.clamp(Vec2::ZERO, Vec2::ONE) * size).round();
	let max = (max.clamp(Vec2::ZERO, Vec2::ONE) * size).round();
	ScissorRect {
		x: min.x as i32,
		y: min.y as i32,
		width: (max.x - min.x) as u32,
		height: (max.y - min.y) as u32,
	}
}

pub fn full_scissor(image_extent: Extent) -> ScissorRect {
	ScissorRect {
		x: 0,
		y: 0,
		width: image_extent.width,
		height: image_extent.height,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn identity() {
		let scissor = rotated_scissor(
			SurfaceRotation::Identity,
			Extent::new(100, 200),
			Vec2::new(0.25, 0.5),
			Vec2::new(0.5, 0.25),
		);
		assert_eq!(
			scissor,
			ScissorRect {
				x: 25,
				y: 100,
				width: 50,
				height: 50
			}
		);
	}

	#[test]
	fn rotate_180() {
		let (min, max) = rotate_rect(SurfaceRotation::Rotate180, Vec2::new(0.25, 0.5), Vec2::new(0.5, 0.25));
		assert_relative_eq!(min.x, 0.25);
		assert_relative_eq!(min.y, 0.25);
		assert_relative_eq!(max.x, 0.75);
		assert_relative_eq!(max.y, 0.5);
	}

	#[test]
	fn rotate_90_keeps_pixel_size() {
		let (min, max) = rotate_rect(SurfaceRotation::Rotate90, Vec2::ZERO, Vec2::new(0.5, 0.25));
		assert_relative_eq!(min.x, 0.75);
		assert_relative_eq!(min.y, 0.);
		assert_relative_eq!(max.x, 1.);
		assert_relative_eq!(max.y, 0.5);

		// a 100x200 window on a 200x100 surface rotated by 90 degrees
		let scissor = rotated_scissor(
			SurfaceRotation::Rotate90,
			Extent::new(200, 100),
			Vec2::ZERO,
			Vec2::new(0.5, 0.25),
		);
		assert_eq!(
			scissor,
			ScissorRect {
				x: 150,
				y: 0,
				width: 50,
				height: 50
			}
		);
	}

	#[test]
	fn clamped_to_image() {
		let scissor = rotated_scissor(
			SurfaceRotation::Identity,
			Extent::new(10, 10),
			Vec2::new(-0.5, 0.5),
			Vec2::new(1., 1.),
		);
		assert_eq!(
			scissor,
			ScissorRect {
				x: 0,
				y: 5,
				width: 5,
				height: 5
			}
		);
	}
}
