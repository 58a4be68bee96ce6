//! Sharpness enhancement post-filter.

use image::{imageops, RgbImage};

/// 3x3 smoothing kernel used to build the degenerate (blurred) image.
/// `filter3x3` divides by the kernel sum, 13.
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];

/// Enhance sharpness by extrapolating away from a smoothed copy.
///
/// Computes `smooth + factor * (image - smooth)` per channel. A factor of
/// `1.0` returns the image unchanged, `0.0` returns the smoothed image and
/// values above `1.0` sharpen. Border pixels are never smoothed, so they
/// come through unchanged for every factor.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sharpen(img: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    if width < 3 || height < 3 {
        return img.clone();
    }

    let smooth = imageops::filter3x3(img, &SMOOTH_KERNEL);

    RgbImage::from_fn(width, height, |x, y| {
        let original = *img.get_pixel(x, y);
        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
            return original;
        }

        let degenerate = smooth.get_pixel(x, y);
        let mut out = original;
        for (o, (&d, &s)) in out
            .0
            .iter_mut()
            .zip(degenerate.0.iter().zip(original.0.iter()))
        {
            let (d, s) = (f32::from(d), f32::from(s));
            // Safe: clamped to [0, 255] before casting
            *o = factor.mul_add(s - d, d).clamp(0.0, 255.0) as u8;
        }
        out
    })
}
