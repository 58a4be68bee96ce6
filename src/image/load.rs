//! Image decoding and pre-processing.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array3;

use crate::error::{Error, Result};

use super::{ImageTensor, Normalization, RGB_CHANNELS};

/// Decode an in-memory image in any format the `image` crate understands.
///
/// # Errors
///
/// Returns [`Error::EmptyInput`] for an empty buffer, [`Error::Decode`]
/// if the bytes are not a valid image and [`Error::ZeroSized`] if the
/// image has no pixels.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::EmptyInput);
    }

    let img = image::load_from_memory(bytes).map_err(|source| Error::Decode { source })?;

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::ZeroSized { width, height });
    }

    Ok(img)
}

/// Read and decode an image file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();

    let bytes = std::fs::read(path).map_err(|source| Error::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;

    decode_image(&bytes)
}

/// Discard color: compute luminance and replicate it into all three channels.
///
/// Uses the ITU-R 601-2 luma transform, `L = 0.299 R + 0.587 G + 0.114 B`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_luminance_rgb(img: &DynamicImage) -> RgbImage {
    let rgb = img.to_rgb8();
    let mut gray = RgbImage::new(rgb.width(), rgb.height());

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0.map(f32::from);
        // Safe: clamped to [0, 255] before casting
        let luma = 0.299_f32
            .mul_add(r, 0.587_f32.mul_add(g, 0.114 * b))
            .round()
            .clamp(0.0, 255.0) as u8;
        gray.put_pixel(x, y, Rgb([luma; RGB_CHANNELS]));
    }

    gray
}

/// Resize an RGB image to `size`x`size` and convert it to a normalized CHW tensor.
#[must_use]
pub fn image_to_tensor(img: &RgbImage, size: u32, norm: &Normalization) -> ImageTensor {
    let resized = image::imageops::resize(img, size, size, FilterType::Triangle);

    let side = size as usize;
    let mut tensor = Array3::<f32>::zeros((RGB_CHANNELS, side, side));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..RGB_CHANNELS {
            tensor[[c, y as usize, x as usize]] = norm.normalize(c, pixel[c]);
        }
    }

    tensor
}

/// Prepare an image for the colorization model.
///
/// The image is:
/// 1. Desaturated to luminance, replicated into 3 channels
/// 2. Resized to `size`x`size`
/// 3. Normalized with `norm`
///
/// Returns the tensor together with the original `(width, height)`.
#[must_use]
pub fn preprocess(
    img: &DynamicImage,
    size: u32,
    norm: &Normalization,
) -> (ImageTensor, (u32, u32)) {
    let original_dims = img.dimensions();
    tracing::info!(
        "Original image dimensions: {}x{}",
        original_dims.0,
        original_dims.1
    );

    let gray = to_luminance_rgb(img);
    let tensor = image_to_tensor(&gray, size, norm);

    (tensor, original_dims)
}
