//! Post-processing and image encoding.

use std::io::Cursor;

use image::{imageops::FilterType, ImageFormat, Rgb, RgbImage};

use crate::error::{Error, Result};

use super::{sharpen, ImageTensor, Normalization, RGB_CHANNELS};

/// Turn a model output tensor into the final picture.
///
/// The tensor is:
/// 1. Denormalized from model space to [0, 255]
/// 2. Resized to the original dimensions with Lanczos3
/// 3. Sharpened if `sharpness` is set
///
/// # Arguments
///
/// * `tensor` - CHW tensor with values in [-1, 1]
/// * `original_dims` - `(width, height)` of the request image
/// * `norm` - Constants used during pre-processing
/// * `sharpness` - Optional sharpness enhancement factor
///
/// # Errors
///
/// Returns an error if the tensor is not a 3-channel image.
pub fn postprocess(
    tensor: &ImageTensor,
    original_dims: (u32, u32),
    norm: &Normalization,
    sharpness: Option<f32>,
) -> Result<RgbImage> {
    let img = tensor_to_image(tensor, norm)?;

    let (width, height) = original_dims;
    let resized = image::imageops::resize(&img, width, height, FilterType::Lanczos3);
    tracing::info!("Resized output to original dimensions: {width}x{height}");

    Ok(match sharpness {
        Some(factor) => {
            let sharpened = sharpen(&resized, factor);
            tracing::info!("Applied sharpness enhancement with factor: {factor}");
            sharpened
        }
        None => resized,
    })
}

/// Convert a normalized CHW tensor to an RGB image.
///
/// # Errors
///
/// Returns an error if the tensor does not have exactly three channels.
#[allow(clippy::cast_possible_truncation)]
pub fn tensor_to_image(tensor: &ImageTensor, norm: &Normalization) -> Result<RgbImage> {
    let (channels, height, width) = tensor.dim();
    if channels != RGB_CHANNELS {
        return Err(Error::ShapeMismatch {
            expected: format!("{RGB_CHANNELS} channels"),
            actual: format!("{channels} channels"),
        });
    }

    // Safe: tensor spatial dims come from a u32 image size
    let img = RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            norm.denormalize(0, tensor[[0, y, x]]),
            norm.denormalize(1, tensor[[1, y, x]]),
            norm.denormalize(2, tensor[[2, y, x]]),
        ])
    });

    Ok(img)
}

/// Encode an image as PNG.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(|source| Error::Encode { source })?;

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;

    fn gradient_tensor(size: usize) -> ImageTensor {
        Array3::from_shape_fn((3, size, size), |(c, y, x)| {
            #[allow(clippy::cast_precision_loss)]
            let v = ((x + y + c) as f32 / (2 * size) as f32).mul_add(2.0, -1.0);
            v.clamp(-1.0, 1.0)
        })
    }

    #[test]
    fn test_output_matches_original_dims() {
        let tensor = gradient_tensor(32);
        let img = postprocess(&tensor, (71, 19), &Normalization::default(), None).unwrap();

        assert_eq!(img.dimensions(), (71, 19));
    }

    #[test]
    fn test_sharpened_output_keeps_dims() {
        let tensor = gradient_tensor(32);
        let img = postprocess(&tensor, (50, 40), &Normalization::default(), Some(1.5)).unwrap();

        assert_eq!(img.dimensions(), (50, 40));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let tensor = Array3::from_shape_fn((3, 4, 4), |(c, _, _)| if c == 0 { -7.0 } else { 9.0 });
        let img = tensor_to_image(&tensor, &Normalization::default()).unwrap();

        for pixel in img.pixels() {
            assert_eq!(pixel[0], 0);
            assert_eq!(pixel[1], 255);
            assert_eq!(pixel[2], 255);
        }
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let tensor = Array3::<f32>::zeros((1, 8, 8));
        let result = tensor_to_image(&tensor, &Normalization::default());

        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_png_round_trip_is_lossless() {
        let img = RgbImage::from_fn(23, 17, |x, y| {
            Rgb([(x * 11) as u8, (y * 13) as u8, ((x * y) % 256) as u8])
        });
        let bytes = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();

        assert_eq!(decoded, img);
    }
}
