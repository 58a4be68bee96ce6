//! Image decoding, pre-processing, post-processing and encoding.

mod load;
mod save;
mod sharpen;

pub use load::{decode_image, image_to_tensor, load_image, preprocess, to_luminance_rgb};
pub use save::{encode_png, postprocess, tensor_to_image};
pub use sharpen::sharpen;

use ndarray::Array3;
use serde::Deserialize;

/// Image tensor in CHW format (channels, height, width).
/// Values are normalized with a [`Normalization`], which maps [0, 255] to [-1, 1] by default.
pub type ImageTensor = Array3<f32>;

/// Spatial size the colorization model was trained at.
pub const MODEL_IMAGE_SIZE: u32 = 128;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Per-channel constants converting between `[0, 1]` pixels and model values.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Normalization {
    pub mean: [f32; RGB_CHANNELS],
    pub std: [f32; RGB_CHANNELS],
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: [0.5; RGB_CHANNELS],
            std: [0.5; RGB_CHANNELS],
        }
    }
}

impl Normalization {
    /// Map a `[0, 255]` pixel value of channel `c` to model space.
    #[inline]
    #[must_use]
    pub fn normalize(&self, c: usize, value: u8) -> f32 {
        (f32::from(value) / 255.0 - self.mean[c]) / self.std[c]
    }

    /// Map a model value of channel `c` back to `[0, 255]`, clamped.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn denormalize(&self, c: usize, value: f32) -> u8 {
        let unit = value.mul_add(self.std[c], self.mean[c]);
        // Safe: clamped to [0, 255] range before casting
        (unit * 255.0).clamp(0.0, 255.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_normalization_range() {
        let norm = Normalization::default();
        assert!((norm.normalize(0, 0) - (-1.0)).abs() < 1e-6);
        assert!((norm.normalize(1, 255) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_denormalize() {
        let norm = Normalization::default();
        assert_eq!(norm.denormalize(0, -1.0), 0);
        assert_eq!(norm.denormalize(0, 0.0), 127);
        assert_eq!(norm.denormalize(0, 1.0), 255);
    }

    #[test]
    fn test_denormalize_clamp() {
        let norm = Normalization::default();
        assert_eq!(norm.denormalize(2, -2.0), 0);
        assert_eq!(norm.denormalize(2, 2.0), 255);
    }

    #[test]
    fn test_custom_normalization() {
        let norm = Normalization {
            mean: [0.0; 3],
            std: [1.0; 3],
        };
        assert!((norm.normalize(0, 255) - 1.0).abs() < 1e-6);
        assert_eq!(norm.denormalize(0, 0.5), 127);
    }
}
