//! The full colorization network.

use candle_core::{Device, Module, Tensor};
use candle_nn::VarBuilder;
use ndarray::Array3;

use crate::error::{Error, Result};
use crate::image::{ImageTensor, RGB_CHANNELS};

use super::{CnnDecoder, CnnEncoder, SpatialBottleneck, SPATIAL_REDUCTION};

/// Encoder → downsample → attention → upsample → decoder.
///
/// Maps a normalized `[B, 3, R, R]` luminance image to a normalized
/// `[B, 3, R, R]` color image with values in [-1, 1]. The network holds no
/// mutable state, so one instance can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct ColorizationModel {
    encoder: CnnEncoder,
    bottleneck: SpatialBottleneck,
    decoder: CnnDecoder,
    device: Device,
}

impl ColorizationModel {
    /// Build the network from a variable builder rooted at the checkpoint top level.
    ///
    /// # Errors
    ///
    /// Returns an error if any weight is missing or has the wrong shape.
    pub fn new(vb: VarBuilder) -> candle_core::Result<Self> {
        let device = vb.device().clone();
        let encoder = CnnEncoder::new(vb.pp("encoder"))?;
        let decoder = CnnDecoder::new(vb.pp("decoder"))?;
        let bottleneck = SpatialBottleneck::new(vb)?;

        Ok(Self {
            encoder,
            bottleneck,
            decoder,
            device,
        })
    }

    /// Device the weights live on.
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Run the network on a `[B, 3, H, W]` batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the input is not a 3-channel image
    /// with both sides divisible by 4, and [`Error::Inference`] if the forward
    /// pass fails.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let dims = x.dims().to_vec();
        let valid = matches!(
            dims.as_slice(),
            [_, c, h, w] if *c == RGB_CHANNELS
                && *h > 0
                && *w > 0
                && h % SPATIAL_REDUCTION == 0
                && w % SPATIAL_REDUCTION == 0
        );
        if !valid {
            return Err(Error::ShapeMismatch {
                expected: format!(
                    "[B, {RGB_CHANNELS}, H, W] with H and W divisible by {SPATIAL_REDUCTION}"
                ),
                actual: format!("{dims:?}"),
            });
        }

        let features = self
            .encoder
            .forward(x)
            .map_err(|source| Error::Inference { source })?;
        tracing::debug!("Encoder features: {:?}", features.dims());

        let features = self.bottleneck.forward(&features)?;

        let output = self
            .decoder
            .forward(&features)
            .map_err(|source| Error::Inference { source })?;

        if output.dims() != dims.as_slice() {
            return Err(Error::ShapeMismatch {
                expected: format!("{dims:?}"),
                actual: format!("{:?}", output.dims()),
            });
        }

        Ok(output)
    }

    /// Colorize a single normalized CHW image tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor has the wrong shape or inference fails.
    pub fn colorize(&self, image: &ImageTensor) -> Result<ImageTensor> {
        let (channels, height, width) = image.dim();

        let input = Tensor::from_iter(image.iter().copied(), &self.device)
            .and_then(|t| t.reshape((1, channels, height, width)))
            .map_err(|source| Error::Inference { source })?;

        let output = self.forward(&input)?;

        let data = output
            .squeeze(0)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|source| Error::Inference { source })?;

        Array3::from_shape_vec((RGB_CHANNELS, height, width), data).map_err(|_| {
            Error::ShapeMismatch {
                expected: format!("[{RGB_CHANNELS}, {height}, {width}]"),
                actual: "reshape failed".to_string(),
            }
        })
    }
}
