//! Spatial bottleneck: downsample, attend over spatial tokens, upsample.

use candle_core::{Module, Tensor};
use candle_nn::{conv_transpose2d, Conv2d, ConvTranspose2d, ConvTranspose2dConfig, VarBuilder};

use crate::error::{Error, Result};

use super::{
    conv3x3, AttentionEncoder, ATTENTION_HEADS, ATTENTION_LAYERS, BOTTLENECK_CHANNELS,
    FEEDFORWARD_RATIO,
};

/// Geometry of a `[B, C, H, W]` feature map viewed as a `[B, H*W, C]` token sequence.
///
/// Tokens are taken in row-major order, so [`TokenLayout::unflatten`]
/// is the exact inverse of [`TokenLayout::flatten`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLayout {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl TokenLayout {
    /// Record the layout of a `[B, C, H, W]` feature map.
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor is not 4-dimensional.
    pub fn of(features: &Tensor) -> Result<Self> {
        let (batch, channels, height, width) =
            features.dims4().map_err(|_| Error::ShapeMismatch {
                expected: "[B, C, H, W] feature map".to_string(),
                actual: format!("{:?}", features.dims()),
            })?;
        Ok(Self {
            batch,
            channels,
            height,
            width,
        })
    }

    /// Number of tokens, one per spatial position.
    #[must_use]
    pub const fn seq_len(&self) -> usize {
        self.height * self.width
    }

    /// `[B, C, H, W]` → `[B, H*W, C]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `features` does not match this layout.
    pub fn flatten(&self, features: &Tensor) -> Result<Tensor> {
        self.expect_dims(features, &[self.batch, self.channels, self.height, self.width])?;

        features
            .flatten_from(2)
            .and_then(|x| x.transpose(1, 2))
            .and_then(|x| x.contiguous())
            .map_err(|source| Error::Inference { source })
    }

    /// `[B, H*W, C]` → `[B, C, H, W]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `tokens` does not match this layout.
    pub fn unflatten(&self, tokens: &Tensor) -> Result<Tensor> {
        self.expect_dims(tokens, &[self.batch, self.seq_len(), self.channels])?;

        tokens
            .transpose(1, 2)
            .and_then(|x| x.reshape((self.batch, self.channels, self.height, self.width)))
            .map_err(|source| Error::Inference { source })
    }

    fn expect_dims(&self, tensor: &Tensor, expected: &[usize]) -> Result<()> {
        if tensor.dims() == expected {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", tensor.dims()),
            })
        }
    }
}

/// Halves the encoder features, runs self-attention across every spatial
/// position and restores the original resolution.
///
/// Output shape always equals input shape, `[B, 128, H, W]`.
#[derive(Debug, Clone)]
pub struct SpatialBottleneck {
    downsample: Conv2d,
    attention: AttentionEncoder,
    upsample: ConvTranspose2d,
}

impl SpatialBottleneck {
    /// Build the bottleneck from the model root, reading
    /// `downsample.0`, `transformer.transformer` and `upsample.0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights are missing or have the wrong shape.
    pub fn new(vb: VarBuilder) -> candle_core::Result<Self> {
        let downsample = conv3x3(
            BOTTLENECK_CHANNELS,
            BOTTLENECK_CHANNELS,
            2,
            vb.pp("downsample").pp(0),
        )?;

        let attention = AttentionEncoder::new(
            BOTTLENECK_CHANNELS,
            ATTENTION_HEADS,
            BOTTLENECK_CHANNELS * FEEDFORWARD_RATIO,
            ATTENTION_LAYERS,
            vb.pp("transformer").pp("transformer"),
        )?;

        let up_cfg = ConvTranspose2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        let upsample = conv_transpose2d(
            BOTTLENECK_CHANNELS,
            BOTTLENECK_CHANNELS,
            4,
            up_cfg,
            vb.pp("upsample").pp(0),
        )?;

        Ok(Self {
            downsample,
            attention,
            upsample,
        })
    }

    /// Run the bottleneck on `[B, 128, H, W]` features.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the output geometry differs from
    /// the input (odd spatial sizes) and [`Error::Inference`] on tensor failures.
    pub fn forward(&self, features: &Tensor) -> Result<Tensor> {
        let input = TokenLayout::of(features)?;
        if input.channels != BOTTLENECK_CHANNELS {
            return Err(Error::ShapeMismatch {
                expected: format!("{BOTTLENECK_CHANNELS} channels"),
                actual: format!("{} channels", input.channels),
            });
        }

        let x = self
            .downsample
            .forward(features)
            .and_then(|x| x.relu())
            .map_err(|source| Error::Inference { source })?;

        let layout = TokenLayout::of(&x)?;
        tracing::debug!("Attending over {} spatial tokens", layout.seq_len());

        let tokens = layout.flatten(&x)?;
        let tokens = self
            .attention
            .forward(&tokens)
            .map_err(|source| Error::Inference { source })?;
        let x = layout.unflatten(&tokens)?;

        let output = self
            .upsample
            .forward(&x)
            .and_then(|x| x.relu())
            .map_err(|source| Error::Inference { source })?;

        let restored = TokenLayout::of(&output)?;
        if restored != input {
            return Err(Error::ShapeMismatch {
                expected: format!("{input:?}"),
                actual: format!("{restored:?}"),
            });
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    use super::*;

    #[test]
    fn test_token_round_trip_is_identity() {
        let device = Device::Cpu;
        let features = Tensor::arange(0f32, 2.0 * 5.0 * 3.0 * 4.0, &device)
            .unwrap()
            .reshape((2, 5, 3, 4))
            .unwrap();

        let layout = TokenLayout::of(&features).unwrap();
        let tokens = layout.flatten(&features).unwrap();
        assert_eq!(tokens.dims(), &[2, 12, 5]);

        let restored = layout.unflatten(&tokens).unwrap();
        assert_eq!(restored.dims(), features.dims());
        assert_eq!(
            restored.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            features.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }

    #[test]
    fn test_tokens_are_row_major_positions() {
        let device = Device::Cpu;
        let features = Tensor::arange(0f32, 2.0 * 2.0 * 3.0, &device)
            .unwrap()
            .reshape((1, 2, 2, 3))
            .unwrap();

        let layout = TokenLayout::of(&features).unwrap();
        let tokens = layout.flatten(&features).unwrap();

        // Token at row 1, column 2 carries channel values at that position.
        let token = tokens.get(0).unwrap().get(5).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(token, vec![5.0, 11.0]);
    }

    #[test]
    fn test_unflatten_rejects_wrong_length() {
        let device = Device::Cpu;
        let layout = TokenLayout {
            batch: 1,
            channels: 4,
            height: 3,
            width: 3,
        };
        let tokens = Tensor::zeros((1, 8, 4), DType::F32, &device).unwrap();

        assert!(matches!(
            layout.unflatten(&tokens),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_bottleneck_preserves_shape() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let bottleneck = SpatialBottleneck::new(vb).unwrap();

        let x = Tensor::randn(0f32, 1.0, (1, BOTTLENECK_CHANNELS, 8, 8), &Device::Cpu).unwrap();
        let y = bottleneck.forward(&x).unwrap();

        assert_eq!(y.dims(), x.dims());
    }

    #[test]
    fn test_bottleneck_rejects_odd_resolution() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let bottleneck = SpatialBottleneck::new(vb).unwrap();

        let x = Tensor::randn(0f32, 1.0, (1, BOTTLENECK_CHANNELS, 5, 5), &Device::Cpu).unwrap();

        assert!(matches!(
            bottleneck.forward(&x),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_bottleneck_rejects_wrong_channels() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let bottleneck = SpatialBottleneck::new(vb).unwrap();

        let x = Tensor::zeros((1, 64, 8, 8), DType::F32, &Device::Cpu).unwrap();

        assert!(matches!(
            bottleneck.forward(&x),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
