//! Convolutional decoder producing the color image.

use candle_core::{Module, Result, Tensor};
use candle_nn::{conv_transpose2d, Conv2d, ConvTranspose2d, ConvTranspose2dConfig, VarBuilder};

use super::{conv3x3, BOTTLENECK_CHANNELS};

/// Maps `[B, 128, H, W]` features to a `[B, 3, 2H, 2W]` image in [-1, 1].
#[derive(Debug, Clone)]
pub struct CnnDecoder {
    up: ConvTranspose2d,
    refine: Conv2d,
    to_rgb: Conv2d,
}

impl CnnDecoder {
    /// Build the decoder.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights are missing or have the wrong shape.
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("decoder");
        let up_cfg = ConvTranspose2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        let up = conv_transpose2d(BOTTLENECK_CHANNELS, 64, 4, up_cfg, vb.pp(0))?;
        let refine = conv3x3(64, 32, 1, vb.pp(2))?;
        let to_rgb = conv3x3(32, 3, 1, vb.pp(4))?;
        Ok(Self { up, refine, to_rgb })
    }
}

impl Module for CnnDecoder {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.up.forward(x)?.relu()?;
        let x = self.refine.forward(&x)?.relu()?;
        self.to_rgb.forward(&x)?.tanh()
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    use super::*;

    #[test]
    fn test_decoder_doubles_resolution() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let decoder = CnnDecoder::new(vb).unwrap();

        let x = Tensor::randn(0f32, 1.0, (1, BOTTLENECK_CHANNELS, 4, 6), &Device::Cpu).unwrap();
        let y = decoder.forward(&x).unwrap();

        assert_eq!(y.dims(), &[1, 3, 8, 12]);
    }

    #[test]
    fn test_decoder_output_is_bounded() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let decoder = CnnDecoder::new(vb).unwrap();

        let x = Tensor::randn(0f32, 50.0, (1, BOTTLENECK_CHANNELS, 4, 4), &Device::Cpu).unwrap();
        let y = decoder.forward(&x).unwrap();

        let min = y.min_all().unwrap().to_scalar::<f32>().unwrap();
        let max = y.max_all().unwrap().to_scalar::<f32>().unwrap();
        assert!(min >= -1.0);
        assert!(max <= 1.0);
    }
}
