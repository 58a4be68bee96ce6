//! Convolutional encoder.

use candle_core::{Module, Result, Tensor};
use candle_nn::{Conv2d, VarBuilder};

use super::{conv3x3, BOTTLENECK_CHANNELS};

/// Two 3x3 convolutions with a ReLU in between, added back onto the input.
///
/// Input and output shapes are identical.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    conv1: Conv2d,
    conv2: Conv2d,
}

impl ResidualBlock {
    /// Build a block over `channels` feature maps.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights are missing or have the wrong shape.
    pub fn new(channels: usize, vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("block");
        let conv1 = conv3x3(channels, channels, 1, vb.pp(0))?;
        let conv2 = conv3x3(channels, channels, 1, vb.pp(2))?;
        Ok(Self { conv1, conv2 })
    }
}

impl Module for ResidualBlock {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.conv1.forward(x)?.relu()?;
        let h = self.conv2.forward(&h)?;
        x + h
    }
}

/// Maps a `[B, 3, R, R]` image to `[B, 128, R/2, R/2]` features.
#[derive(Debug, Clone)]
pub struct CnnEncoder {
    expand: Conv2d,
    down: Conv2d,
    res1: ResidualBlock,
    res2: ResidualBlock,
}

impl CnnEncoder {
    /// Build the encoder.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights are missing or have the wrong shape.
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("encoder");
        let expand = conv3x3(3, 64, 1, vb.pp(0))?;
        let down = conv3x3(64, BOTTLENECK_CHANNELS, 2, vb.pp(2))?;
        let res1 = ResidualBlock::new(BOTTLENECK_CHANNELS, vb.pp(4))?;
        let res2 = ResidualBlock::new(BOTTLENECK_CHANNELS, vb.pp(5))?;
        Ok(Self {
            expand,
            down,
            res1,
            res2,
        })
    }
}

impl Module for CnnEncoder {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.expand.forward(x)?.relu()?;
        let x = self.down.forward(&x)?.relu()?;
        let x = self.res1.forward(&x)?;
        self.res2.forward(&x)
    }
}
