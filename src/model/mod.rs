//! The colorization network and its weight loading.
//!
//! Parameter names follow the layout of the training checkpoint, so a
//! state dict exported to safetensors loads without renaming:
//!
//! | Stage | Prefix |
//! |---|---|
//! | Encoder | `encoder.encoder.{0,2,4,5}` |
//! | Downsample | `downsample.0` |
//! | Attention | `transformer.transformer.layers.{0,1}` |
//! | Upsample | `upsample.0` |
//! | Decoder | `decoder.decoder.{0,2,4}` |

mod attention;
mod bottleneck;
mod colorization;
mod decoder;
mod encoder;
mod loader;

pub use attention::{AttentionEncoder, MultiHeadSelfAttention, TransformerEncoderLayer};
pub use bottleneck::{SpatialBottleneck, TokenLayout};
pub use colorization::ColorizationModel;
pub use decoder::CnnDecoder;
pub use encoder::{CnnEncoder, ResidualBlock};
pub use loader::{load_model, ModelCache, WeightsSource, DEFAULT_WEIGHTS};

use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};

/// Channel count of the encoder output and of every bottleneck stage.
pub const BOTTLENECK_CHANNELS: usize = 128;

/// Number of attention heads in each bottleneck layer.
pub const ATTENTION_HEADS: usize = 4;

/// Number of stacked attention layers in the bottleneck.
pub const ATTENTION_LAYERS: usize = 2;

/// Feed-forward width relative to the channel count.
pub const FEEDFORWARD_RATIO: usize = 4;

/// Total spatial reduction between the model input and the attention stage.
pub const SPATIAL_REDUCTION: usize = 4;

/// 3x3 convolution with padding 1.
fn conv3x3(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    vb: VarBuilder,
) -> candle_core::Result<Conv2d> {
    let cfg = Conv2dConfig {
        padding: 1,
        stride,
        ..Default::default()
    };
    conv2d(in_channels, out_channels, 3, cfg, vb)
}
