//! Transformer encoder layers applied to the bottleneck token sequence.

use candle_core::{Module, Result, Tensor};
use candle_nn::{init, layer_norm, linear, ops::softmax_last_dim, LayerNorm, Linear, VarBuilder};

/// LayerNorm epsilon used by every attention layer.
const LAYER_NORM_EPS: f64 = 1e-5;

/// Multi-head self-attention with a fused QKV input projection.
#[derive(Debug, Clone)]
pub struct MultiHeadSelfAttention {
    in_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl MultiHeadSelfAttention {
    /// Build attention over `dim`-wide tokens split into `num_heads` heads.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights are missing or have the wrong shape.
    pub fn new(dim: usize, num_heads: usize, vb: VarBuilder) -> Result<Self> {
        if num_heads == 0 || dim % num_heads != 0 {
            candle_core::bail!("dim {dim} is not divisible by {num_heads} heads");
        }
        let head_dim = dim / num_heads;

        let in_proj_weight =
            vb.get_with_hints((3 * dim, dim), "in_proj_weight", init::DEFAULT_KAIMING_NORMAL)?;
        let in_proj_bias = vb.get_with_hints(3 * dim, "in_proj_bias", init::ZERO)?;
        let in_proj = Linear::new(in_proj_weight, Some(in_proj_bias));
        let out_proj = linear(dim, dim, vb.pp("out_proj"))?;

        #[allow(clippy::cast_precision_loss)]
        let scale = (head_dim as f64).powf(-0.5);

        Ok(Self {
            in_proj,
            out_proj,
            num_heads,
            head_dim,
            scale,
        })
    }
}

impl Module for MultiHeadSelfAttention {
    /// Input `[B, S, D]` → output `[B, S, D]`.
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, s, _d) = x.dims3()?;

        let qkv = self
            .in_proj
            .forward(x)?
            .reshape((b, s, 3, self.num_heads, self.head_dim))?
            .permute((2, 0, 3, 1, 4))?
            .contiguous()?;

        let q = qkv.get(0)?; // [B, heads, S, head_dim]
        let k = qkv.get(1)?;
        let v = qkv.get(2)?;

        let attn = (q.matmul(&k.t()?)? * self.scale)?;
        let attn = softmax_last_dim(&attn)?;

        let x = attn
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, s, self.num_heads * self.head_dim))?;

        self.out_proj.forward(&x)
    }
}

/// Post-norm transformer encoder layer with a ReLU feed-forward block.
#[derive(Debug, Clone)]
pub struct TransformerEncoderLayer {
    self_attn: MultiHeadSelfAttention,
    linear1: Linear,
    linear2: Linear,
    norm1: LayerNorm,
    norm2: LayerNorm,
}

impl TransformerEncoderLayer {
    /// Build one layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights are missing or have the wrong shape.
    pub fn new(dim: usize, num_heads: usize, feedforward: usize, vb: VarBuilder) -> Result<Self> {
        let self_attn = MultiHeadSelfAttention::new(dim, num_heads, vb.pp("self_attn"))?;
        let linear1 = linear(dim, feedforward, vb.pp("linear1"))?;
        let linear2 = linear(feedforward, dim, vb.pp("linear2"))?;
        let norm1 = layer_norm(dim, LAYER_NORM_EPS, vb.pp("norm1"))?;
        let norm2 = layer_norm(dim, LAYER_NORM_EPS, vb.pp("norm2"))?;
        Ok(Self {
            self_attn,
            linear1,
            linear2,
            norm1,
            norm2,
        })
    }
}

impl Module for TransformerEncoderLayer {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let attn = self.self_attn.forward(x)?;
        let x = self.norm1.forward(&(x + attn)?)?;
        let ff = self.linear2.forward(&self.linear1.forward(&x)?.relu()?)?;
        self.norm2.forward(&(&x + ff)?)
    }
}

/// A stack of [`TransformerEncoderLayer`]s.
#[derive(Debug, Clone)]
pub struct AttentionEncoder {
    layers: Vec<TransformerEncoderLayer>,
}

impl AttentionEncoder {
    /// Build `num_layers` layers under `vb.layers.{i}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights are missing or have the wrong shape.
    pub fn new(
        dim: usize,
        num_heads: usize,
        feedforward: usize,
        num_layers: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let vb_layers = vb.pp("layers");
        let layers = (0..num_layers)
            .map(|i| TransformerEncoderLayer::new(dim, num_heads, feedforward, vb_layers.pp(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    /// Number of stacked layers.
    #[must_use]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl Module for AttentionEncoder {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut x = x.clone();
        for layer in &self.layers {
            x = layer.forward(&x)?;
        }
        Ok(x)
    }
}
