//! GPT-2's "Conv1D": a linear layer whose weight is stored `[in, out]`.
//!
//! The checkpoints keep the transposed layout of the original TensorFlow
//! code, so `y = x @ W + b` without the transpose `candle_nn::Linear` applies.

use candle_core::{Module, Result, Tensor};
use candle_nn::{Init, VarBuilder};

pub struct Conv1D {
    /// `[in_dim, out_dim]`
    weight: Tensor,
    /// `[out_dim]`
    bias: Tensor,
    out_dim: usize,
}

impl Conv1D {
    pub fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(
            (in_dim, out_dim),
            "weight",
            Init::Randn {
                mean: 0.0,
                stdev: 0.02,
            },
        )?;
        let bias = vb.get_with_hints(out_dim, "bias", Init::Const(0.0))?;
        Ok(Self {
            weight,
            bias,
            out_dim,
        })
    }
}

impl Module for Conv1D {
    /// `x`: `[batch, seq_len, in_dim]` -> `[batch, seq_len, out_dim]`.
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, in_dim) = x.dims3()?;
        x.reshape((batch * seq_len, in_dim))?
            .matmul(&self.weight)?
            .broadcast_add(&self.bias)?
            .reshape((batch, seq_len, self.out_dim))
    }
}
