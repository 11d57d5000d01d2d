//! Causal multi-head self-attention with a fused QKV projection.

use candle_core::{Device, Module, Result, Tensor, D};
use candle_nn::VarBuilder;

use crate::config::Gpt2Config;
use crate::conv1d::Conv1D;

/// Keys and values of already-processed positions, each `[batch, n_head, seq, head_dim]`.
pub type LayerCache = Option<(Tensor, Tensor)>;

pub struct Attention {
    /// `[n_embd] -> [3 * n_embd]`, query/key/value concatenated.
    c_attn: Conv1D,
    /// `[n_embd] -> [n_embd]`.
    c_proj: Conv1D,
    n_head: usize,
    head_dim: usize,
    /// 1 / sqrt(head_dim).
    scale: f64,
}

impl Attention {
    pub fn new(config: &Gpt2Config, vb: VarBuilder) -> Result<Self> {
        let d = config.n_embd;
        let head_dim = config.head_dim();
        Ok(Self {
            c_attn: Conv1D::new(d, 3 * d, vb.pp("c_attn"))?,
            c_proj: Conv1D::new(d, d, vb.pp("c_proj"))?,
            n_head: config.n_head,
            head_dim,
            scale: 1.0 / (head_dim as f64).sqrt(),
        })
    }

    /// Forward pass.
    ///
    /// - `x`: `[batch, seq_len, n_embd]`
    /// - `mask`: additive `[seq_len, cached + seq_len]` mask, `None` for a single position
    /// - `cache`: this layer's keys/values; extended in place
    pub fn forward(
        &self,
        x: &Tensor,
        mask: Option<&Tensor>,
        cache: &mut LayerCache,
    ) -> Result<Tensor> {
        let (batch, seq_len, n_embd) = x.dims3()?;
        let qkv = self.c_attn.forward(x)?;

        let q = self.split_heads(&qkv, 0, n_embd)?;
        let mut k = self.split_heads(&qkv, 1, n_embd)?;
        let mut v = self.split_heads(&qkv, 2, n_embd)?;

        if let Some((past_k, past_v)) = cache.as_ref() {
            k = Tensor::cat(&[past_k, &k], 2)?;
            v = Tensor::cat(&[past_v, &v], 2)?;
        }
        *cache = Some((k.clone(), v.clone()));

        let scores = q.matmul(&k.t()?)?.affine(self.scale, 0.0)?;
        let scores = match mask {
            Some(mask) => scores.broadcast_add(mask)?,
            None => scores,
        };
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;

        let out = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, n_embd))?;
        self.c_proj.forward(&out)
    }

    /// Slice chunk `index` of the fused projection into `[batch, n_head, seq, head_dim]`.
    fn split_heads(&self, qkv: &Tensor, index: usize, n_embd: usize) -> Result<Tensor> {
        let (batch, seq_len, _) = qkv.dims3()?;
        qkv.narrow(D::Minus1, index * n_embd, n_embd)?
            .reshape((batch, seq_len, self.n_head, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }
}

/// Additive causal mask for `seq_len` new positions after `offset` cached ones.
///
/// New position `i` may attend to every cached position and to new positions `<= i`.
pub fn causal_mask(seq_len: usize, offset: usize, device: &Device) -> Result<Tensor> {
    let total = offset + seq_len;
    let mask: Vec<f32> = (0..seq_len)
        .flat_map(|i| {
            (0..total).map(move |j| if j > offset + i { f32::NEG_INFINITY } else { 0.0 })
        })
        .collect();
    Tensor::from_vec(mask, (seq_len, total), device)
}
