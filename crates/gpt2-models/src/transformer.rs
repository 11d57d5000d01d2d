//! The GPT-2 decoder stack.
//!
//! embed(token) + embed(position) -> n_layer x [x + attn(ln_1(x)); x + mlp(ln_2(x))]
//! -> ln_f -> logits against the token embedding matrix (tied LM head).

use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{embedding, layer_norm, Embedding, LayerNorm, VarBuilder};
use gpt2_engine::{step_shape, CausalLm, EngineError, TokenId};

use crate::attention::{causal_mask, Attention, LayerCache};
use crate::config::Gpt2Config;
use crate::conv1d::Conv1D;
use crate::hub::ModelFiles;
use crate::Result;

struct Mlp {
    c_fc: Conv1D,
    c_proj: Conv1D,
}

impl Mlp {
    fn new(config: &Gpt2Config, vb: VarBuilder) -> candle_core::Result<Self> {
        let inner = config.inner_dim();
        Ok(Self {
            c_fc: Conv1D::new(config.n_embd, inner, vb.pp("c_fc"))?,
            c_proj: Conv1D::new(inner, config.n_embd, vb.pp("c_proj"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        // GPT-2 uses the tanh approximation of GELU.
        self.c_proj.forward(&self.c_fc.forward(x)?.gelu()?)
    }
}

struct Block {
    ln_1: LayerNorm,
    attn: Attention,
    ln_2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn new(config: &Gpt2Config, vb: VarBuilder) -> candle_core::Result<Self> {
        let eps = config.layer_norm_epsilon;
        Ok(Self {
            ln_1: layer_norm(config.n_embd, eps, vb.pp("ln_1"))?,
            attn: Attention::new(config, vb.pp("attn"))?,
            ln_2: layer_norm(config.n_embd, eps, vb.pp("ln_2"))?,
            mlp: Mlp::new(config, vb.pp("mlp"))?,
        })
    }

    fn forward(
        &self,
        x: &Tensor,
        mask: Option<&Tensor>,
        cache: &mut LayerCache,
    ) -> candle_core::Result<Tensor> {
        let x = (x + self.attn.forward(&self.ln_1.forward(x)?, mask, cache)?)?;
        &x + self.mlp.forward(&self.ln_2.forward(&x)?)?
    }
}

/// Per-call decoding state: one [`LayerCache`] per block plus the position offset.
pub struct Gpt2Cache {
    layers: Vec<LayerCache>,
    offset: usize,
}

impl Gpt2Cache {
    fn new(n_layer: usize) -> Self {
        Self {
            layers: vec![None; n_layer],
            offset: 0,
        }
    }

    /// Number of positions already processed.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// GPT-2 language model.
///
/// Weights are plain tensors, never `Var`s, so no gradient bookkeeping exists.
pub struct Gpt2Model {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    config: Gpt2Config,
    device: Device,
}

impl Gpt2Model {
    /// Build the model from a variable builder.
    ///
    /// Accepts both the bare (`wte.weight`) and the `transformer.`-prefixed
    /// checkpoint layouts.
    pub fn new(config: &Gpt2Config, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let device = vb.device().clone();
        let vb = if vb.contains_tensor("wte.weight") {
            vb
        } else {
            vb.pp("transformer")
        };

        let wte = embedding(config.vocab_size, config.n_embd, vb.pp("wte"))?;
        let wpe = embedding(config.n_positions, config.n_embd, vb.pp("wpe"))?;
        let blocks = (0..config.n_layer)
            .map(|i| Block::new(config, vb.pp("h").pp(i)))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let ln_f = layer_norm(config.n_embd, config.layer_norm_epsilon, vb.pp("ln_f"))?;

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            config: config.clone(),
            device,
        })
    }

    /// Load config and safetensors weights resolved by [`ModelFiles`].
    pub fn load(files: &ModelFiles, device: &Device) -> Result<Self> {
        let config = Gpt2Config::from_file(&files.config)?;
        tracing::debug!(
            n_layer = config.n_layer,
            n_embd = config.n_embd,
            shards = files.weights.len(),
            "loading gpt2 weights"
        );

        // Safety: the safetensors files are memory-mapped read-only and must
        // not be modified on disk while the model is alive.
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, DType::F32, device)? };
        Self::new(&config, vb)
    }

    pub fn config(&self) -> &Gpt2Config {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn forward_logits(
        &self,
        step: &[Vec<TokenId>],
        rows: usize,
        len: usize,
        cache: &mut Gpt2Cache,
    ) -> candle_core::Result<Vec<Vec<f32>>> {
        let ids: Vec<u32> = step.iter().flatten().copied().collect();
        let input = Tensor::from_vec(ids, (rows, len), &self.device)?;
        let positions =
            Tensor::arange(cache.offset as u32, (cache.offset + len) as u32, &self.device)?;

        let mut x = self
            .wte
            .forward(&input)?
            .broadcast_add(&self.wpe.forward(&positions)?)?;

        let mask = if len > 1 {
            Some(causal_mask(len, cache.offset, &self.device)?)
        } else {
            None
        };

        for (block, layer_cache) in self.blocks.iter().zip(cache.layers.iter_mut()) {
            x = block.forward(&x, mask.as_ref(), layer_cache)?;
        }
        cache.offset += len;

        let last = self.ln_f.forward(&x.i((.., len - 1, ..))?.contiguous()?)?;
        let logits = last.matmul(&self.wte.embeddings().t()?)?;
        logits.to_dtype(DType::F32)?.to_vec2::<f32>()
    }
}

impl CausalLm for Gpt2Model {
    type Cache = Gpt2Cache;

    fn new_cache(&self) -> Gpt2Cache {
        Gpt2Cache::new(self.config.n_layer)
    }

    fn forward(
        &self,
        step: &[Vec<TokenId>],
        cache: &mut Gpt2Cache,
    ) -> gpt2_engine::Result<Vec<Vec<f32>>> {
        let (rows, len) = step_shape(step)?;
        if cache.offset + len > self.config.n_positions {
            return Err(EngineError::Inference(format!(
                "sequence of {} positions exceeds the context window of {}",
                cache.offset + len,
                self.config.n_positions
            )));
        }
        if let Some(&bad) = step
            .iter()
            .flatten()
            .find(|&&id| id as usize >= self.config.vocab_size)
        {
            return Err(EngineError::Inference(format!(
                "token id {bad} outside vocabulary of {}",
                self.config.vocab_size
            )));
        }

        self.forward_logits(step, rows, len, cache)
            .map_err(|e| EngineError::Inference(e.to_string()))
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn context_size(&self) -> usize {
        self.config.n_positions
    }
}
