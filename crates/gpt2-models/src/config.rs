//! GPT-2 model configuration.
//!
//! Field names follow the Hugging Face `config.json` for the `gpt2` model type.
//! Missing fields fall back to the 124M ("small") values.

use std::path::Path;

use serde::Deserialize;

use crate::{ModelError, Result};

/// Configuration for a GPT-2 family model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Gpt2Config {
    /// Vocabulary size (50257 for the OpenAI checkpoints).
    #[serde(default = "default_vocab_size")]
    pub vocab_size: usize,

    /// Maximum sequence length (context window).
    #[serde(default = "default_n_positions")]
    pub n_positions: usize,

    /// Hidden dimension.
    #[serde(default = "default_n_embd")]
    pub n_embd: usize,

    /// Number of transformer blocks.
    #[serde(default = "default_n_layer")]
    pub n_layer: usize,

    /// Number of attention heads.
    #[serde(default = "default_n_head")]
    pub n_head: usize,

    /// MLP inner dimension; `None` means `4 * n_embd`.
    #[serde(default)]
    pub n_inner: Option<usize>,

    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f64,

    /// End-of-text token id.
    #[serde(default = "default_eos_token_id")]
    pub eos_token_id: u32,

    #[serde(default = "default_model_type")]
    pub model_type: String,
}

fn default_vocab_size() -> usize {
    50257
}
fn default_n_positions() -> usize {
    1024
}
fn default_n_embd() -> usize {
    768
}
fn default_n_layer() -> usize {
    12
}
fn default_n_head() -> usize {
    12
}
fn default_layer_norm_epsilon() -> f64 {
    1e-5
}
fn default_eos_token_id() -> u32 {
    50256
}
fn default_model_type() -> String {
    "gpt2".to_string()
}

impl Gpt2Config {
    /// GPT-2 124M.
    pub fn gpt2_small() -> Self {
        Self {
            vocab_size: default_vocab_size(),
            n_positions: default_n_positions(),
            n_embd: 768,
            n_layer: 12,
            n_head: 12,
            n_inner: None,
            layer_norm_epsilon: default_layer_norm_epsilon(),
            eos_token_id: default_eos_token_id(),
            model_type: default_model_type(),
        }
    }

    /// GPT-2 355M.
    pub fn gpt2_medium() -> Self {
        Self {
            n_embd: 1024,
            n_layer: 24,
            n_head: 16,
            ..Self::gpt2_small()
        }
    }

    /// Load and validate a `config.json`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject shapes the model cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.model_type != "gpt2" {
            return Err(ModelError::Config(format!(
                "unsupported model_type {:?}, expected \"gpt2\"",
                self.model_type
            )));
        }
        if self.n_head == 0 || self.n_embd % self.n_head != 0 {
            return Err(ModelError::Config(format!(
                "n_embd ({}) must be divisible by n_head ({})",
                self.n_embd, self.n_head
            )));
        }
        if self.n_layer == 0 || self.n_positions == 0 || self.vocab_size == 0 {
            return Err(ModelError::Config(
                "n_layer, n_positions and vocab_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Dimension of each attention head.
    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }

    /// MLP inner dimension.
    pub fn inner_dim(&self) -> usize {
        self.n_inner.unwrap_or(4 * self.n_embd)
    }

    /// Rough parameter count (tied embeddings counted once).
    pub fn estimated_params(&self) -> usize {
        let d = self.n_embd;
        let embed = self.vocab_size * d + self.n_positions * d;
        let attn = d * 3 * d + 3 * d + d * d + d;
        let mlp = d * self.inner_dim() * 2 + self.inner_dim() + d;
        let norms = 4 * d;
        embed + self.n_layer * (attn + mlp + norms) + 2 * d
    }
}

impl Default for Gpt2Config {
    fn default() -> Self {
        Self::gpt2_small()
    }
}
