//! # gpt2-engine
//!
//! The "narrow waist" of the gpt2-complete stack. Defines the [`CausalLm`] trait
//! that every model backend implements and that the generation loop drives.
//! Swap the candle GPT-2 model for a mock without touching session code.
//!
//! ## Design Notes
//!
//! ### Shared access
//! `CausalLm::forward` takes `&self`. All per-call state (keys and values of
//! already-processed positions) lives in the backend's associated `Cache`
//! type, which the caller creates with [`CausalLm::new_cache`] and drops when
//! the call is over. A loaded model is therefore never mutated by inference.
//!
//! ### Token Type
//! `TokenId` is `u32` to match the ids produced by Hugging Face tokenizers.

pub type Result<T> = std::result::Result<T, EngineError>;

/// Token ID type.
pub type TokenId = u32;

/// Top-level error type for all engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),
    #[error("Tokenization failed: {0}")]
    Tokenization(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// A decoder-only language model that produces next-token logits.
pub trait CausalLm: Send + Sync {
    /// Incremental decoding state for one generation call.
    type Cache;

    /// Create an empty cache for a new generation call.
    fn new_cache(&self) -> Self::Cache;

    /// Feed the next tokens of every batch row and return the logits of each
    /// row's last position.
    ///
    /// All rows in `step` must have the same, non-zero length. The first call
    /// on a fresh cache carries the prompt; later calls carry one token per row.
    fn forward(&self, step: &[Vec<TokenId>], cache: &mut Self::Cache) -> Result<Vec<Vec<f32>>>;

    /// Number of entries in each logits row.
    fn vocab_size(&self) -> usize;

    /// Maximum number of positions the model can attend over.
    fn context_size(&self) -> usize;
}

/// Check that a batch step is non-empty and rectangular. Returns `(rows, len)`.
pub fn step_shape(step: &[Vec<TokenId>]) -> Result<(usize, usize)> {
    let len = step
        .first()
        .map(|row| row.len())
        .ok_or_else(|| EngineError::Inference("empty batch".to_string()))?;
    if len == 0 {
        return Err(EngineError::Inference("empty batch row".to_string()));
    }
    if let Some(bad) = step.iter().find(|row| row.len() != len) {
        return Err(EngineError::Inference(format!(
            "ragged batch: expected rows of {len} tokens, found {}",
            bad.len()
        )));
    }
    Ok((step.len(), len))
}
