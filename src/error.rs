//! Error types for the gpt2-complete crate.

use gpt2_engine::EngineError;
use gpt2_models::ModelError;
use gpt2_runtime::BackendError;
use gpt2_sampling::SamplingError;
use gpt2_tokenizer::TokenizerError;
use thiserror::Error;

/// Top-level error type. Either the session never became ready, or one
/// completion call failed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
}

/// Why a single completion call failed.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("max_new_tokens must be positive")]
    InvalidMaxNewTokens,

    #[error("temperature must be a positive finite number (got {0})")]
    InvalidTemperature(f32),

    #[error("top_p must be in (0, 1] (got {0})")]
    InvalidTopP(f32),

    #[error("num_return_sequences must be positive")]
    InvalidReturnSequences,

    #[error("prompt has {tokens} tokens but the context window is {context}")]
    PromptTooLong { tokens: usize, context: usize },

    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error("sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("inference error: {0}")]
    Inference(#[from] EngineError),
}

impl From<ModelError> for Error {
    fn from(err: ModelError) -> Self {
        Error::ModelLoad(err.to_string())
    }
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        Error::ModelLoad(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
