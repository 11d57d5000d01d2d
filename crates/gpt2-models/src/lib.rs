//! # gpt2-models
//!
//! GPT-2 for gpt2-complete, built from `candle-nn` layers:
//! - [`Gpt2Config`]: hyperparameters from a Hugging Face `config.json`
//! - [`Gpt2Model`]: pre-norm decoder with a tied LM head, implements [`gpt2_engine::CausalLm`]
//! - [`ModelFiles`]: resolves a model id to local files (directory or hub download)

pub mod attention;
pub mod config;
pub mod conv1d;
pub mod hub;
pub mod transformer;

pub use config::Gpt2Config;
pub use hub::ModelFiles;
pub use transformer::{Gpt2Cache, Gpt2Model};

use gpt2_engine::EngineError;

/// Errors from model resolution, construction and weight loading.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Hub error: {0}")]
    Hub(String),

    #[error("Weight loading error: {0}")]
    WeightLoad(String),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        EngineError::ModelLoad(err.to_string())
    }
}
