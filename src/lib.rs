//! # gpt2-complete
//!
//! Interactive GPT-2 text completion. Loads a pretrained GPT-2 once, then
//! completes sentences typed at a prompt until the user types `exit`.
//!
//! ## Crates
//!
//! - `gpt2-engine`: the [`CausalLm`] trait every model implements
//! - `gpt2-models`: GPT-2 on candle, config parsing, hub download
//! - `gpt2-tokenizer`: byte-level BPE via `tokenizers`
//! - `gpt2-sampling`: temperature, top-k, top-p and no-repeat n-gram sampling
//! - `gpt2-runtime`: backend selection and inference telemetry
//!
//! This crate wires them into a [`ModelSession`] and an [`InteractiveLoop`].

pub mod error;
pub mod generation;
pub mod repl;
pub mod session;

pub use error::{Error, GenerationError, Result};
pub use generation::{GenerationOptions, GenerationRequest, GenerationResult};
pub use gpt2_engine::{CausalLm, TokenId};
pub use gpt2_runtime::{Backend, DevicePreference, InferenceMetrics};
pub use gpt2_tokenizer::Tokenizer;
pub use repl::{Completer, InteractiveLoop, LoopError, LoopSummary};
pub use session::{ModelSession, SessionConfig};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
