//! Loaded model state and the completion entry point.
//!
//! A [`ModelSession`] ties together a causal language model, its tokenizer
//! and the random source used for sampling. It is created once at startup
//! and stays read-only apart from the random state.

use gpt2_engine::CausalLm;
use gpt2_models::{Gpt2Model, ModelFiles};
use gpt2_runtime::{
    Backend, BackendSelector, DevicePreference, InferenceTimer, TelemetryHook, TracingTelemetry,
};
use gpt2_tokenizer::{HfTokenizer, Tokenizer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, GenerationError, Result};
use crate::generation::{
    sample_rows, GenerationOptions, GenerationRequest, GenerationResult, SpecialTokens,
};

pub const DEFAULT_MODEL_ID: &str = "gpt2";
pub const DEFAULT_REVISION: &str = "main";

/// Configuration for loading a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hub repository id or path to a local model directory.
    pub model_id: String,

    /// Hub revision (branch, tag or commit).
    pub revision: String,

    /// Which compute backend to use.
    pub device: DevicePreference,

    /// Fixed seed for reproducible sampling.
    pub seed: Option<u64>,

    /// Options used by the interactive loop.
    pub generation: GenerationOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            device: DevicePreference::Auto,
            seed: None,
            generation: GenerationOptions::default(),
        }
    }
}

/// A ready-to-use model, tokenizer and sampling state.
pub struct ModelSession<M = Gpt2Model, T = HfTokenizer> {
    model: M,
    tokenizer: T,
    backend: Backend,
    rng: StdRng,
    defaults: GenerationOptions,
    telemetry: Box<dyn TelemetryHook>,
}

impl ModelSession<Gpt2Model, HfTokenizer> {
    /// Resolve the model files, pick a backend and load weights plus tokenizer.
    ///
    /// Downloads from the hub on first use. Any failure here means the
    /// session never becomes ready.
    pub fn load(config: &SessionConfig) -> Result<Self> {
        let selector = BackendSelector::with_preference(config.device)?;
        Self::load_on(&selector, config)
    }

    /// Like [`ModelSession::load`] but on an already selected backend.
    pub fn load_on(selector: &BackendSelector, config: &SessionConfig) -> Result<Self> {
        info!(
            model_id = %config.model_id,
            revision = %config.revision,
            backend = %selector.active(),
            "loading model"
        );

        let files = ModelFiles::resolve(&config.model_id, &config.revision)?;
        let tokenizer = HfTokenizer::from_file(&files.tokenizer)
            .map_err(|e| Error::ModelLoad(e.to_string()))?;
        let model = Gpt2Model::load(&files, selector.device())?;

        if tokenizer.eos_token_id() != model.config().eos_token_id {
            warn!(
                tokenizer = tokenizer.eos_token_id(),
                config = model.config().eos_token_id,
                "tokenizer and model disagree on the end-of-text id"
            );
        }
        if tokenizer.vocab_size() > model.vocab_size() {
            return Err(Error::ModelLoad(format!(
                "tokenizer vocabulary ({}) is larger than the model's ({})",
                tokenizer.vocab_size(),
                model.vocab_size()
            )));
        }

        let mut session =
            Self::from_parts(model, tokenizer, selector.active()).with_defaults(config.generation);
        if let Some(seed) = config.seed {
            session = session.with_seed(seed);
        }
        info!(model_id = %config.model_id, "model ready");
        Ok(session)
    }
}

impl<M: CausalLm, T: Tokenizer> ModelSession<M, T> {
    /// Assemble a session from an already built model and tokenizer.
    pub fn from_parts(model: M, tokenizer: T, backend: Backend) -> Self {
        Self {
            model,
            tokenizer,
            backend,
            rng: StdRng::from_entropy(),
            defaults: GenerationOptions::default(),
            telemetry: Box::new(TracingTelemetry),
        }
    }

    /// Reseed the sampling state. Two sessions with the same seed and the
    /// same sequence of calls produce the same completions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_defaults(mut self, options: GenerationOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn with_telemetry(mut self, hook: impl TelemetryHook + 'static) -> Self {
        self.telemetry = Box::new(hook);
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Options used when no explicit options are given.
    pub fn defaults(&self) -> &GenerationOptions {
        &self.defaults
    }

    /// Complete `text` with the given options.
    ///
    /// Returns `num_return_sequences` texts, each one the prompt followed by
    /// its sampled continuation with special tokens removed.
    pub fn complete(
        &mut self,
        text: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        let request = GenerationRequest::new(text, *options)?;
        self.run(&request)
    }

    /// Run an already validated request.
    pub fn run(&mut self, request: &GenerationRequest) -> Result<GenerationResult> {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!("complete", %request_id);
        let _enter = span.enter();

        let options = request.options();
        let prompt = self
            .tokenizer
            .encode(request.prompt())
            .map_err(GenerationError::from)?;
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt.into());
        }
        debug!(
            prompt_tokens = prompt.len(),
            sequences = options.num_return_sequences,
            max_new_tokens = options.max_new_tokens,
            "generating"
        );

        let special = SpecialTokens {
            eos: self.tokenizer.eos_token_id(),
            pad: self.tokenizer.pad_token_id(),
        };
        let rng = std::mem::replace(&mut self.rng, StdRng::seed_from_u64(0));
        let mut sampler = options.sampler().with_rng(rng);
        let mut timer = InferenceTimer::new(
            self.backend,
            prompt.len(),
            options.num_return_sequences,
            self.telemetry.as_ref(),
        );

        let rows = sample_rows(
            &self.model,
            &prompt,
            options,
            special,
            &mut sampler,
            &mut timer,
        );
        self.rng = sampler.into_rng();
        let rows = rows?;
        let metrics = timer.finish();

        let texts = rows
            .iter()
            .map(|row| self.tokenizer.decode(row, true))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(GenerationError::from)?;

        Ok(GenerationResult::new(texts, metrics))
    }
}
