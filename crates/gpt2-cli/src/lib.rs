//! # gpt2-cli
//!
//! Argument parsing and the console session behind the `gpt2-complete`
//! binary. Everything here is plain library code so it can be driven with
//! in-memory readers and writers.

use std::io::{BufRead, Write};

use anyhow::Context;
use clap::Parser;
use gpt2_complete::generation::{
    DEFAULT_MAX_NEW_TOKENS, DEFAULT_NO_REPEAT_NGRAM_SIZE, DEFAULT_NUM_RETURN_SEQUENCES,
    DEFAULT_TEMPERATURE, DEFAULT_TOP_K, DEFAULT_TOP_P,
};
use gpt2_complete::session::{DEFAULT_MODEL_ID, DEFAULT_REVISION};
use gpt2_complete::{
    DevicePreference, GenerationOptions, InteractiveLoop, LoopSummary, ModelSession,
    SessionConfig,
};
use gpt2_runtime::BackendSelector;

pub const BANNER: &str = "=== GPT-2 Text Completion Demo ===";

/// Interactive GPT-2 sentence completion.
#[derive(Debug, Clone, Parser)]
#[command(name = "gpt2-complete", version)]
pub struct Cli {
    /// Hub model id (e.g. gpt2, gpt2-medium) or a local model directory.
    #[arg(short, long, env = "GPT2_MODEL", default_value = DEFAULT_MODEL_ID)]
    pub model: String,

    /// Hub revision to download.
    #[arg(long, default_value = DEFAULT_REVISION)]
    pub revision: String,

    /// Compute backend: auto, cpu, cuda or metal.
    #[arg(short, long, default_value_t = DevicePreference::Auto)]
    pub device: DevicePreference,

    /// Random seed for reproducible sampling.
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Maximum number of tokens to append to each prompt.
    #[arg(long, default_value_t = DEFAULT_MAX_NEW_TOKENS)]
    pub max_new_tokens: usize,

    /// Sampling temperature (higher = more random, must be > 0).
    #[arg(short, long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// Keep only the k most likely tokens (0 disables).
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Nucleus sampling mass in (0, 1].
    #[arg(long, default_value_t = DEFAULT_TOP_P)]
    pub top_p: f32,

    /// Completions printed per prompt.
    #[arg(short = 'n', long, default_value_t = DEFAULT_NUM_RETURN_SEQUENCES)]
    pub num_return_sequences: usize,

    /// Never repeat an n-gram of this size (0 disables).
    #[arg(long, default_value_t = DEFAULT_NO_REPEAT_NGRAM_SIZE)]
    pub no_repeat_ngram_size: usize,
}

impl Cli {
    /// Sampling options from the flags, validated up front.
    pub fn generation_options(&self) -> anyhow::Result<GenerationOptions> {
        let options = GenerationOptions::new()
            .with_max_new_tokens(self.max_new_tokens)
            .with_temperature(self.temperature)
            .with_top_k(self.top_k)
            .with_top_p(self.top_p)
            .with_num_return_sequences(self.num_return_sequences)
            .with_no_repeat_ngram_size(self.no_repeat_ngram_size);
        options.validate().context("invalid generation options")?;
        Ok(options)
    }

    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        Ok(SessionConfig {
            model_id: self.model.clone(),
            revision: self.revision.clone(),
            device: self.device,
            seed: self.seed,
            generation: self.generation_options()?,
        })
    }
}

/// Load the model, then run the prompt loop on `input` until `exit` or EOF.
pub fn run(cli: &Cli, input: impl BufRead, mut output: impl Write) -> anyhow::Result<LoopSummary> {
    let config = cli.session_config()?;
    let selector = BackendSelector::with_preference(config.device)?;

    writeln!(output, "{BANNER}")?;
    writeln!(output, "Using device: {}", selector.active())?;
    writeln!(output, "Loading {} model...", config.model_id)?;
    output.flush()?;

    let mut session = ModelSession::load_on(&selector, &config)
        .with_context(|| format!("could not load {}", config.model_id))?;
    writeln!(output, "{} model loaded successfully!", config.model_id)?;

    let summary = InteractiveLoop::new(input, output).run(&mut session)?;
    tracing::info!(
        prompts = summary.prompts,
        completions = summary.completions,
        "session finished"
    );
    Ok(summary)
}
