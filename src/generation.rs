//! Generation requests, results, and the batched sampling loop.

use gpt2_engine::{CausalLm, TokenId};
use gpt2_runtime::{InferenceMetrics, InferenceTimer};
use gpt2_sampling::Sampler;

use crate::error::GenerationError;

pub const DEFAULT_MAX_NEW_TOKENS: usize = 50;
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_TOP_K: usize = 50;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_NUM_RETURN_SEQUENCES: usize = 1;
pub const DEFAULT_NO_REPEAT_NGRAM_SIZE: usize = 2;

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    /// Tokens to append after the prompt, at most.
    pub max_new_tokens: usize,

    /// Softmax temperature, > 0.
    pub temperature: f32,

    /// Keep the k most likely tokens; 0 disables.
    pub top_k: usize,

    /// Nucleus mass in (0, 1]; 1.0 disables.
    pub top_p: f32,

    /// Independent completions sampled from the same prompt.
    pub num_return_sequences: usize,

    /// Forbid repeating any n-gram of this size; 0 disables.
    pub no_repeat_ngram_size: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            num_return_sequences: DEFAULT_NUM_RETURN_SEQUENCES,
            no_repeat_ngram_size: DEFAULT_NO_REPEAT_NGRAM_SIZE,
        }
    }
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_new_tokens(mut self, n: usize) -> Self {
        self.max_new_tokens = n;
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_top_p(mut self, p: f32) -> Self {
        self.top_p = p;
        self
    }

    pub fn with_num_return_sequences(mut self, n: usize) -> Self {
        self.num_return_sequences = n;
        self
    }

    pub fn with_no_repeat_ngram_size(mut self, n: usize) -> Self {
        self.no_repeat_ngram_size = n;
        self
    }

    /// Check every constraint; the first violation wins.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.max_new_tokens == 0 {
            return Err(GenerationError::InvalidMaxNewTokens);
        }
        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(GenerationError::InvalidTemperature(self.temperature));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(GenerationError::InvalidTopP(self.top_p));
        }
        if self.num_return_sequences == 0 {
            return Err(GenerationError::InvalidReturnSequences);
        }
        Ok(())
    }

    /// A sampler configured with these options.
    pub fn sampler(&self) -> Sampler {
        Sampler::new()
            .with_temperature(self.temperature)
            .with_top_k(self.top_k)
            .with_top_p(self.top_p)
            .with_no_repeat_ngram(self.no_repeat_ngram_size)
    }
}

/// A validated prompt plus its options.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    options: GenerationOptions,
}

impl GenerationRequest {
    /// Fails on an empty prompt or invalid options.
    pub fn new(
        prompt: impl Into<String>,
        options: GenerationOptions,
    ) -> Result<Self, GenerationError> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        options.validate()?;
        Ok(Self { prompt, options })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }
}

/// Decoded completions in generation order, one per requested sequence.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    texts: Vec<String>,
    metrics: InferenceMetrics,
}

impl GenerationResult {
    pub(crate) fn new(texts: Vec<String>, metrics: InferenceMetrics) -> Self {
        Self { texts, metrics }
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn into_texts(self) -> Vec<String> {
        self.texts
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.texts.iter()
    }

    /// Timing and token counts for the call that produced this result.
    pub fn metrics(&self) -> &InferenceMetrics {
        &self.metrics
    }
}

impl IntoIterator for GenerationResult {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.texts.into_iter()
    }
}

/// Special token ids the decode loop needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpecialTokens {
    pub eos: TokenId,
    pub pad: TokenId,
}

/// Sample `num_return_sequences` continuations of `prompt`.
///
/// Rows that emit end-of-sequence are padded with `pad` while the others
/// continue; the loop ends once every row is finished, after
/// `max_new_tokens` steps, or when the context window is full. Returns the
/// full token rows, prompt included.
pub(crate) fn sample_rows<M: CausalLm>(
    model: &M,
    prompt: &[TokenId],
    options: &GenerationOptions,
    special: SpecialTokens,
    sampler: &mut Sampler,
    timer: &mut InferenceTimer<'_>,
) -> Result<Vec<Vec<TokenId>>, GenerationError> {
    let context = model.context_size();
    if prompt.len() >= context {
        return Err(GenerationError::PromptTooLong {
            tokens: prompt.len(),
            context,
        });
    }

    let budget = options.max_new_tokens.min(context - prompt.len());
    if budget < options.max_new_tokens {
        tracing::warn!(
            requested = options.max_new_tokens,
            budget,
            "context window truncates generation"
        );
    }

    let n = options.num_return_sequences;
    let mut rows = vec![prompt.to_vec(); n];
    let mut finished = vec![false; n];

    let mut cache = model.new_cache();
    let mut logits = model.forward(&rows, &mut cache)?;
    timer.mark_prefill_complete();

    for step in 0..budget {
        let mut next = Vec::with_capacity(n);
        for ((row, row_logits), &done) in rows.iter().zip(&logits).zip(&finished) {
            next.push(if done {
                special.pad
            } else {
                sampler.sample_with_history(row_logits, row)?
            });
        }

        let mut sampled = 0;
        for ((row, done), &token) in rows.iter_mut().zip(finished.iter_mut()).zip(&next) {
            if !*done {
                sampled += 1;
                *done = token == special.eos;
            }
            row.push(token);
        }
        timer.mark_tokens(sampled);

        if finished.iter().all(|&done| done) || step + 1 == budget {
            break;
        }

        let step_tokens: Vec<Vec<TokenId>> = next.iter().map(|&token| vec![token]).collect();
        logits = model.forward(&step_tokens, &mut cache)?;
    }

    Ok(rows)
}
