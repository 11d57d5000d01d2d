//! # gpt2-sampling
//!
//! Sampling and decoding strategies for gpt2-complete.
//!
//! Supports:
//! - Temperature scaling
//! - Top-k filtering
//! - Top-p (nucleus) filtering
//! - No-repeat n-gram suppression
//! - Seeded RNG for reproducible generation, OS entropy otherwise
//!
//! Processing order per step: n-gram ban, temperature, top-k, softmax, top-p,
//! then a weighted draw.

use gpt2_engine::TokenId;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Sampling error type.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingError {
    InvalidLogits,
    InvalidTemperature,
    InvalidTopP,
    NoValidTokens,
}

impl std::fmt::Display for SamplingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingError::InvalidLogits => write!(f, "Invalid logits array"),
            SamplingError::InvalidTemperature => write!(f, "Temperature must be > 0"),
            SamplingError::InvalidTopP => write!(f, "Top-p must be in (0, 1]"),
            SamplingError::NoValidTokens => write!(f, "No valid tokens after filtering"),
        }
    }
}

impl std::error::Error for SamplingError {}

pub type SamplingResult<T> = std::result::Result<T, SamplingError>;

/// Forbids any token that would complete an n-gram already present in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoRepeatNGram {
    size: usize,
}

impl NoRepeatNGram {
    /// `size == 0` disables the constraint.
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tokens that, appended to `history`, would repeat an existing n-gram.
    pub fn banned_tokens(&self, history: &[TokenId]) -> Vec<TokenId> {
        let n = self.size;
        if n == 0 || history.len() + 1 < n {
            return Vec::new();
        }

        let prefix = &history[history.len() + 1 - n..];
        let mut banned: Vec<TokenId> = history
            .windows(n)
            .filter(|gram| &gram[..n - 1] == prefix)
            .map(|gram| gram[n - 1])
            .collect();
        banned.sort_unstable();
        banned.dedup();
        banned
    }

    /// True if no n-gram occurs twice in `tokens`.
    pub fn is_satisfied_by(&self, tokens: &[TokenId]) -> bool {
        if self.size == 0 || tokens.len() < self.size {
            return true;
        }
        let mut seen = std::collections::HashSet::new();
        tokens.windows(self.size).all(|gram| seen.insert(gram))
    }
}

/// Sampling configuration and strategy.
#[derive(Debug, Clone)]
pub struct Sampler {
    /// Temperature for softmax scaling. > 1.0 = more random, < 1.0 = more deterministic.
    pub temperature: f32,

    /// Top-k: only sample from top k logits.
    pub top_k: Option<usize>,

    /// Top-p (nucleus sampling): sample from smallest set of tokens with cumulative prob >= p.
    pub top_p: Option<f32>,

    /// N-gram suppression over the row's history.
    pub no_repeat_ngram: Option<NoRepeatNGram>,

    /// RNG state. Mutated on each call.
    rng: StdRng,
}

impl Sampler {
    /// Create a sampler with temperature 1.0, no filtering, and an entropy-seeded RNG.
    pub fn new() -> Self {
        Self {
            temperature: 1.0,
            top_k: None,
            top_p: None,
            no_repeat_ngram: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    /// `k == 0` disables top-k filtering.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = (k > 0).then_some(k);
        self
    }

    pub fn with_top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    /// `size == 0` disables the constraint.
    pub fn with_no_repeat_ngram(mut self, size: usize) -> Self {
        self.no_repeat_ngram = (size > 0).then(|| NoRepeatNGram::new(size));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Replace the RNG, e.g. with one owned by a longer-lived session.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Hand back the RNG so its state can outlive this sampler.
    pub fn into_rng(self) -> StdRng {
        self.rng
    }

    /// Check temperature and top-p without sampling.
    pub fn validate(&self) -> SamplingResult<()> {
        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(SamplingError::InvalidTemperature);
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(SamplingError::InvalidTopP);
            }
        }
        Ok(())
    }

    /// Sample a token index from logits using configured strategy.
    pub fn sample(&mut self, logits: &[f32]) -> SamplingResult<TokenId> {
        self.sample_with_history(logits, &[])
    }

    /// Sample with the row's history, which feeds the n-gram constraint.
    pub fn sample_with_history(
        &mut self,
        logits: &[f32],
        history: &[TokenId],
    ) -> SamplingResult<TokenId> {
        if logits.is_empty() {
            return Err(SamplingError::InvalidLogits);
        }
        self.validate()?;

        let mut work_logits = logits.to_vec();

        if let Some(ngram) = self.no_repeat_ngram {
            for token_id in ngram.banned_tokens(history) {
                if let Some(logit) = work_logits.get_mut(token_id as usize) {
                    *logit = f32::NEG_INFINITY;
                }
            }
        }

        // Shift so the best logit is 0 before scaling; a tiny temperature then
        // sends the rest towards -inf instead of overflowing to +inf.
        let max_logit = work_logits
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        if !max_logit.is_finite() {
            return Err(SamplingError::NoValidTokens);
        }
        for logit in &mut work_logits {
            *logit = (*logit - max_logit) / self.temperature;
        }

        if let Some(k) = self.top_k {
            Self::apply_top_k(&mut work_logits, k);
        }

        let probs = Self::softmax(&work_logits)?;

        let probs = match self.top_p {
            Some(p) if p < 1.0 => Self::apply_top_p(&probs, p),
            _ => probs,
        };

        self.sample_from_distribution(&probs)
    }

    fn apply_top_k(logits: &mut [f32], k: usize) {
        if k == 0 || k >= logits.len() {
            return;
        }

        let mut sorted: Vec<f32> = logits.to_vec();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let threshold = sorted[k - 1];
        for logit in logits.iter_mut() {
            if *logit < threshold {
                *logit = f32::NEG_INFINITY;
            }
        }
    }

    fn apply_top_p(probs: &[f32], p: f32) -> Vec<f32> {
        let mut indexed: Vec<(usize, f32)> =
            probs.iter().enumerate().map(|(i, &pr)| (i, pr)).collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut cumsum = 0.0;
        let mut cutoff_idx = 0;
        for (idx, (_, prob)) in indexed.iter().enumerate() {
            cumsum += prob;
            cutoff_idx = idx;
            if cumsum >= p {
                break;
            }
        }

        let cutoff_prob = indexed[cutoff_idx].1;
        let mut result = vec![0.0; probs.len()];
        for (i, &pr) in probs.iter().enumerate() {
            if pr >= cutoff_prob && pr > 0.0 {
                result[i] = pr;
            }
        }

        // Renormalize
        let sum: f32 = result.iter().sum();
        if sum > 0.0 {
            for p in &mut result {
                *p /= sum;
            }
        }

        result
    }

    fn softmax(logits: &[f32]) -> SamplingResult<Vec<f32>> {
        let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        if !max_logit.is_finite() {
            return Err(SamplingError::NoValidTokens);
        }
        let exps: Vec<f32> = logits.iter().map(|&l| (l - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();
        Ok(exps.iter().map(|&e| e / sum).collect())
    }

    fn sample_from_distribution(&mut self, probs: &[f32]) -> SamplingResult<TokenId> {
        let dist = WeightedIndex::new(probs).map_err(|_| SamplingError::NoValidTokens)?;
        Ok(dist.sample(&mut self.rng) as TokenId)
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_temperature_still_samples_close_logits() {
        // (1.0 - 1.0001) / 5e-4 = -0.2, so token 0 keeps p ~= 0.45.
        let logits = vec![1.0, 1.0001];
        let picks = (0..200u64)
            .filter(|&seed| {
                let mut sampler = Sampler::new().with_temperature(5e-4).with_seed(seed);
                sampler.sample(&logits).unwrap() == 0
            })
            .count();
        assert!((50..=130).contains(&picks), "token 0 picked {picks}/200 times");
    }

    #[test]
    fn tiny_temperature_does_not_overflow() {
        let mut sampler = Sampler::new().with_temperature(1e-39).with_seed(1);
        assert_eq!(sampler.sample(&[1.0, 2.0, 0.5]), Ok(1));
    }

    #[test]
    fn scaling_keeps_all_banned_an_error() {
        let mut sampler = Sampler::new().with_no_repeat_ngram(1).with_seed(3);
        assert_eq!(
            sampler.sample_with_history(&[1.0, 2.0], &[0, 1]),
            Err(SamplingError::NoValidTokens)
        );
    }

    #[test]
    fn softmax_uniform() {
        let logits = vec![1.0, 1.0, 1.0];
        let probs = Sampler::softmax(&logits).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs[0] - 1.0 / 3.0).abs() < 1e-5);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn softmax_all_masked_is_error() {
        let logits = vec![f32::NEG_INFINITY; 3];
        assert_eq!(Sampler::softmax(&logits), Err(SamplingError::NoValidTokens));
    }

    #[test]
    fn top_k_filtering() {
        let mut logits = vec![1.0, 10.0, 2.0, 0.5, 3.0];
        Sampler::apply_top_k(&mut logits, 2);
        assert!(logits[1].is_finite());
        assert!(logits[4].is_finite());
        assert!(!logits[0].is_finite());
    }

    #[test]
    fn top_p_filtering() {
        let probs = vec![0.5, 0.3, 0.15, 0.05];
        let filtered = Sampler::apply_top_p(&probs, 0.8);
        assert!(filtered[0] > 0.0);
        assert!(filtered[1] > 0.0);
        assert_eq!(filtered[2], 0.0);
        assert_eq!(filtered[3], 0.0);
    }

    #[test]
    fn bigram_ban_after_prefix() {
        // history "a b c a": the bigram (a, b) exists, so b is banned next.
        let ngram = NoRepeatNGram::new(2);
        assert_eq!(ngram.banned_tokens(&[0, 1, 2, 0]), vec![1]);
    }

    #[test]
    fn ngram_ban_needs_enough_history() {
        let ngram = NoRepeatNGram::new(3);
        assert!(ngram.banned_tokens(&[5]).is_empty());
        assert!(NoRepeatNGram::new(0).banned_tokens(&[1, 1, 1]).is_empty());
    }

    #[test]
    fn unigram_ban_covers_whole_history() {
        let ngram = NoRepeatNGram::new(1);
        assert_eq!(ngram.banned_tokens(&[4, 2, 4]), vec![2, 4]);
    }

    #[test]
    fn ngram_ban_steers_sampling() {
        // Token 1 dominates but would repeat the bigram (0, 1).
        let logits = vec![0.0, 50.0, 1.0];
        let mut sampler = Sampler::new().with_no_repeat_ngram(2).with_seed(7);
        for _ in 0..20 {
            let token = sampler.sample_with_history(&logits, &[0, 1, 0]).unwrap();
            assert_ne!(token, 1);
        }
    }

    #[test]
    fn is_satisfied_by_detects_repeats() {
        let ngram = NoRepeatNGram::new(2);
        assert!(ngram.is_satisfied_by(&[1, 2, 3, 1, 3]));
        assert!(!ngram.is_satisfied_by(&[1, 2, 3, 1, 2]));
    }

    #[test]
    fn top_k_zero_disables() {
        let sampler = Sampler::new().with_top_k(0);
        assert_eq!(sampler.top_k, None);
    }

    #[test]
    fn invalid_top_p() {
        let logits = vec![1.0, 2.0];
        for p in [0.0, -0.5, 1.5, f32::NAN] {
            let mut sampler = Sampler::new().with_top_p(p);
            assert_eq!(sampler.sample(&logits), Err(SamplingError::InvalidTopP));
        }
    }

    #[test]
    fn invalid_temperature() {
        let logits = vec![1.0, 2.0];
        let mut sampler = Sampler::new().with_temperature(0.0);
        assert_eq!(
            sampler.sample(&logits),
            Err(SamplingError::InvalidTemperature)
        );
    }

    #[test]
    fn empty_logits() {
        let mut sampler = Sampler::new();
        assert_eq!(sampler.sample(&[]), Err(SamplingError::InvalidLogits));
    }
}
