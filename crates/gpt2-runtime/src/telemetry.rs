//! Telemetry hooks for inference performance measurement.
//!
//! Provides:
//! - [`InferenceMetrics`]: TTFT, tokens/sec, and generation summary
//! - [`TelemetryHook`] trait: callback interface for real-time metric reporting
//! - [`InferenceTimer`]: records timestamps and computes metrics
//! - [`NoopTelemetry`] / [`LogTelemetry`] / [`TracingTelemetry`]: built-in hooks

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::backend::Backend;

/// Aggregate metrics from a generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceMetrics {
    /// Backend used for this run.
    pub backend: Backend,
    /// Time to first token in milliseconds (prompt processing latency).
    pub ttft_ms: f64,
    /// Tokens generated per second across all sequences, excluding the prompt pass.
    pub tokens_per_sec: f64,
    /// Number of prompt tokens per sequence.
    pub prompt_tokens: usize,
    /// Number of sequences decoded in the batch.
    pub sequences: usize,
    /// Tokens sampled across all sequences.
    pub generated_tokens: usize,
    /// Total wall-clock time in milliseconds.
    pub total_time_ms: f64,
}

/// Callback trait for real-time inference telemetry.
///
/// All methods have default no-op implementations so hooks can be selective.
pub trait TelemetryHook: Send + Sync {
    /// Called after the prompt pass. `ttft_ms` is time from start to first logits.
    fn on_prefill_complete(&self, _ttft_ms: f64) {}

    /// Called after each decode step. `generated` is the running token count.
    fn on_tokens_generated(&self, _generated: usize, _elapsed_ms: f64) {}

    /// Called when generation finishes with the full metrics summary.
    fn on_generation_complete(&self, _metrics: &InferenceMetrics) {}
}

/// No-op telemetry hook.
#[derive(Debug, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetryHook for NoopTelemetry {}

/// Collects the last metrics into a retrievable report.
#[derive(Debug, Clone, Default)]
pub struct LogTelemetry {
    last_report: Arc<Mutex<Option<InferenceMetrics>>>,
}

impl LogTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the last completed generation's metrics.
    pub fn last_metrics(&self) -> Option<InferenceMetrics> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TelemetryHook for LogTelemetry {
    fn on_generation_complete(&self, metrics: &InferenceMetrics) {
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(metrics.clone());
    }
}

/// Emits metrics as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetryHook for TracingTelemetry {
    fn on_prefill_complete(&self, ttft_ms: f64) {
        tracing::trace!(ttft_ms, "prompt processed");
    }

    fn on_generation_complete(&self, metrics: &InferenceMetrics) {
        tracing::debug!(
            backend = %metrics.backend,
            prompt_tokens = metrics.prompt_tokens,
            sequences = metrics.sequences,
            generated_tokens = metrics.generated_tokens,
            ttft_ms = metrics.ttft_ms,
            tokens_per_sec = metrics.tokens_per_sec,
            total_time_ms = metrics.total_time_ms,
            "generation complete"
        );
    }
}

/// Records timestamps during inference to compute [`InferenceMetrics`].
///
/// Usage:
/// 1. Call [`InferenceTimer::new`] at generation start
/// 2. Call [`InferenceTimer::mark_prefill_complete`] after the prompt pass
/// 3. Call [`InferenceTimer::mark_tokens`] after each decode step
/// 4. Call [`InferenceTimer::finish`] to compute final metrics
pub struct InferenceTimer<'a> {
    backend: Backend,
    prompt_tokens: usize,
    sequences: usize,
    start: Instant,
    prefill_end: Option<Instant>,
    token_count: usize,
    hook: &'a dyn TelemetryHook,
}

impl<'a> InferenceTimer<'a> {
    /// Start a new timer for a generation run.
    pub fn new(
        backend: Backend,
        prompt_tokens: usize,
        sequences: usize,
        hook: &'a dyn TelemetryHook,
    ) -> Self {
        Self {
            backend,
            prompt_tokens,
            sequences,
            start: Instant::now(),
            prefill_end: None,
            token_count: 0,
            hook,
        }
    }

    /// Mark prompt pass complete. Fires `on_prefill_complete`.
    pub fn mark_prefill_complete(&mut self) {
        let now = Instant::now();
        self.prefill_end = Some(now);
        let ttft_ms = now.duration_since(self.start).as_secs_f64() * 1000.0;
        self.hook.on_prefill_complete(ttft_ms);
    }

    /// Count `n` freshly sampled tokens. Fires `on_tokens_generated`.
    pub fn mark_tokens(&mut self, n: usize) {
        self.token_count += n;
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.hook.on_tokens_generated(self.token_count, elapsed_ms);
    }

    /// Finalize and return metrics. Fires `on_generation_complete`.
    pub fn finish(self) -> InferenceMetrics {
        let total_time_ms = self.start.elapsed().as_secs_f64() * 1000.0;

        let ttft_ms = self
            .prefill_end
            .map(|t| t.duration_since(self.start).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);

        let decode_time_ms = total_time_ms - ttft_ms;
        let tokens_per_sec = if decode_time_ms > 0.0 && self.token_count > 0 {
            self.token_count as f64 / (decode_time_ms / 1000.0)
        } else {
            0.0
        };

        let metrics = InferenceMetrics {
            backend: self.backend,
            ttft_ms,
            tokens_per_sec,
            prompt_tokens: self.prompt_tokens,
            sequences: self.sequences,
            generated_tokens: self.token_count,
            total_time_ms,
        };

        self.hook.on_generation_complete(&metrics);
        metrics
    }
}
