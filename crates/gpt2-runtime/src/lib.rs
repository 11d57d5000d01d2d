//! # gpt2-runtime
//!
//! Runtime backend selection for gpt2-complete. Picks the best candle device
//! at startup (CUDA, then Metal, then CPU) and provides telemetry hooks
//! (TTFT, tok/s) around a generation call.

pub mod backend;
pub mod telemetry;

pub use backend::{Backend, BackendError, BackendSelector, DevicePreference};
pub use telemetry::{
    InferenceMetrics, InferenceTimer, LogTelemetry, NoopTelemetry, TelemetryHook, TracingTelemetry,
};
