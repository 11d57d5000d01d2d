//! Backend selection for gpt2-complete.
//!
//! Provides:
//! - [`Backend`]: the compute devices candle can target
//! - [`DevicePreference`]: what the user asked for (`auto` by default)
//! - [`BackendSelector`]: picks and opens the best available device at startup

use std::fmt;
use std::str::FromStr;

use candle_core::Device;

/// Compute backend for inference.
///
/// GPU variants only open when candle was built with the matching cargo
/// feature (`cuda`, `metal`) and a device is actually present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Cpu,
    Cuda,
    Metal,
}

impl Backend {
    /// Backends in preference order: accelerators first, CPU last.
    pub fn preference_order() -> &'static [Backend] {
        &[Backend::Cuda, Backend::Metal, Backend::Cpu]
    }

    /// Whether support for this backend was compiled into candle.
    pub fn is_compiled(self) -> bool {
        match self {
            Backend::Cpu => true,
            Backend::Cuda => candle_core::utils::cuda_is_available(),
            Backend::Metal => candle_core::utils::metal_is_available(),
        }
    }

    /// Open device `ordinal` of this backend.
    pub fn device(self, ordinal: usize) -> Result<Device, BackendError> {
        if !self.is_compiled() {
            return Err(BackendError::NotCompiled(self));
        }
        let device = match self {
            Backend::Cpu => Ok(Device::Cpu),
            Backend::Cuda => Device::new_cuda(ordinal),
            Backend::Metal => Device::new_metal(ordinal),
        };
        device.map_err(|e| BackendError::Unavailable {
            backend: self,
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cpu => write!(f, "cpu"),
            Backend::Cuda => write!(f, "cuda"),
            Backend::Metal => write!(f, "metal"),
        }
    }
}

/// Requested device: `auto` or a specific backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Only(Backend),
}

impl FromStr for DevicePreference {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Only(Backend::Cpu)),
            "cuda" | "gpu" => Ok(DevicePreference::Only(Backend::Cuda)),
            "metal" => Ok(DevicePreference::Only(Backend::Metal)),
            other => Err(BackendError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePreference::Auto => write!(f, "auto"),
            DevicePreference::Only(backend) => backend.fmt(f),
        }
    }
}

/// Errors from backend selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("unknown backend {0:?} (expected auto, cpu, cuda or metal)")]
    UnknownBackend(String),
    #[error("backend {0} not compiled (missing cargo feature)")]
    NotCompiled(Backend),
    #[error("backend {backend} unavailable: {reason}")]
    Unavailable { backend: Backend, reason: String },
}

/// Selects and opens the active inference device.
///
/// Use [`BackendSelector::auto`] for automatic best-backend detection,
/// or [`BackendSelector::with_preference`] to honour a user choice.
#[derive(Debug, Clone)]
pub struct BackendSelector {
    active: Backend,
    device: Device,
}

impl BackendSelector {
    /// Open the first backend in [`Backend::preference_order`] that works.
    ///
    /// CPU always succeeds, so this never fails.
    pub fn auto() -> Self {
        for &backend in Backend::preference_order() {
            match backend.device(0) {
                Ok(device) => {
                    tracing::debug!(%backend, "selected compute backend");
                    return Self {
                        active: backend,
                        device,
                    };
                }
                Err(BackendError::NotCompiled(_)) => {}
                Err(e) => tracing::warn!("skipping backend: {e}"),
            }
        }
        Self::cpu()
    }

    /// Resolve a preference. A specific backend that cannot open is an error.
    pub fn with_preference(preference: DevicePreference) -> Result<Self, BackendError> {
        match preference {
            DevicePreference::Auto => Ok(Self::auto()),
            DevicePreference::Only(backend) => Ok(Self {
                active: backend,
                device: backend.device(0)?,
            }),
        }
    }

    /// Plain CPU selection.
    pub fn cpu() -> Self {
        Self {
            active: Backend::Cpu,
            device: Device::Cpu,
        }
    }

    /// The currently active backend.
    pub fn active(&self) -> Backend {
        self.active
    }

    /// The opened candle device.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_is_always_compiled() {
        assert!(Backend::Cpu.is_compiled());
        assert!(Backend::Cpu.device(0).is_ok());
    }

    #[test]
    fn preference_order_ends_with_cpu() {
        assert_eq!(Backend::preference_order().last(), Some(&Backend::Cpu));
    }

    #[test]
    fn auto_selects_a_compiled_backend() {
        let selector = BackendSelector::auto();
        assert!(selector.active().is_compiled());
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    #[test]
    fn auto_falls_back_to_cpu_without_accelerators() {
        let selector = BackendSelector::auto();
        assert_eq!(selector.active(), Backend::Cpu);
        assert!(selector.device().is_cpu());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn forced_cuda_without_feature_errors() {
        let err = BackendSelector::with_preference(DevicePreference::Only(Backend::Cuda))
            .unwrap_err();
        assert_eq!(err, BackendError::NotCompiled(Backend::Cuda));
    }

    #[test]
    fn forced_cpu() {
        let selector =
            BackendSelector::with_preference(DevicePreference::Only(Backend::Cpu)).unwrap();
        assert_eq!(selector.active(), Backend::Cpu);
    }

    #[test]
    fn preference_parses() {
        assert_eq!("auto".parse(), Ok(DevicePreference::Auto));
        assert_eq!("CPU".parse(), Ok(DevicePreference::Only(Backend::Cpu)));
        assert_eq!("gpu".parse(), Ok(DevicePreference::Only(Backend::Cuda)));
        assert_eq!("metal".parse(), Ok(DevicePreference::Only(Backend::Metal)));
        assert!(matches!(
            "tpu".parse::<DevicePreference>(),
            Err(BackendError::UnknownBackend(_))
        ));
    }

    #[test]
    fn backend_display() {
        assert_eq!(format!("{}", Backend::Cpu), "cpu");
        assert_eq!(format!("{}", DevicePreference::Only(Backend::Cuda)), "cuda");
        assert_eq!(format!("{}", DevicePreference::Auto), "auto");
    }

    #[test]
    fn backend_error_display() {
        let err = BackendError::Unavailable {
            backend: Backend::Cuda,
            reason: "no device".to_string(),
        };
        assert_eq!(err.to_string(), "backend cuda unavailable: no device");
    }
}
