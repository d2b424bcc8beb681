//! Error handling for Resona
//!
//! Control-path operations return typed errors; range violations on audio
//! parameters never error and clamp silently instead (failing on the
//! audio-control path is worse than clamping).

use thiserror::Error;

/// Result type alias for Resona operations
pub type Result<T> = std::result::Result<T, DspError>;

/// Main error type for Resona operations
#[derive(Error, Debug)]
pub enum DspError {
    /// The audio backend could not be brought up. Fatal for this engine
    /// instance: it stays uninitialized permanently.
    #[error("Engine initialization failed: {reason}")]
    EngineInit { reason: String },

    /// A chain descriptor was structurally invalid (missing section, wrong
    /// band count, non-finite value). The previously active chain is
    /// retained unchanged.
    #[error("Invalid processing chain: {reason}")]
    InvalidChain { reason: String },

    /// No preset or equalizer curve registered under the given name.
    #[error("Preset not found: {name}")]
    PresetNotFound { name: String },

    /// Preset names must contain at least one non-whitespace character.
    #[error("Preset name cannot be empty")]
    InvalidName,

    /// A backend failure during a control-thread operation. Emitted as an
    /// error event and returned to the immediate caller; never crashes the
    /// rendering path.
    #[error("Audio backend error: {reason}")]
    Backend { reason: String },

    /// JSON boundary errors (transport / settings collaborator).
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DspError {
    /// Get the stable error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            DspError::EngineInit { .. } => "ENGINE_INIT",
            DspError::InvalidChain { .. } => "INVALID_CHAIN",
            DspError::PresetNotFound { .. } => "PRESET_NOT_FOUND",
            DspError::InvalidName => "INVALID_NAME",
            DspError::Backend { .. } => "BACKEND_ERROR",
            DspError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable for the engine instance
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DspError::EngineInit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = DspError::PresetNotFound {
            name: "Warm Tape".to_string(),
        };
        assert_eq!(err.error_code(), "PRESET_NOT_FOUND");

        let err = DspError::EngineInit {
            reason: "no output context".to_string(),
        };
        assert_eq!(err.error_code(), "ENGINE_INIT");
    }

    #[test]
    fn test_init_failure_is_fatal() {
        let err = DspError::EngineInit {
            reason: "backend unavailable".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(DspError::InvalidName.is_recoverable());
    }

    #[test]
    fn test_display_messages() {
        let err = DspError::InvalidChain {
            reason: "expected 10 bands, got 3".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid processing chain: expected 10 bands, got 3"
        );
    }
}
