//! Error types for the engine.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages.

use thiserror::Error;

/// Configuration errors detected before a session starts.
///
/// A session must not start partially configured: the first validation
/// failure aborts startup before any worker is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Vocabulary for '{context}' is empty")]
    EmptyVocabulary {
        context: String,
    },

    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidValue {
        field: String,
        value: f64,
        reason: String,
    },

    #[error("Duration field '{field}' must be positive")]
    ZeroDuration {
        field: String,
    },

    #[error("Missing stimulus credentials for role '{role}'")]
    MissingCredential {
        role: String,
    },

    #[error("Command '{name}' is invalid: {reason}")]
    InvalidCommand {
        name: String,
        reason: String,
    },

    #[error("Intensity band for '{kind}' is invalid: min {min} max {max}")]
    InvalidIntensityBand {
        kind: String,
        min: u8,
        max: u8,
    },

    #[error("Failed to compile vocabulary pattern: {message}")]
    PatternCompile {
        message: String,
    },

    #[error("Failed to parse configuration: {message}")]
    Parse {
        message: String,
    },
}

/// Stimulus delivery errors reported by the sink.
///
/// The engine never retries a failed delivery within the same trigger;
/// failures are logged and surfaced to the operator layer.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Stimulus rejected by device API (code {code}): {message}")]
    Rejected {
        code: u32,
        message: String,
    },

    #[error("Device API unreachable: {message}")]
    Unreachable {
        message: String,
    },

    #[error("Invalid stimulus command: {reason}")]
    InvalidCommand {
        reason: String,
    },
}

/// Top-level error type for the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Queue '{path}' is full (capacity: {capacity})")]
    QueueFull {
        path: String,
        capacity: usize,
    },
}

impl EngineError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a sink error.
    #[must_use]
    pub const fn is_sink(&self) -> bool {
        matches!(self, Self::Sink(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Sink errors are deliberately never retryable: re-sending a physical
    /// stimulus command without operator awareness is unsafe.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Sink(_) | Self::Disconnected { .. } => false,
            Self::Timeout { .. } | Self::QueueFull { .. } => true,
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_empty_vocabulary() {
        let err = ConfigError::EmptyVocabulary {
            context: "scold".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("scold"));
        assert!(msg.contains("empty"));
    }

    #[test]
    fn config_error_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "drain_rate".to_string(),
            value: -1.0,
            reason: "must be non-negative".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("drain_rate"));
        assert!(msg.contains("-1"));
    }

    #[test]
    fn sink_error_rejected() {
        let err = SinkError::Rejected {
            code: 403,
            message: "bad key".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("403"));
        assert!(msg.contains("bad key"));
    }

    #[test]
    fn engine_error_from_config() {
        let config_err = ConfigError::ZeroDuration {
            field: "timeout_ms".to_string(),
        };
        let err: EngineError = config_err.into();
        assert!(err.is_config());
        assert!(!err.is_retryable());
    }

    #[test]
    fn engine_error_from_sink_is_not_retryable() {
        let sink_err = SinkError::Unreachable {
            message: "connection refused".to_string(),
        };
        let err: EngineError = sink_err.into();
        assert!(err.is_sink());
        assert!(!err.is_retryable());
    }

    #[test]
    fn engine_error_timeout_is_retryable() {
        let err = EngineError::Timeout { duration_ms: 500 };
        assert!(err.is_retryable());
        let msg = format!("{err}");
        assert!(msg.contains("500ms"));
    }

    #[test]
    fn engine_error_queue_full() {
        let err = EngineError::QueueFull {
            path: "signals".to_string(),
            capacity: 64,
        };
        assert!(err.is_retryable());
        let msg = format!("{err}");
        assert!(msg.contains("signals"));
        assert!(msg.contains("64"));
    }
}
