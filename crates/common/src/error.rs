//! Error types shared across tremor crates.

use std::path::PathBuf;

/// Top-level error type for tremor operations.
#[derive(Debug, thiserror::Error)]
pub enum TremorError {
    #[error("Video error: {message}")]
    Video { message: String },

    #[error("Tracking error: {message}")]
    Tracking { message: String },

    #[error("Signal processing error: {message}")]
    Signal { message: String },

    #[error("Classifier error: {message}")]
    Classifier { message: String },

    #[error("Model error: {message}")]
    Model { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Job error: {message}")]
    Job { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Time limit exceeded: {message}")]
    TimeLimit { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using TremorError.
pub type TremorResult<T> = Result<T, TremorError>;

impl TremorError {
    pub fn video(msg: impl Into<String>) -> Self {
        Self::Video {
            message: msg.into(),
        }
    }

    pub fn tracking(msg: impl Into<String>) -> Self {
        Self::Tracking {
            message: msg.into(),
        }
    }

    pub fn signal(msg: impl Into<String>) -> Self {
        Self::Signal {
            message: msg.into(),
        }
    }

    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier {
            message: msg.into(),
        }
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model {
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn job(msg: impl Into<String>) -> Self {
        Self::Job {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn time_limit(msg: impl Into<String>) -> Self {
        Self::TimeLimit {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether another attempt at the same job could plausibly succeed.
    ///
    /// Missing or malformed input, bad configuration, and exhausted time
    /// limits fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Config { .. }
                | Self::InvalidInput { .. }
                | Self::TimeLimit { .. }
                | Self::FileNotFound { .. }
                | Self::Unsupported { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(TremorError::storage("link failed").is_retryable());
        assert!(TremorError::signal("filter unstable").is_retryable());
        assert!(TremorError::from(std::io::Error::other("pipe closed")).is_retryable());
    }

    #[test]
    fn test_input_errors_are_fatal() {
        let missing = TremorError::FileNotFound {
            path: PathBuf::from("/nope.mp4"),
        };
        assert!(!missing.is_retryable());
        assert!(!TremorError::invalid_input("band above nyquist").is_retryable());
        assert!(!TremorError::time_limit("soft limit").is_retryable());
    }

    #[test]
    fn test_display_carries_message() {
        let err = TremorError::classifier("feature set mismatch");
        assert_eq!(err.to_string(), "Classifier error: feature set mismatch");
    }
}
