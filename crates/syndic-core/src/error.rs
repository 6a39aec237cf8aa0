use serde::Serialize;
use thiserror::Error;

use crate::models::{BlockReason, Provider};

/// Application-wide error types for syndic.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Network-level failure (connect, reset, DNS).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Upstream answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// JSON did not parse, or did not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The observed platform put up a login wall or bot challenge.
    #[error("Session blocked: {0}")]
    Blocked(BlockReason),

    /// A provider was identified but no adapter is registered for it.
    #[error("No adapter registered for provider {0}")]
    UnsupportedProvider(Provider),

    /// A required identifier could not be derived.
    #[error("Missing identifier: {0}")]
    MissingIdentifier(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

/// Coarse error taxonomy recorded alongside failed candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    MalformedResponse,
    Blocked,
    Unsupported,
    Config,
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Transport(_) | AppError::Timeout(_) => true,
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Transport(_) | AppError::Timeout(_) | AppError::HttpStatus { .. } => {
                ErrorKind::Transport
            }
            AppError::MalformedResponse(_) | AppError::MissingIdentifier(_) => {
                ErrorKind::MalformedResponse
            }
            AppError::Blocked(_) => ErrorKind::Blocked,
            AppError::UnsupportedProvider(_) => ErrorKind::Unsupported,
            AppError::Config(_) | AppError::Generic(_) => ErrorKind::Config,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::Transport("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(
            AppError::HttpStatus {
                status: 503,
                url: "https://x".into()
            }
            .is_retryable()
        );
        assert!(
            AppError::HttpStatus {
                status: 429,
                url: "https://x".into()
            }
            .is_retryable()
        );
        assert!(
            !AppError::HttpStatus {
                status: 404,
                url: "https://x".into()
            }
            .is_retryable()
        );
        assert!(!AppError::MalformedResponse("bad json".into()).is_retryable());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(AppError::Timeout(5).kind(), ErrorKind::Transport);
        assert_eq!(
            AppError::MalformedResponse("x".into()).kind(),
            ErrorKind::MalformedResponse
        );
        assert_eq!(
            AppError::Blocked(BlockReason::AuthWall).kind(),
            ErrorKind::Blocked
        );
        assert_eq!(
            AppError::UnsupportedProvider(Provider::Taleo).kind(),
            ErrorKind::Unsupported
        );
    }

    #[test]
    fn test_serde_error_converts_to_malformed() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{nope")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }
}
