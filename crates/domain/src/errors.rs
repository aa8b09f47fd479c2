//! Error types used throughout the client stack

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::FieldError;

/// Categories of client errors for retry classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Failure before any HTTP response was received - retryable
    Network,
    /// 401 - terminal, triggers credential eviction
    Unauthorized,
    /// 429 - terminal, a policy signal rather than a transient fault
    RateLimited,
    /// Non-2xx status or envelope-level rejection - terminal
    Request,
    /// Response body did not match the envelope contract - terminal
    Protocol,
    /// Client construction or configuration problem
    Config,
    /// Pending work abandoned during teardown
    Cancelled,
}

/// Main error type for the Tillgrid client
///
/// `Clone` is required because the settlement of a coalesced write fans out
/// to every caller that joined the burst.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request failed: {message}")]
    RequestFailed {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("Malformed response envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ApiError {
    /// Build a `RequestFailed` without field errors
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed { message: message.into(), errors: Vec::new() }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) => ErrorCategory::Network,
            Self::Unauthorized(_) => ErrorCategory::Unauthorized,
            Self::RateLimited(_) => ErrorCategory::RateLimited,
            Self::RequestFailed { .. } => ErrorCategory::Request,
            Self::MalformedEnvelope(_) => ErrorCategory::Protocol,
            Self::Config(_) => ErrorCategory::Config,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether the transport may retry after this error.
    ///
    /// Only network-class failures qualify; any received HTTP response is an
    /// application decision and therefore terminal.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Network
    }

    /// Structured field errors carried by an envelope rejection, if any
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::RequestFailed { errors, .. } => errors,
            _ => &[],
        }
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;
