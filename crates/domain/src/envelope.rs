//! Standardized response envelope shared by every API endpoint
//!
//! Every response body is expected to conform to one wire shape:
//!
//! ```json
//! {
//!   "status": "success" | "error" | "warning",
//!   "message": "optional human-readable summary",
//!   "data": { },
//!   "errors": [{ "field": "price", "message": "must be positive" }],
//!   "meta": { "response_time": 42, "pagination": { } },
//!   "timestamp": "2026-08-06T12:00:00Z"
//! }
//! ```
//!
//! The normalizer ([`ResponseEnvelope::from_value`]) is the single place that
//! decides whether a body satisfies this contract. A body that does not is a
//! protocol failure, kept distinct from an application-level rejection so
//! callers can tell "the server spoke a different protocol" from "the server
//! rejected my request".

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ApiError;

/// Status discriminant carried by every response envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    /// Operation succeeded; `data` holds the payload
    Success,
    /// Operation rejected; `message` and `errors` describe why
    Error,
    /// Operation succeeded with caveats worth surfacing
    Warning,
}

/// A field-level validation failure reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Envelope metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Server-side processing time in milliseconds
    #[serde(rename = "response_time", skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Opaque pagination descriptor, passed through untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Value>,
}

/// Standardized response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: EnvelopeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
    pub timestamp: String,
}

impl ResponseEnvelope {
    /// Build a success envelope carrying `data`
    pub fn success(data: Value) -> Self {
        Self {
            status: EnvelopeStatus::Success,
            message: None,
            data: Some(data),
            errors: None,
            meta: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Build a minimal error envelope.
    ///
    /// Used by the transport when a non-2xx response carries a body that is
    /// not an envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            message: Some(message.into()),
            data: None,
            errors: None,
            meta: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Normalize a raw parsed body into an envelope.
    ///
    /// The `status` field is checked against the three enumerated values
    /// before full deserialization so the error names what was wrong rather
    /// than echoing a serde path.
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        let Some(object) = value.as_object() else {
            return Err(ApiError::MalformedEnvelope(
                "response body is not a JSON object".to_string(),
            ));
        };

        match object.get("status") {
            None => {
                return Err(ApiError::MalformedEnvelope(
                    "envelope is missing the status field".to_string(),
                ));
            }
            Some(status) => match status.as_str() {
                Some("success" | "error" | "warning") => {}
                Some(other) => {
                    return Err(ApiError::MalformedEnvelope(format!(
                        "unknown envelope status {other:?}"
                    )));
                }
                None => {
                    return Err(ApiError::MalformedEnvelope(
                        "envelope status is not a string".to_string(),
                    ));
                }
            },
        }

        serde_json::from_value(value).map_err(|err| {
            ApiError::MalformedEnvelope(format!("envelope does not match contract: {err}"))
        })
    }

    /// Envelope message, or `fallback` when the server sent none
    pub fn message_or(&self, fallback: &str) -> String {
        self.message.clone().unwrap_or_else(|| fallback.to_string())
    }

    /// Structured field errors, empty when absent
    pub fn field_errors(&self) -> Vec<FieldError> {
        self.errors.clone().unwrap_or_default()
    }
}
