//! Error types for the card cache library.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::FlightAborted;

/// The main error type for all lookup operations.
///
/// Coalesced cache waiters all receive a copy of the same error, so the type
/// is `Clone`. Sources that are not `Clone` themselves are held behind an
/// [`Arc`].
#[derive(Error, Debug, Clone)]
pub enum LookupError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[source] Arc<reqwest_middleware::Error>),

    /// JSON deserialization error
    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),

    /// Scryfall API returned an error
    #[error("Scryfall API error: {0}")]
    Api(ApiError),

    /// Caller supplied an empty or otherwise unusable key
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The fetch this caller was coalesced onto never produced a result
    #[error(transparent)]
    FetchAborted(#[from] FlightAborted),
}

impl LookupError {
    /// Classify this error into the [`ErrorKind`] taxonomy used by metrics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LookupError::Http(_) => ErrorKind::Network,
            LookupError::Json(_) => ErrorKind::Malformed,
            LookupError::Api(api) => api.kind(),
            LookupError::Validation(_) => ErrorKind::Validation,
            LookupError::FetchAborted(_) => ErrorKind::Unknown,
        }
    }

    /// Check if the remote API reported that nothing matched.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<reqwest_middleware::Error> for LookupError {
    fn from(err: reqwest_middleware::Error) -> Self {
        LookupError::Http(Arc::new(err))
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        LookupError::Http(Arc::new(reqwest_middleware::Error::Reqwest(err)))
    }
}

impl From<serde_json::Error> for LookupError {
    fn from(err: serde_json::Error) -> Self {
        LookupError::Json(Arc::new(err))
    }
}

/// Error taxonomy used for metrics and user-facing rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Key has no corresponding remote value
    NotFound,
    /// Remote signaled throttling
    RateLimited,
    /// Response could not be decoded
    Malformed,
    /// Transport failure (connection, timeout)
    Network,
    /// Empty or invalid key supplied by the caller
    Validation,
    /// Uncategorized remote failure
    Unknown,
}

impl ErrorKind {
    /// Map an HTTP error status onto the taxonomy.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => ErrorKind::NotFound,
            429 => ErrorKind::RateLimited,
            _ => ErrorKind::Unknown,
        }
    }

    /// Stable name used as the key in `errors_by_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::Malformed => "Malformed",
            ErrorKind::Network => "Network",
            ErrorKind::Validation => "Validation",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error object returned by Scryfall in the response body.
///
/// Scryfall answers failed requests with a JSON document of the form
/// `{"object":"error","code":"not_found","status":404,"details":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Always `"error"` for Scryfall error objects
    #[serde(default)]
    pub object: String,
    /// Machine-readable error code (e.g., "not_found")
    #[serde(default)]
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Human-readable explanation
    #[serde(default)]
    pub details: String,
    /// Optional sub-type (e.g., "ambiguous")
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Non-fatal warnings attached to the error
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (status: {})", self.details, self.status)
    }
}

impl ApiError {
    /// Create a new API error from status and details.
    pub fn new(status: u16, details: impl Into<String>) -> Self {
        Self {
            object: "error".to_string(),
            code: String::new(),
            status,
            details: details.into(),
            error_type: None,
            warnings: Vec::new(),
        }
    }

    /// Build an error for a response whose body was not a Scryfall error object.
    pub fn from_status(status: u16) -> Self {
        Self::new(status, format!("HTTP error {}", status))
    }

    /// Classify by HTTP status.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_status(self.status)
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limit(&self) -> bool {
        self.status == 429
    }

    /// Check if the query matched several cards and was rejected as ambiguous.
    pub fn is_ambiguous(&self) -> bool {
        self.error_type.as_deref() == Some("ambiguous")
    }
}
