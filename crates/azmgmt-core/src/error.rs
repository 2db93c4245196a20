//! Unified error handling for azmgmt-core
//!
//! Every policy, the paged iterator and the long-running operation poller
//! report failures through [`Error`]. Non-2xx responses that no policy
//! recovers from surface as [`Error::Http`], carrying the status code and
//! the decoded [`CloudError`] when the body had one.
//!
//! # Example
//!
//! ```rust
//! use azmgmt_core::{CloudError, Error};
//!
//! let err = Error::Http {
//!     status: 404,
//!     error: Some(CloudError::new("ResourceGroupNotFound", "Resource group 'rg1' could not be found.")),
//!     body: String::new(),
//! };
//! assert!(err.is_not_found());
//! assert_eq!(err.cloud_error().map(|e| e.code.as_str()), Some("ResourceGroupNotFound"));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Structured platform error parsed from a non-2xx body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudError {
    /// Machine-readable code, e.g. `MissingSubscriptionRegistration`
    #[serde(default)]
    pub code: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Optional target of the error (often a namespace or property name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Nested errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<CloudError>,
}

#[derive(Deserialize)]
struct CloudErrorEnvelope {
    error: CloudError,
}

impl CloudError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            target: None,
            details: Vec::new(),
        }
    }

    /// Parse a CloudError from a response body.
    ///
    /// Accepts both the `{"error": {...}}` envelope and a bare
    /// `{"code": ..., "message": ...}` object. Returns `None` when the body
    /// is not JSON or carries neither a code nor a message.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        let parsed = serde_json::from_slice::<CloudErrorEnvelope>(body)
            .map(|envelope| envelope.error)
            .or_else(|_| serde_json::from_slice::<CloudError>(body))
            .ok()?;
        if parsed.code.is_empty() && parsed.message.is_empty() {
            None
        } else {
            Some(parsed)
        }
    }
}

impl std::fmt::Display for CloudError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Core error type for the management runtime
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A single attempt failed below HTTP (connect, TLS, read timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport failures persisted after the retry policy gave up
    #[error("Connectivity failure after {attempts} attempts: {message}")]
    Connectivity { attempts: u32, message: String },

    /// Non-2xx response that no policy recovered from
    #[error("HTTP {status}: {}", describe_cloud_error(.error, .body))]
    Http {
        status: u16,
        error: Option<CloudError>,
        body: String,
    },

    /// Platform throttling asked for a wait longer than the configured bound
    #[error("Throttled on scope '{scope}': requested wait of {requested:?} exceeds limit of {limit:?}")]
    ThrottleWaitExceeded {
        scope: String,
        requested: Duration,
        limit: Duration,
    },

    /// Provider registration call itself failed
    #[error("Failed to register provider '{namespace}': {message}")]
    RegistrationFailed { namespace: String, message: String },

    /// Provider never left the registering state
    #[error("Provider '{namespace}' did not finish registering after {polls} polls")]
    RegistrationTimeout { namespace: String, polls: u32 },

    /// Long-running operation reached the Failed state
    #[error("Operation failed: {}", describe_cloud_error(.error, "no error details"))]
    OperationFailed { error: Option<CloudError> },

    /// Long-running operation was canceled on the platform side
    #[error("Operation was canceled")]
    OperationCanceled { error: Option<CloudError> },

    /// Long-running operation did not finish within the configured bound
    #[error("Operation timed out after {0:?}")]
    PollTimeout(Duration),

    /// Local programming/contract violation: malformed response, regex miss
    #[error("Contract violation: {0}")]
    Contract(String),

    /// Credential acquisition failed
    #[error("Credential error: {0}")]
    Credential(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller cancelled a pending wait or traversal
    #[error("Cancelled")]
    Cancelled,

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn describe_cloud_error(error: &Option<CloudError>, fallback: &str) -> String {
    match error {
        Some(e) => e.to_string(),
        None => fallback.to_string(),
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status code, when the error came from a response
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The decoded platform error payload, if any
    #[must_use]
    pub fn cloud_error(&self) -> Option<&CloudError> {
        match self {
            Error::Http { error, .. }
            | Error::OperationFailed { error }
            | Error::OperationCanceled { error } => error.as_ref(),
            _ => None,
        }
    }

    /// Returns true if this is a "not found" error (404)
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns true if this is an authentication/authorization error (401/403)
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403)) || matches!(self, Error::Credential(_))
    }

    /// Returns true if this is a conflict/precondition error (409/412)
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self.status(), Some(409) | Some(412))
    }

    /// Returns true if the platform throttled the request (429)
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.status() == Some(429) || matches!(self, Error::ThrottleWaitExceeded { .. })
    }

    /// Returns true if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(s) if (500..600).contains(&s))
    }

    /// Returns true if this is a timeout of some kind
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::PollTimeout(_) | Error::RegistrationTimeout { .. }
        ) || self.status() == Some(408)
    }

    /// Returns true if this error is potentially retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Connectivity { .. } => true,
            Error::Http { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            Error::PollTimeout(_) | Error::RegistrationTimeout { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
