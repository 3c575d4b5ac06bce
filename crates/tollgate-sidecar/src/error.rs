//! Error types for the Tollgate sidecar.

use std::fmt;

use thiserror::Error;
use tollgate_authz::AuthzError;

/// Message returned to the client when authorization failed without a reason.
pub const AUTHORIZATION_ERROR: &str = "authorization error";

/// Sidecar-specific errors.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// The caller identity header is missing or unreadable.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Error message.
        message: String,
    },

    /// The request body exceeds the configured limit.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The inbound request could not be read.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message.
        message: String,
    },

    /// The PDP denied the request.
    #[error("Authorization denied: {reason}")]
    AuthorizationDenied {
        /// Reason for denial.
        reason: String,
    },

    /// An authorization check failed.
    #[error("Authorization failed: {0}")]
    Authorization(#[from] AuthzError),

    /// Upstream connection error.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Error message.
        message: String,
    },

    /// Server startup error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SidecarError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unauthenticated error.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create an authorization denied error.
    pub fn authorization_denied(reason: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            reason: reason.into(),
        }
    }

    /// Create an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config { .. } => 500,
            Self::Unauthenticated { .. } => 401,
            Self::PayloadTooLarge { .. } => 413,
            Self::BadRequest { .. } => 400,
            Self::AuthorizationDenied { .. } => 403,
            Self::Authorization(_) => 403,
            Self::Upstream { .. } => 502,
            Self::Server { .. } => 500,
            Self::Io(_) => 500,
        }
    }

    /// Get the error category for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::BadRequest { .. } => "bad_request",
            Self::AuthorizationDenied { .. } => "authorization",
            Self::Authorization(e) => e.kind().as_str(),
            Self::Upstream { .. } => "upstream",
            Self::Server { .. } => "server",
            Self::Io(_) => "io",
        }
    }

    /// Message safe to return to the client.
    ///
    /// Authorization failures only ever expose the fixed diagnostic reason of
    /// the failure, never its internals.
    pub fn client_message(&self) -> String {
        match self {
            Self::AuthorizationDenied { reason } => reason.clone(),
            Self::Authorization(e) => e.reason().unwrap_or(AUTHORIZATION_ERROR).to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type for sidecar operations.
pub type SidecarResult<T> = Result<T, SidecarError>;

/// JSON error body returned by the sidecar.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Error code/category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<&SidecarError> for ErrorResponse {
    fn from(err: &SidecarError) -> Self {
        Self::new(err.category(), err.client_message())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}
