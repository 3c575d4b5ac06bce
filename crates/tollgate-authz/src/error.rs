//! Error types for the authorization crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Broad classification of an [`AuthzError`].
///
/// Every variant maps to exactly one kind; callers use it to pick a log level
/// or a metric label without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The running configuration cannot form a correct request.
    Configuration,
    /// A body field declared by a rule could not be extracted.
    Extraction,
    /// The PDP could not be reached or did not answer in time.
    Transport,
    /// The PDP answered, but not with a usable 2xx JSON body.
    Protocol,
}

impl ErrorKind {
    /// Stable lowercase label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Extraction => "extraction",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
        }
    }
}

/// Errors that can occur during authorization.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthzError {
    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration from {path}: {message}")]
    ConfigLoad {
        /// Path to the file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A client authentication method other than `client_secret_basic`.
    #[error("unsupported client auth method: {0}")]
    UnsupportedClientAuth(String),

    /// More than one rule matched with the same top specificity.
    #[error("ambiguous rules for {path}: {} share the highest specificity", .patterns.join(", "))]
    AmbiguousRule {
        /// Request path being matched.
        path: String,
        /// Raw patterns that tied.
        patterns: Vec<String>,
    },

    /// The inbound request could not be decomposed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A rule body field could not be extracted from the request body.
    #[error("failed to extract field {field:?} from path {path:?}: {source}")]
    Extraction {
        /// Name of the field in the decision request body.
        field: String,
        /// JSON path configured for the field.
        path: String,
        /// Underlying extraction failure.
        #[source]
        source: ExtractError,
    },

    /// The PDP could not be reached.
    #[error("PDP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The PDP answered with a non-2xx status.
    #[error("{reason}: status {status}")]
    UnexpectedStatus {
        /// HTTP status returned by the PDP.
        status: u16,
        /// Fixed diagnostic reason for this endpoint.
        reason: &'static str,
    },

    /// The PDP response body was not the expected JSON.
    #[error("failed to decode PDP response: {0}")]
    Decode(String),

    /// The PDP response body exceeded the accepted size.
    #[error("PDP response exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Accepted size in bytes.
        limit: usize,
    },
}

impl AuthzError {
    /// Create a configuration load error.
    pub fn config_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap an extraction failure with the field and path it belongs to.
    pub fn extraction(
        field: impl Into<String>,
        path: impl Into<String>,
        source: ExtractError,
    ) -> Self {
        Self::Extraction {
            field: field.into(),
            path: path.into(),
            source,
        }
    }

    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::ConfigLoad { .. }
            | Self::UnsupportedClientAuth(_)
            | Self::AmbiguousRule { .. } => ErrorKind::Configuration,
            Self::InvalidRequest(_) | Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Transport(_) => ErrorKind::Transport,
            Self::UnexpectedStatus { .. } | Self::Decode(_) | Self::ResponseTooLarge { .. } => {
                ErrorKind::Protocol
            }
        }
    }

    /// Fixed diagnostic reason carried by the error, if any.
    ///
    /// Only a non-2xx PDP answer has one; for everything else the reason half
    /// of the `(allow, reason, error)` triple is empty.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::UnexpectedStatus { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Failure of a single JSON-path extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// A segment named a key the object does not have.
    #[error("path {path:?}: field {field:?} not found in object")]
    MissingField {
        /// Full JSON path.
        path: String,
        /// Missing segment.
        field: String,
    },

    /// A segment tried to step into a value of the wrong type.
    #[error("path {path:?}: expected {expected} at {step:?}")]
    TypeMismatch {
        /// Full JSON path.
        path: String,
        /// Segment (or element index) where traversal stopped.
        step: String,
        /// What was required at that step.
        expected: &'static str,
    },

    /// The path itself is not valid extraction syntax.
    #[error("malformed path {path:?}: {reason}")]
    MalformedPath {
        /// Full JSON path.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}
