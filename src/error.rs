//! Error types for the ONTAP control plane
//!
//! Every failure surfaced by the backend abstraction is one of these
//! variants, and every variant maps onto exactly one [`ErrorKind`].

use std::time::Duration;
use thiserror::Error;

/// Classification of an error as seen by a caller deciding what to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network, timeout or busy array; retry with backoff
    Transient,
    /// Bad request, unsupported capability, conflict or invalid transition
    Permanent,
    /// Resource is absent
    NotFound,
    /// No usable connection or state could be established at startup
    Bootstrap,
    /// Unexpected condition while handling an otherwise well-formed response
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Bootstrap => write!(f, "bootstrap"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Unified error type for the control plane
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Array Transport Errors
    // =========================================================================
    #[error("{operation} on '{target}': transport error: {reason}")]
    Transport {
        operation: String,
        target: String,
        reason: String,
    },

    #[error("{operation} on '{target}' timed out")]
    Timeout { operation: String, target: String },

    #[error("{operation} on '{target}' was cancelled")]
    Cancelled { operation: String, target: String },

    #[error("{operation} on '{target}': authentication with the array failed (status {status})")]
    Authentication {
        operation: String,
        target: String,
        status: String,
    },

    #[error("{operation} on '{target}': empty response from array")]
    EmptyResponse { operation: String, target: String },

    // =========================================================================
    // Array Application Errors
    // =========================================================================
    #[error("{operation} on '{target}' failed: {reason} (status {status}, code {code})")]
    Api {
        operation: String,
        target: String,
        status: String,
        code: String,
        reason: String,
        retryable: bool,
    },

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Resource conflict on {kind}/{name}: {reason}")]
    ResourceConflict {
        kind: String,
        name: String,
        reason: String,
    },

    // =========================================================================
    // Capability Errors
    // =========================================================================
    #[error("Feature not supported by this backend: {feature}")]
    UnsupportedFeature { feature: String },

    #[error("Unsupported array version {version}, minimum is {minimum}")]
    UnsupportedVersion { version: String, minimum: String },

    #[error("Array API version has not been validated")]
    NotValidated,

    #[error("Version parse error: {0}")]
    VersionParse(String),

    // =========================================================================
    // Replication Errors
    // =========================================================================
    #[error("SnapMirror {transition} not allowed for {relationship} in state {state}")]
    InvalidTransition {
        relationship: String,
        transition: String,
        state: String,
    },

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    #[error("Host mount of {mountpoint} failed: {reason}")]
    Mount { mountpoint: String, reason: String },

    #[error("Injected fault at {point} for '{name}'")]
    InjectedFault { point: String, name: String },

    // =========================================================================
    // Startup and Internal Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Bootstrap(String),

    #[error("Internal error in {operation}: {message}")]
    Internal { operation: String, message: String },

    // =========================================================================
    // Parse and IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RequeueWithBackoff,
    /// Retry after specific duration
    RequeueAfter(Duration),
    /// Don't retry without changing the request
    NoRequeue,
}

impl Error {
    /// The taxonomy kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } | Error::Timeout { .. } | Error::Cancelled { .. } => {
                ErrorKind::Transient
            }
            Error::Api { retryable: true, .. } => ErrorKind::Transient,
            Error::Mount { .. } => ErrorKind::Transient,

            Error::ResourceNotFound { .. } => ErrorKind::NotFound,

            Error::Bootstrap(_) => ErrorKind::Bootstrap,

            Error::Internal { .. } => ErrorKind::Internal,

            Error::Authentication { .. }
            | Error::EmptyResponse { .. }
            | Error::Api { .. }
            | Error::ResourceExists { .. }
            | Error::ResourceConflict { .. }
            | Error::UnsupportedFeature { .. }
            | Error::UnsupportedVersion { .. }
            | Error::NotValidated
            | Error::VersionParse(_)
            | Error::InvalidTransition { .. }
            | Error::InvalidArgument(_)
            | Error::CapacityParse(_)
            | Error::InjectedFault { .. }
            | Error::Configuration(_)
            | Error::JsonParse(_)
            | Error::YamlParse(_)
            | Error::Io(_) => ErrorKind::Permanent,
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Deadline expired; give the array a moment before trying again
            Error::Timeout { .. } => ErrorAction::RequeueAfter(Duration::from_secs(5)),
            _ => match self.kind() {
                ErrorKind::Transient => ErrorAction::RequeueWithBackoff,
                ErrorKind::NotFound => ErrorAction::RequeueAfter(Duration::from_secs(30)),
                ErrorKind::Permanent | ErrorKind::Bootstrap | ErrorKind::Internal => {
                    ErrorAction::NoRequeue
                }
            },
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Check if the array reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if the array reported the resource as already present
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::ResourceExists { .. })
    }

    /// Check if this is a startup error that should carry an operator hint
    pub fn is_bootstrap(&self) -> bool {
        matches!(self, Error::Bootstrap(_))
    }

    pub(crate) fn not_found(kind: &str, name: impl Into<String>) -> Self {
        Error::ResourceNotFound {
            kind: kind.to_string(),
            name: name.into(),
        }
    }

    pub(crate) fn conflict(kind: &str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ResourceConflict {
            kind: kind.to_string(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn internal(operation: &str, message: impl Into<String>) -> Self {
        Error::Internal {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for the control plane
pub type Result<T> = std::result::Result<T, Error>;
