//! Failures below the application layer, shared by both adapters

use thiserror::Error;

/// What went wrong while moving bytes to or from the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Tls,
    /// Body could not be decoded
    Malformed,
    /// HTTP status outside the protocol's success range
    Status(u16),
    Other,
}

/// Transport-level failure, classified by [`crate::api::classifier`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Malformed, message)
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Status(code), message)
    }

    /// HTTP status carried by this error, if any
    pub fn http_status(&self) -> Option<u16> {
        match self.kind {
            TransportErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_decode() || err.is_body() {
            TransportErrorKind::Malformed
        } else if let Some(status) = err.status() {
            TransportErrorKind::Status(status.as_u16())
        } else if err.to_string().to_ascii_lowercase().contains("certificate") {
            TransportErrorKind::Tls
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}
