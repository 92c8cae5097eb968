//! Cancellable, deadline-bearing request context
//!
//! Every network-facing operation takes a [`RequestContext`]. An expired
//! deadline or a fired cancellation token aborts the in-flight call and
//! surfaces a transient error to the caller.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-request cancellation and deadline
#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    request_id: String,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RequestContext {
    /// Context with no deadline that is never cancelled by itself
    pub fn background() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            request_id: String::new(),
        }
    }

    /// Context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Self::background()
        }
    }

    /// Tag log records with a caller-supplied request id
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Derive a child context sharing cancellation, with a tighter deadline
    pub fn child(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
            request_id: self.request_id.clone(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every child derived from it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time left before the deadline, if any
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Drive `fut` to completion unless the context is cancelled or expires
    pub async fn run<T, F>(&self, operation: &str, target: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(self.cancelled_error(operation, target));
        }

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled_error(operation, target)),
            _ = expired => Err(Error::Timeout {
                operation: operation.to_string(),
                target: target.to_string(),
            }),
            result = fut => result,
        }
    }

    fn cancelled_error(&self, operation: &str, target: &str) -> Error {
        Error::Cancelled {
            operation: operation.to_string(),
            target: target.to_string(),
        }
    }
}
