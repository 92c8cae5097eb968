//! Facade call boundary
//!
//! Every public backend method runs its body through [`Facade::call`], which
//! enforces the request context, records call metrics and keeps one
//! top-level guard so that a fault while handling a response becomes an
//! [`Error::Internal`] instead of unwinding into the caller.

use crate::api::context::RequestContext;
use crate::config::ApiProtocol;
use crate::error::{Error, ErrorKind, Result};
use crate::metrics;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Per-backend call guard
#[derive(Debug, Clone)]
pub struct Facade {
    protocol: ApiProtocol,
    trace_methods: bool,
}

impl Facade {
    pub fn new(protocol: ApiProtocol, trace_methods: bool) -> Self {
        Self {
            protocol,
            trace_methods,
        }
    }

    pub fn protocol(&self) -> ApiProtocol {
        self.protocol
    }

    /// Run one contract operation
    pub async fn call<T, F>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        target: &str,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        if self.trace_methods {
            debug!(
                operation,
                target,
                request_id = ctx.request_id(),
                protocol = %self.protocol,
                ">>>> {}",
                operation
            );
        }

        let start = Instant::now();
        let guarded = async {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(self.caught_fault(operation, target, payload)),
            }
        };
        let result = ctx.run(operation, target, guarded).await;
        let elapsed = start.elapsed();

        metrics::record_call(operation, &self.protocol.to_string(), elapsed);

        if let Err(e @ (Error::Timeout { .. } | Error::Cancelled { .. })) = &result {
            metrics::record_error(operation, ErrorKind::Transient);
            warn!(operation, target, request_id = ctx.request_id(), "Array call aborted: {}", e);
        }

        debug!(
            operation,
            target,
            elapsed_ms = elapsed.as_millis() as u64,
            ok = result.is_ok(),
            "<<<< {}",
            operation
        );

        result
    }

    fn caught_fault(&self, operation: &str, target: &str, payload: Box<dyn Any + Send>) -> Error {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown fault".to_string()
        };

        metrics::record_panic();
        metrics::record_error(operation, ErrorKind::Internal);
        error!(
            operation,
            target,
            protocol = %self.protocol,
            "Fault while handling array call: {}",
            message
        );

        Error::internal(operation, message)
    }
}
