//! Backend abstraction layer
//!
//! One contract ([`OntapApi`]), two implementations ([`ZapiBackend`] and
//! [`RestBackend`]) selected once by [`BackendFactory`]. Responses from both
//! are normalized into the records in [`types`], and every failure passes
//! through the [`classifier`] exactly once.
//!
//! ```text
//! orchestrator ─▶ facade ─▶ capability check ─▶ resource manager ─▶ transport ─▶ array
//!      ▲                                                                          │
//!      └──────────────────── classified error / value ◀──────────────────────────┘
//! ```

pub mod abstraction;
pub mod capability;
pub mod classifier;
pub mod context;
pub mod facade;
pub mod fault;
pub mod job;
pub mod pagination;
pub mod replication;
pub mod rest;
pub mod transport;
pub mod types;
pub mod version;
pub mod zapi;

#[cfg(test)]
mod conformance;
#[cfg(test)]
pub(crate) mod fake;

pub use abstraction::*;
pub use capability::{ArrayPersonality, Capabilities, CapabilityNegotiator, Feature, FeatureSet};
pub use context::RequestContext;
pub use rest::RestBackend;
pub use types::*;
pub use version::OntapVersion;
pub use zapi::ZapiBackend;

use crate::api::fault::FaultHook;
use crate::config::{ApiProtocol, OntapConfig};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// =============================================================================
// Backend Options
// =============================================================================

/// Tunables shared by both backends
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Records requested per page
    pub page_size: u32,
    /// First REST job poll delay; later polls back off
    pub job_poll_interval: Duration,
    /// Upper bound on waiting for one REST job
    pub job_timeout: Duration,
    /// Log entry and exit of every contract method
    pub trace_methods: bool,
    fault_hook: Option<Arc<dyn FaultHook>>,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            job_poll_interval: Duration::from_millis(500),
            job_timeout: Duration::from_secs(120),
            trace_methods: false,
            fault_hook: None,
        }
    }
}

impl BackendOptions {
    pub fn from_config(config: &OntapConfig) -> Self {
        Self {
            page_size: config.max_records.max(1),
            job_poll_interval: config.job_poll_interval(),
            job_timeout: config.job_timeout(),
            trace_methods: config.debug_trace_flags.method,
            fault_hook: None,
        }
    }

    /// Install a fault hook; unavailable in release builds
    #[cfg(any(test, feature = "test-backdoors"))]
    pub fn with_fault_hook(mut self, hook: Arc<dyn FaultHook>) -> Self {
        self.fault_hook = Some(hook);
        self
    }

    pub(crate) fn fault_hook(&self) -> Option<&dyn FaultHook> {
        self.fault_hook.as_deref()
    }
}

// =============================================================================
// Backend Factory
// =============================================================================

/// Builds the single backend a process talks to
pub struct BackendFactory;

impl BackendFactory {
    /// Bind to the protocol named in the configuration
    ///
    /// The returned backend is unvalidated; call
    /// [`ClusterApi::validate_api_version`] before relying on features.
    pub fn create(config: &OntapConfig) -> Result<OntapApiRef> {
        config.validate()?;
        let options = BackendOptions::from_config(config);

        info!(
            protocol = %config.api,
            management_lif = %config.management_lif,
            svm = %config.svm,
            "Creating array backend"
        );

        match config.api {
            ApiProtocol::Zapi => {
                let transport = zapi::HttpZapiTransport::new(config)?;
                Ok(Arc::new(ZapiBackend::new(Arc::new(transport), &config.svm, options)))
            }
            ApiProtocol::Rest => {
                let transport = rest::HttpRestTransport::new(config)?;
                Ok(Arc::new(RestBackend::new(Arc::new(transport), &config.svm, options)))
            }
        }
    }
}
