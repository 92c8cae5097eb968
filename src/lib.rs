//! ONTAP Control Plane - dual-protocol storage array backend
//!
//! One backend contract over two array protocols (ZAPI and REST), with a
//! Docker volume-plugin frontend on top.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                     Docker volume plugin (axum)                             │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                     Orchestrator boundary                                    │
//! │        volume records · name translation · host NFS mounts                  │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                     Backend abstraction facade                              │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │   Capability    │  │     Error       │  │      Resource managers      │  │
//! │  │   negotiator    │  │   classifier    │  │ volume · LUN · SnapMirror … │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────────┘  │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────────┐   │
//! │  │      ZAPI (XML over HTTPS)  │  │        REST (JSON over HTTPS)       │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`api`]: Backend contract, both protocol implementations, capabilities
//! - [`core`]: Orchestrator boundary and host mounts
//! - [`frontend`]: Docker volume-plugin protocol
//! - [`config`]: Backend configuration
//! - [`error`]: Error types and classification
//! - [`metrics`]: Prometheus metrics for array calls

pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod frontend;
pub mod metrics;

// Re-export commonly used types
pub use api::{
    BackendFactory, BackendOptions, CapabilityNegotiator, Feature, OntapApi, OntapApiRef, OntapVersion,
    RequestContext, RestBackend, ZapiBackend,
};

pub use config::{ApiProtocol, OntapConfig};

pub use crate::core::{
    BackendOrchestrator, Mounter, NfsMounter, Orchestrator, OrchestratorConfig, VolumeConfig, VolumeExternal,
};

pub use error::{Error, ErrorAction, ErrorKind, Result};

pub use frontend::DockerPlugin;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
