//! Orchestrator boundary between frontends and the array backend

pub mod capacity;
pub mod mount;
pub mod orchestrator;

pub use capacity::parse_capacity;
pub use mount::{Mounter, NfsMounter};
pub use orchestrator::{
    BackendOrchestrator, Orchestrator, OrchestratorConfig, SnapshotExternal, VolumeConfig, VolumeExternal,
};
