//! Frontends exposing the orchestrator to container runtimes

pub mod docker;

pub use docker::DockerPlugin;
