//! Backend configuration
//!
//! Loaded from a YAML file, defaulted field by field, then overridden by
//! CLI flags in the binary. The protocol choice is made here, once.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Wire protocol used to administer the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApiProtocol {
    /// Legacy XML RPC protocol
    Zapi,
    /// Resource-oriented JSON protocol
    Rest,
}

impl std::fmt::Display for ApiProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiProtocol::Zapi => write!(f, "zapi"),
            ApiProtocol::Rest => write!(f, "rest"),
        }
    }
}

impl std::str::FromStr for ApiProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "zapi" | "ontapi" => Ok(ApiProtocol::Zapi),
            "rest" => Ok(ApiProtocol::Rest),
            other => Err(Error::Configuration(format!(
                "unknown API protocol '{}', use 'zapi' or 'rest'",
                other
            ))),
        }
    }
}

/// Debug tracing switches
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DebugTraceFlags {
    /// Log every array request and response body at debug level
    pub api: bool,
    /// Log entry into every facade method
    pub method: bool,
}

/// Configuration for one array backend
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct OntapConfig {
    /// Cluster or SVM management LIF (host or host:port)
    pub management_lif: String,
    /// Data LIF used for NFS mounts; discovered when empty
    pub data_lif: String,
    /// Storage virtual machine name
    pub svm: String,
    /// Array username
    pub username: String,
    /// Array password
    #[serde(skip_serializing)]
    pub password: String,
    /// Administrative protocol
    pub api: ApiProtocol,
    /// Prefix prepended to every volume the orchestrator creates
    pub storage_prefix: String,
    /// Export policy attached to new volumes
    pub export_policy: String,
    /// Unix permissions for new volumes
    pub unix_permissions: String,
    /// Default volume size when a request carries none
    pub default_size: String,
    /// Aggregate for new volumes; first SVM aggregate when empty
    pub aggregate: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Records requested per page from paginated list calls
    pub max_records: u32,
    /// Initial REST job poll interval in milliseconds
    pub job_poll_interval_ms: u64,
    /// Upper bound on waiting for one REST job, in seconds
    pub job_timeout_secs: u64,
    /// Accept self-signed array certificates
    pub insecure_tls: bool,
    /// NFS mount options used when attaching volumes
    pub nfs_mount_options: String,
    /// Address the volume plugin listens on
    pub plugin_listen_addr: String,
    /// Host directory under which volumes are mounted
    pub volume_root: String,
    /// Debug trace switches
    pub debug_trace_flags: DebugTraceFlags,
}

impl Default for OntapConfig {
    fn default() -> Self {
        Self {
            management_lif: String::new(),
            data_lif: String::new(),
            svm: String::new(),
            username: "admin".to_string(),
            password: String::new(),
            api: ApiProtocol::Rest,
            storage_prefix: "trident_".to_string(),
            export_policy: "default".to_string(),
            unix_permissions: "---rwxrwxrwx".to_string(),
            default_size: "1Gi".to_string(),
            aggregate: String::new(),
            request_timeout_secs: 30,
            max_records: 100,
            job_poll_interval_ms: 500,
            job_timeout_secs: 120,
            insecure_tls: true,
            nfs_mount_options: "-o nfsvers=3".to_string(),
            plugin_listen_addr: "127.0.0.1:8765".to_string(),
            volume_root: "/var/lib/ontap-volume-plugin/mnt".to_string(),
            debug_trace_flags: DebugTraceFlags::default(),
        }
    }
}

impl OntapConfig {
    /// Load a configuration file, filling absent fields with defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&raw)
    }

    /// Parse a YAML document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: OntapConfig = serde_yaml::from_str(raw)?;
        Ok(config)
    }

    /// Reject configurations no backend could run with
    pub fn validate(&self) -> Result<()> {
        if self.management_lif.trim().is_empty() {
            return Err(Error::Configuration("managementLif is required".into()));
        }
        if self.svm.trim().is_empty() {
            return Err(Error::Configuration("svm is required".into()));
        }
        if self.max_records == 0 {
            return Err(Error::Configuration("maxRecords must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Configuration(
                "requestTimeoutSecs must be positive".into(),
            ));
        }
        if self.volume_root.trim().is_empty() {
            return Err(Error::Configuration("volumeRoot is required".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms.max(1))
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// JSON schema of the configuration file
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(OntapConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}
