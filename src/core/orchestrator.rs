//! Orchestrator boundary
//!
//! Frontends talk to an [`Orchestrator`]; [`BackendOrchestrator`] is the NAS
//! implementation over a single array backend. It owns the volume records a
//! frontend sees, translates frontend names into array names, and attaches
//! volumes to the host through a [`Mounter`].

use crate::api::{OntapApiRef, RequestContext, Snapshot, Volume};
use crate::config::OntapConfig;
use crate::core::capacity::parse_capacity;
use crate::core::mount::Mounter;
use crate::error::{Error, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Volume Records
// =============================================================================

/// What a frontend asks for when it creates or clones a volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConfig {
    /// Frontend-visible name
    pub name: String,
    /// Array name; filled in by the orchestrator
    #[serde(default)]
    pub internal_name: String,
    /// Requested size in bytes; zero selects the backend default
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub clone_source_volume: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub clone_source_snapshot: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub export_policy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unix_permissions: String,
    /// Expose the `.snapshot` directory to clients
    #[serde(default)]
    pub snapshot_directory: bool,
}

impl VolumeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_clone(&self) -> bool {
        !self.clone_source_volume.is_empty()
    }
}

/// A volume as reported back to frontends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeExternal {
    pub config: VolumeConfig,
    /// Backend that owns the volume
    pub backend: String,
    /// Aggregate the volume was placed on
    pub pool: String,
}

/// A snapshot as reported back to frontends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotExternal {
    pub name: String,
    pub volume: String,
    pub created: String,
}

impl SnapshotExternal {
    fn from_snapshot(volume: &str, snapshot: Snapshot) -> Self {
        Self {
            name: snapshot.name,
            volume: volume.to_string(),
            created: snapshot.create_time,
        }
    }
}

/// Comment stamped on every volume so its frontend name survives a restart
#[derive(Debug, Serialize, Deserialize)]
struct VolumeLabel {
    provisioning: ProvisioningLabel,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProvisioningLabel {
    name: String,
}

fn volume_label(name: &str) -> String {
    let label = VolumeLabel {
        provisioning: ProvisioningLabel { name: name.to_string() },
    };
    serde_json::to_string(&label).unwrap_or_default()
}

// =============================================================================
// Orchestrator Trait
// =============================================================================

/// Volume lifecycle as seen by a frontend
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn add_volume(&self, ctx: &RequestContext, config: VolumeConfig) -> Result<VolumeExternal>;

    /// Create `config.name` as a clone of `config.clone_source_volume`
    async fn clone_volume(&self, ctx: &RequestContext, config: VolumeConfig) -> Result<VolumeExternal>;

    async fn get_volume(&self, ctx: &RequestContext, name: &str) -> Result<VolumeExternal>;

    async fn list_volumes(&self, ctx: &RequestContext) -> Result<Vec<VolumeExternal>>;

    /// Rebuild the volume records from the array
    async fn reload_volumes(&self, ctx: &RequestContext) -> Result<()>;

    async fn delete_volume(&self, ctx: &RequestContext, name: &str) -> Result<()>;

    async fn attach_volume(
        &self,
        ctx: &RequestContext,
        name: &str,
        mountpoint: &Path,
        options: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn detach_volume(&self, ctx: &RequestContext, name: &str, mountpoint: &Path) -> Result<()>;

    async fn list_volume_snapshots(&self, ctx: &RequestContext, name: &str) -> Result<Vec<SnapshotExternal>>;
}

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// Provisioning defaults for [`BackendOrchestrator`]
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub backend_name: String,
    /// Prepended to frontend names to form array names
    pub storage_prefix: String,
    /// Address clients mount exports from
    pub data_lif: String,
    pub export_policy: String,
    pub unix_permissions: String,
    /// Size in bytes when a request names none
    pub default_size: u64,
    /// Aggregate to place volumes on; empty picks the SVM's first
    pub aggregate: String,
    pub nfs_mount_options: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend_name: "ontap-nas".to_string(),
            storage_prefix: "trident_".to_string(),
            data_lif: String::new(),
            export_policy: "default".to_string(),
            unix_permissions: "---rwxrwxrwx".to_string(),
            default_size: 1 << 30,
            aggregate: String::new(),
            nfs_mount_options: "-o nfsvers=3".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &OntapConfig) -> Result<Self> {
        let data_lif = if config.data_lif.is_empty() {
            config.management_lif.clone()
        } else {
            config.data_lif.clone()
        };
        Ok(Self {
            backend_name: format!("ontap-nas_{}", config.svm),
            storage_prefix: config.storage_prefix.clone(),
            data_lif,
            export_policy: config.export_policy.clone(),
            unix_permissions: config.unix_permissions.clone(),
            default_size: parse_capacity(&config.default_size)?,
            aggregate: config.aggregate.clone(),
            nfs_mount_options: config.nfs_mount_options.clone(),
        })
    }
}

// =============================================================================
// Backend Orchestrator
// =============================================================================

/// NAS orchestrator over one array backend
pub struct BackendOrchestrator {
    api: OntapApiRef,
    config: OrchestratorConfig,
    mounter: Arc<dyn Mounter>,
    /// Frontend name to record
    volumes: DashMap<String, VolumeExternal>,
    aggregate: RwLock<String>,
    bootstrap_error: RwLock<Option<String>>,
}

impl BackendOrchestrator {
    pub fn new(api: OntapApiRef, config: OrchestratorConfig, mounter: Arc<dyn Mounter>) -> Arc<Self> {
        let aggregate = RwLock::new(config.aggregate.clone());
        Arc::new(Self {
            api,
            config,
            mounter,
            volumes: DashMap::new(),
            aggregate,
            bootstrap_error: RwLock::new(None),
        })
    }

    /// Validate the backend, pick an aggregate and load existing volumes
    pub async fn bootstrap(&self, ctx: &RequestContext) -> Result<()> {
        info!(backend = %self.config.backend_name, protocol = %self.api.protocol(), "Bootstrapping orchestrator");

        self.api.validate_api_version(ctx).await?;

        let aggregates = self.api.svm_aggregate_names(ctx).await?;
        let configured = self.aggregate.read().clone();
        let aggregate = if configured.is_empty() {
            aggregates
                .first()
                .cloned()
                .ok_or_else(|| Error::Bootstrap("SVM has no aggregates assigned".into()))?
        } else if aggregates.contains(&configured) {
            configured
        } else {
            return Err(Error::Bootstrap(format!(
                "aggregate {} is not assigned to the SVM",
                configured
            )));
        };
        *self.aggregate.write() = aggregate.clone();

        self.load_volumes(ctx).await?;
        *self.bootstrap_error.write() = None;

        info!(
            backend = %self.config.backend_name,
            aggregate = %aggregate,
            volumes = self.volumes.len(),
            "Orchestrator bootstrapped"
        );
        Ok(())
    }

    /// [`bootstrap`](Self::bootstrap), retrying transient failures for up to `max_elapsed`
    pub async fn bootstrap_with_retry(&self, ctx: &RequestContext, max_elapsed: Duration) -> Result<()> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Some(max_elapsed),
            ..Default::default()
        };
        let mut attempts = 0u32;

        backoff::future::retry(policy, || {
            attempts += 1;
            let attempt = attempts;
            async move {
                self.bootstrap(ctx).await.map_err(|e| {
                    if e.is_transient() {
                        warn!(attempt, error = %e, "Bootstrap attempt failed, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }

    /// Refuse every later call with `err` as the reason
    pub fn set_bootstrap_error(&self, err: &Error) {
        warn!(error = %err, "Orchestrator entering bootstrap-failed mode");
        *self.bootstrap_error.write() = Some(err.to_string());
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrap_error.read().is_none()
    }

    fn check_bootstrap(&self) -> Result<()> {
        match self.bootstrap_error.read().as_ref() {
            Some(reason) => Err(Error::Bootstrap(format!(
                "backend {} failed to initialize: {}",
                self.config.backend_name, reason
            ))),
            None => Ok(()),
        }
    }

    /// Array name for a frontend name
    pub fn internal_name(&self, name: &str) -> String {
        let sanitized: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("{}{}", self.config.storage_prefix, sanitized)
    }

    fn external(&self, config: VolumeConfig) -> VolumeExternal {
        VolumeExternal {
            config,
            backend: self.config.backend_name.clone(),
            pool: self.aggregate.read().clone(),
        }
    }

    fn lookup(&self, name: &str) -> Result<VolumeExternal> {
        self.volumes
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found("volume", name))
    }

    fn junction_path(internal_name: &str) -> String {
        format!("/{}", internal_name)
    }

    /// Fill in defaults and the array name
    fn prepare(&self, mut config: VolumeConfig) -> Result<VolumeConfig> {
        if config.name.is_empty() {
            return Err(Error::InvalidArgument("volume name is required".into()));
        }
        if self.volumes.contains_key(&config.name) {
            return Err(Error::ResourceExists {
                kind: "volume".into(),
                name: config.name,
            });
        }
        config.internal_name = self.internal_name(&config.name);
        if let Some(owner) = self
            .volumes
            .iter()
            .find(|entry| entry.value().config.internal_name == config.internal_name)
        {
            return Err(Error::conflict(
                "volume",
                config.name.as_str(),
                format!("array volume {} already belongs to {}", config.internal_name, owner.key()),
            ));
        }
        if config.size == 0 {
            config.size = self.config.default_size;
        }
        if config.export_policy.is_empty() {
            config.export_policy = self.config.export_policy.clone();
        }
        if config.unix_permissions.is_empty() {
            config.unix_permissions = self.config.unix_permissions.clone();
        }
        Ok(config)
    }

    /// Refuse an array name already taken by a volume this orchestrator has no record of
    async fn claim_internal_name(&self, ctx: &RequestContext, config: &VolumeConfig) -> Result<()> {
        let existing = match self.api.volume_info(ctx, &config.internal_name).await {
            Ok(volume) => volume,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        match self.record_from_volume(&existing) {
            Some(found) if found.name == config.name => Err(Error::ResourceExists {
                kind: "volume".into(),
                name: config.name.clone(),
            }),
            found => Err(Error::conflict(
                "volume",
                config.name.as_str(),
                format!(
                    "array volume {} already belongs to {}",
                    config.internal_name,
                    found.map(|f| f.name).unwrap_or_else(|| "another owner".to_string())
                ),
            )),
        }
    }

    fn record_from_volume(&self, volume: &Volume) -> Option<VolumeConfig> {
        let name = serde_json::from_str::<VolumeLabel>(&volume.comment)
            .map(|label| label.provisioning.name)
            .ok()
            .or_else(|| volume.name.strip_prefix(&self.config.storage_prefix).map(str::to_string))?;
        if name.is_empty() {
            return None;
        }
        Some(VolumeConfig {
            name,
            internal_name: volume.name.clone(),
            size: volume.size,
            export_policy: volume.export_policy.clone(),
            unix_permissions: volume.unix_permissions.clone(),
            snapshot_directory: volume.snapshot_directory_access,
            ..Default::default()
        })
    }

    async fn load_volumes(&self, ctx: &RequestContext) -> Result<()> {
        let volumes = self
            .api
            .volume_list_by_prefix(ctx, &self.config.storage_prefix)
            .await?;

        let records: Vec<VolumeConfig> = volumes
            .iter()
            .filter_map(|volume| self.record_from_volume(volume))
            .collect();

        self.volumes.clear();
        for config in records {
            let external = self.external(config);
            self.volumes.insert(external.config.name.clone(), external);
        }

        debug!(count = self.volumes.len(), "Reloaded volumes from array");
        Ok(())
    }
}

#[async_trait]
impl Orchestrator for BackendOrchestrator {
    async fn add_volume(&self, ctx: &RequestContext, config: VolumeConfig) -> Result<VolumeExternal> {
        self.check_bootstrap()?;
        let config = self.prepare(config)?;
        self.claim_internal_name(ctx, &config).await?;

        let volume = Volume {
            aggregates: vec![self.aggregate.read().clone()],
            comment: volume_label(&config.name),
            export_policy: config.export_policy.clone(),
            unix_permissions: config.unix_permissions.clone(),
            security_style: "unix".to_string(),
            snapshot_directory_access: config.snapshot_directory,
            junction_path: Self::junction_path(&config.internal_name),
            ..Volume::new(&config.internal_name, config.size)
        };

        info!(name = %config.name, internal_name = %config.internal_name, size = config.size, "Creating volume");
        self.api.volume_create(ctx, &volume).await?;

        let external = self.external(config);
        self.volumes.insert(external.config.name.clone(), external.clone());
        Ok(external)
    }

    async fn clone_volume(&self, ctx: &RequestContext, config: VolumeConfig) -> Result<VolumeExternal> {
        self.check_bootstrap()?;
        let source = self.lookup(&config.clone_source_volume)?;
        let mut config = self.prepare(config)?;
        self.claim_internal_name(ctx, &config).await?;
        config.size = source.config.size;

        let source_name = &source.config.internal_name;
        if config.clone_source_snapshot.is_empty() {
            let snapshot = chrono::Utc::now().format("snap_%Y%m%dT%H%M%SZ").to_string();
            self.api.volume_snapshot_create(ctx, &snapshot, source_name).await?;
            config.clone_source_snapshot = snapshot;
        }

        info!(
            name = %config.name,
            source = %source_name,
            snapshot = %config.clone_source_snapshot,
            "Cloning volume"
        );
        self.api
            .volume_clone_create(ctx, &config.internal_name, source_name, &config.clone_source_snapshot, false)
            .await?;
        self.api
            .volume_set_comment(ctx, &config.internal_name, &volume_label(&config.name))
            .await?;
        self.api
            .volume_mount(ctx, &config.internal_name, &Self::junction_path(&config.internal_name))
            .await?;

        let external = self.external(config);
        self.volumes.insert(external.config.name.clone(), external.clone());
        Ok(external)
    }

    async fn get_volume(&self, _ctx: &RequestContext, name: &str) -> Result<VolumeExternal> {
        self.check_bootstrap()?;
        self.lookup(name)
    }

    async fn list_volumes(&self, _ctx: &RequestContext) -> Result<Vec<VolumeExternal>> {
        self.check_bootstrap()?;
        let mut volumes: Vec<VolumeExternal> = self.volumes.iter().map(|e| e.value().clone()).collect();
        volumes.sort_by(|a, b| a.config.name.cmp(&b.config.name));
        Ok(volumes)
    }

    async fn reload_volumes(&self, ctx: &RequestContext) -> Result<()> {
        self.check_bootstrap()?;
        self.load_volumes(ctx).await
    }

    async fn delete_volume(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        self.check_bootstrap()?;
        let volume = self.lookup(name)?;

        info!(name, internal_name = %volume.config.internal_name, "Deleting volume");
        self.api.volume_destroy(ctx, &volume.config.internal_name, true).await?;
        self.volumes.remove(name);
        Ok(())
    }

    async fn attach_volume(
        &self,
        ctx: &RequestContext,
        name: &str,
        mountpoint: &Path,
        options: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.check_bootstrap()?;
        let volume = self.lookup(name)?;
        let internal_name = &volume.config.internal_name;
        let junction = Self::junction_path(internal_name);

        let current = self.api.volume_info(ctx, internal_name).await?;
        if current.junction_path != junction {
            debug!(internal_name = %internal_name, junction = %junction, "Mounting volume junction");
            self.api.volume_mount(ctx, internal_name, &junction).await?;
        }

        let mount_options = options
            .get("mountOptions")
            .map(String::as_str)
            .unwrap_or(&self.config.nfs_mount_options);
        let export = format!("{}:{}", self.config.data_lif, junction);
        self.mounter.mount_nfs(&export, mountpoint, mount_options).await
    }

    async fn detach_volume(&self, _ctx: &RequestContext, name: &str, mountpoint: &Path) -> Result<()> {
        self.check_bootstrap()?;
        self.lookup(name)?;
        self.mounter.unmount(mountpoint).await
    }

    async fn list_volume_snapshots(&self, ctx: &RequestContext, name: &str) -> Result<Vec<SnapshotExternal>> {
        self.check_bootstrap()?;
        let volume = self.lookup(name)?;
        let snapshots = self
            .api
            .volume_snapshot_list(ctx, &volume.config.internal_name)
            .await?;
        Ok(snapshots
            .into_iter()
            .map(|snapshot| SnapshotExternal::from_snapshot(name, snapshot))
            .collect())
    }
}
