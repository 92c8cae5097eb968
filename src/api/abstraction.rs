//! Backend contract
//!
//! One trait per resource family, combined into [`OntapApi`]. Both the ZAPI
//! and the REST backend implement every family, so the orchestrator only
//! ever holds an `Arc<dyn OntapApi>` and never learns which protocol is in
//! use.
//!
//! ```text
//!                ┌──────────────────────┐
//!                │   <<trait>> OntapApi │
//!                └──────────┬───────────┘
//!              implements   │   implements
//!          ┌────────────────┴────────────────┐
//!   ┌──────┴──────┐                    ┌──────┴──────┐
//!   │ ZapiBackend │                    │ RestBackend │
//!   └──────┬──────┘                    └──────┬──────┘
//!          │ ZapiTransport                    │ RestTransport
//! ```
//!
//! Every network-facing method takes a [`RequestContext`] and returns a
//! classified [`Error`](crate::error::Error). Create calls succeed when a
//! compatible resource already exists; destroy calls succeed when the
//! resource is already gone.

use crate::api::capability::Feature;
use crate::api::context::RequestContext;
use crate::api::types::*;
use crate::config::ApiProtocol;
use crate::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// Cluster
// =============================================================================

/// Version negotiation and cluster-wide queries
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Protocol this backend speaks, fixed at construction
    fn protocol(&self) -> ApiProtocol;

    /// Pure lookup against the negotiated feature set
    fn supports_feature(&self, feature: Feature) -> bool;

    /// Tiering policy to apply to new volumes
    fn tiering_policy_value(&self) -> String;

    /// Negotiated version string, queried once if not validated yet
    async fn api_version(&self, ctx: &RequestContext) -> Result<String>;

    /// One round trip that (re)derives the feature set
    async fn validate_api_version(&self, ctx: &RequestContext) -> Result<()>;

    async fn ems_autosupport_log(&self, ctx: &RequestContext, event: &EmsEvent) -> Result<()>;

    async fn svm_aggregate_names(&self, ctx: &RequestContext) -> Result<Vec<String>>;

    /// Aggregate name to media type
    async fn svm_aggregate_attributes(&self, ctx: &RequestContext) -> Result<BTreeMap<String, String>>;

    async fn svm_aggregate_space(&self, ctx: &RequestContext, aggregate: &str) -> Result<Vec<AggregateSpace>>;

    async fn node_list_serial_numbers(&self, ctx: &RequestContext) -> Result<Vec<String>>;

    async fn peered_vservers(&self, ctx: &RequestContext) -> Result<Vec<String>>;

    async fn is_svm_dr_capable(&self, ctx: &RequestContext) -> Result<bool>;

    async fn job_schedule_exists(&self, ctx: &RequestContext, name: &str) -> Result<bool>;
}

// =============================================================================
// Volumes
// =============================================================================

/// FlexVol lifecycle
#[async_trait]
pub trait VolumeApi: Send + Sync {
    async fn volume_create(&self, ctx: &RequestContext, volume: &Volume) -> Result<()>;
    async fn volume_exists(&self, ctx: &RequestContext, name: &str) -> Result<bool>;
    async fn volume_info(&self, ctx: &RequestContext, name: &str) -> Result<Volume>;
    async fn volume_list_by_prefix(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<Volume>>;
    /// Names of clones whose parent is `snapshot` on `source`
    async fn volume_list_by_snapshot_parent(
        &self,
        ctx: &RequestContext,
        snapshot: &str,
        source: &str,
    ) -> Result<Vec<String>>;
    async fn volume_destroy(&self, ctx: &RequestContext, name: &str, force: bool) -> Result<()>;
    async fn volume_mount(&self, ctx: &RequestContext, name: &str, junction_path: &str) -> Result<()>;
    async fn volume_unmount(&self, ctx: &RequestContext, name: &str, force: bool) -> Result<()>;
    async fn volume_rename(&self, ctx: &RequestContext, name: &str, new_name: &str) -> Result<()>;
    async fn volume_set_comment(&self, ctx: &RequestContext, name: &str, comment: &str) -> Result<()>;
    async fn volume_modify_unix_permissions(
        &self,
        ctx: &RequestContext,
        name: &str,
        unix_permissions: &str,
    ) -> Result<()>;
    async fn volume_modify_export_policy(&self, ctx: &RequestContext, name: &str, policy: &str) -> Result<()>;
    async fn volume_disable_snapshot_directory_access(&self, ctx: &RequestContext, name: &str) -> Result<()>;
    async fn volume_set_qos_policy_group_name(
        &self,
        ctx: &RequestContext,
        name: &str,
        qos: &QosPolicyGroup,
    ) -> Result<()>;
    /// Set the provisioned size in bytes
    async fn volume_set_size(&self, ctx: &RequestContext, name: &str, size: u64) -> Result<()>;
    /// Provisioned size in bytes
    async fn volume_size(&self, ctx: &RequestContext, name: &str) -> Result<u64>;
    /// Used size in bytes
    async fn volume_used_size(&self, ctx: &RequestContext, name: &str) -> Result<u64>;
    async fn volume_clone_create(
        &self,
        ctx: &RequestContext,
        clone: &str,
        source: &str,
        snapshot: &str,
        async_clone: bool,
    ) -> Result<()>;
    async fn volume_clone_split_start(&self, ctx: &RequestContext, clone: &str) -> Result<()>;
    /// `rw`, `dp` or `ls`
    async fn volume_get_type(&self, ctx: &RequestContext, name: &str) -> Result<String>;
}

/// FlexGroup lifecycle; every call needs [`Feature::FlexGroups`]
#[async_trait]
pub trait FlexgroupApi: Send + Sync {
    async fn flexgroup_create(&self, ctx: &RequestContext, volume: &Volume) -> Result<()>;
    async fn flexgroup_exists(&self, ctx: &RequestContext, name: &str) -> Result<bool>;
    async fn flexgroup_info(&self, ctx: &RequestContext, name: &str) -> Result<Volume>;
    async fn flexgroup_list_by_prefix(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<Volume>>;
    async fn flexgroup_list_by_snapshot_parent(
        &self,
        ctx: &RequestContext,
        snapshot: &str,
        source: &str,
    ) -> Result<Vec<String>>;
    async fn flexgroup_destroy(&self, ctx: &RequestContext, name: &str, force: bool) -> Result<()>;
    async fn flexgroup_mount(&self, ctx: &RequestContext, name: &str, junction_path: &str) -> Result<()>;
    async fn flexgroup_unmount(&self, ctx: &RequestContext, name: &str, force: bool) -> Result<()>;
    async fn flexgroup_rename(&self, ctx: &RequestContext, name: &str, new_name: &str) -> Result<()>;
    async fn flexgroup_set_comment(&self, ctx: &RequestContext, name: &str, comment: &str) -> Result<()>;
    async fn flexgroup_modify_unix_permissions(
        &self,
        ctx: &RequestContext,
        name: &str,
        unix_permissions: &str,
    ) -> Result<()>;
    async fn flexgroup_modify_export_policy(&self, ctx: &RequestContext, name: &str, policy: &str) -> Result<()>;
    async fn flexgroup_disable_snapshot_directory_access(&self, ctx: &RequestContext, name: &str) -> Result<()>;
    async fn flexgroup_set_qos_policy_group_name(
        &self,
        ctx: &RequestContext,
        name: &str,
        qos: &QosPolicyGroup,
    ) -> Result<()>;
    async fn flexgroup_set_size(&self, ctx: &RequestContext, name: &str, size: u64) -> Result<()>;
    async fn flexgroup_size(&self, ctx: &RequestContext, name: &str) -> Result<u64>;
    async fn flexgroup_used_size(&self, ctx: &RequestContext, name: &str) -> Result<u64>;
    /// Needs [`Feature::FlexGroupClone`]
    async fn flexgroup_clone_create(
        &self,
        ctx: &RequestContext,
        clone: &str,
        source: &str,
        snapshot: &str,
    ) -> Result<()>;
    /// Needs [`Feature::FlexGroupClone`]
    async fn flexgroup_clone_split_start(&self, ctx: &RequestContext, clone: &str) -> Result<()>;
    async fn flexgroup_get_type(&self, ctx: &RequestContext, name: &str) -> Result<String>;
}

// =============================================================================
// Snapshots
// =============================================================================

#[async_trait]
pub trait SnapshotApi: Send + Sync {
    async fn volume_snapshot_create(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()>;
    async fn volume_snapshot_list(&self, ctx: &RequestContext, volume: &str) -> Result<Vec<Snapshot>>;
    async fn volume_snapshot_delete(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()>;
    async fn flexgroup_snapshot_create(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()>;
    async fn flexgroup_snapshot_list(&self, ctx: &RequestContext, volume: &str) -> Result<Vec<Snapshot>>;
    async fn flexgroup_snapshot_delete(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()>;
    async fn snapshot_restore_volume(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()>;
    async fn snapshot_restore_flexgroup(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()>;
}

// =============================================================================
// LUNs
// =============================================================================

#[async_trait]
pub trait LunApi: Send + Sync {
    async fn lun_create(&self, ctx: &RequestContext, lun: &Lun) -> Result<()>;
    async fn lun_destroy(&self, ctx: &RequestContext, path: &str) -> Result<()>;
    /// LUNs whose path matches a glob pattern
    async fn lun_list(&self, ctx: &RequestContext, pattern: &str) -> Result<Vec<Lun>>;
    async fn lun_get_by_name(&self, ctx: &RequestContext, path: &str) -> Result<Lun>;
    async fn lun_exists(&self, ctx: &RequestContext, path: &str) -> Result<bool>;
    /// Stored comment and whether the LUN exists
    async fn lun_get_comment(&self, ctx: &RequestContext, path: &str) -> Result<(String, bool)>;
    /// Set a named attribute to `fstype`, plus the `context` attribute when non-empty
    async fn lun_set_attribute(
        &self,
        ctx: &RequestContext,
        path: &str,
        attribute: &str,
        fstype: &str,
        context: &str,
    ) -> Result<()>;
    /// Decode a `{"lunAttributes": {...}}` comment, keeping key order
    fn parse_lun_comment(&self, comment: &str) -> Result<IndexMap<String, String>>;
    async fn lun_set_qos_policy_group(&self, ctx: &RequestContext, path: &str, qos: &QosPolicyGroup) -> Result<()>;
    async fn lun_rename(&self, ctx: &RequestContext, path: &str, new_path: &str) -> Result<()>;
    async fn lun_size(&self, ctx: &RequestContext, path: &str) -> Result<u64>;
    /// Resize, returning the size the array actually applied
    async fn lun_set_size(&self, ctx: &RequestContext, path: &str, size: u64) -> Result<u64>;
    /// LUN id within the igroup, or -1 when not mapped
    async fn lun_map_info(&self, ctx: &RequestContext, igroup: &str, path: &str) -> Result<i32>;
    /// Map the LUN unless already mapped, returning its LUN id
    ///
    /// With `import_not_managed` an existing mapping to another igroup is
    /// left in place.
    async fn ensure_lun_mapped(
        &self,
        ctx: &RequestContext,
        igroup: &str,
        path: &str,
        import_not_managed: bool,
    ) -> Result<i32>;
    async fn lun_unmap(&self, ctx: &RequestContext, igroup: &str, path: &str) -> Result<()>;
    async fn lun_map_get_reporting_nodes(&self, ctx: &RequestContext, igroup: &str, path: &str) -> Result<Vec<String>>;
}

// =============================================================================
// Export Policies
// =============================================================================

#[async_trait]
pub trait ExportPolicyApi: Send + Sync {
    async fn export_policy_create(&self, ctx: &RequestContext, policy: &str) -> Result<()>;
    async fn export_policy_destroy(&self, ctx: &RequestContext, policy: &str) -> Result<()>;
    async fn export_policy_exists(&self, ctx: &RequestContext, policy: &str) -> Result<bool>;
    async fn export_rule_create(&self, ctx: &RequestContext, policy: &str, client_match: &str) -> Result<()>;
    /// Delete the rule at `index` only if it still carries `expected_client_match`
    async fn export_rule_destroy(
        &self,
        ctx: &RequestContext,
        policy: &str,
        index: u32,
        expected_client_match: &str,
    ) -> Result<()>;
    /// Client match to rule index
    async fn export_rule_list(&self, ctx: &RequestContext, policy: &str) -> Result<BTreeMap<String, u32>>;
}

// =============================================================================
// Initiator Groups
// =============================================================================

#[async_trait]
pub trait IgroupApi: Send + Sync {
    async fn igroup_create(&self, ctx: &RequestContext, name: &str, igroup_type: &str, os_type: &str) -> Result<()>;
    async fn igroup_destroy(&self, ctx: &RequestContext, name: &str) -> Result<()>;
    async fn ensure_igroup_added(&self, ctx: &RequestContext, name: &str, initiator: &str) -> Result<()>;
    async fn igroup_remove(&self, ctx: &RequestContext, name: &str, initiator: &str, force: bool) -> Result<()>;
    /// Member initiators
    async fn igroup_get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<BTreeSet<String>>;
}

// =============================================================================
// Network Interfaces
// =============================================================================

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn iscsi_initiator_get_default_auth(&self, ctx: &RequestContext) -> Result<IscsiInitiatorAuth>;
    async fn iscsi_initiator_set_default_auth(&self, ctx: &RequestContext, auth: &IscsiInitiatorAuth) -> Result<()>;
    /// iSCSI target portals as `address:port`
    async fn iscsi_interface_get(&self, ctx: &RequestContext, svm: &str) -> Result<Vec<String>>;
    /// FC target WWPNs
    async fn fcp_interface_get(&self, ctx: &RequestContext, svm: &str) -> Result<Vec<String>>;
    async fn iscsi_node_get_name(&self, ctx: &RequestContext) -> Result<String>;
    /// Operational data LIF addresses serving `protocol`
    async fn net_interface_get_data_lifs(&self, ctx: &RequestContext, protocol: &str) -> Result<Vec<String>>;
    /// SVM name and every data LIF address it reports
    async fn reported_data_lifs(&self, ctx: &RequestContext) -> Result<(String, Vec<String>)>;
}

// =============================================================================
// SnapMirror
// =============================================================================

/// Replication lifecycle; every call needs [`Feature::VolumeReplication`]
///
/// Transitions read the relationship first and refuse, without contacting
/// the array again, when the current state does not allow them.
#[async_trait]
pub trait SnapmirrorApi: Send + Sync {
    async fn snapmirror_get(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<SnapmirrorRelationship>;
    async fn snapmirror_create(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
        policy: &str,
        schedule: &str,
    ) -> Result<()>;
    async fn snapmirror_initialize(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()>;
    async fn snapmirror_resync(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()>;
    async fn snapmirror_quiesce(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()>;
    async fn snapmirror_abort(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()>;
    async fn snapmirror_break(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()>;
    async fn snapmirror_delete(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()>;
    /// Remove whatever relationship targets `destination`
    async fn snapmirror_delete_via_destination(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
    ) -> Result<()>;
    /// Release source-side relationship information
    async fn snapmirror_release(&self, ctx: &RequestContext, source: &SnapmirrorEndpoint) -> Result<()>;
    async fn snapmirror_policy_exists(&self, ctx: &RequestContext, name: &str) -> Result<bool>;
    async fn snapmirror_policy_get(&self, ctx: &RequestContext, name: &str) -> Result<SnapmirrorPolicy>;
}

// =============================================================================
// Combined Contract
// =============================================================================

/// The full backend contract
pub trait OntapApi:
    ClusterApi
    + VolumeApi
    + FlexgroupApi
    + SnapshotApi
    + LunApi
    + ExportPolicyApi
    + IgroupApi
    + NetworkApi
    + SnapmirrorApi
{
}

impl<T> OntapApi for T where
    T: ClusterApi
        + VolumeApi
        + FlexgroupApi
        + SnapshotApi
        + LunApi
        + ExportPolicyApi
        + IgroupApi
        + NetworkApi
        + SnapmirrorApi
{
}

/// Shared handle to a backend
pub type OntapApiRef = Arc<dyn OntapApi>;
