//! Value records returned and accepted by the backend contract
//!
//! These are plain data, fetched fresh on every call. Neither backend keeps
//! a copy between calls.

use crate::api::capability::Feature;
use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// Volumes
// =============================================================================

/// Layout of a volume on the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStyle {
    /// Single-aggregate volume
    #[default]
    FlexVol,
    /// Volume distributed over several aggregates and nodes
    FlexGroup,
}

impl std::fmt::Display for VolumeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeStyle::FlexVol => write!(f, "flexvol"),
            VolumeStyle::FlexGroup => write!(f, "flexgroup"),
        }
    }
}

impl VolumeStyle {
    /// Resource kind used in error messages and log records
    pub fn kind(&self) -> &'static str {
        match self {
            VolumeStyle::FlexVol => "volume",
            VolumeStyle::FlexGroup => "flexgroup",
        }
    }
}

/// QoS policy flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QosPolicyGroupKind {
    #[default]
    None,
    Fixed,
    Adaptive,
}

/// Named QoS policy group reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QosPolicyGroup {
    pub name: String,
    pub kind: QosPolicyGroupKind,
}

impl QosPolicyGroup {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fixed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: QosPolicyGroupKind::Fixed,
        }
    }

    pub fn adaptive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: QosPolicyGroupKind::Adaptive,
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == QosPolicyGroupKind::None || self.name.is_empty()
    }

    /// Capability a caller needs before applying this policy
    pub fn required_feature(&self) -> Option<Feature> {
        match self.kind {
            QosPolicyGroupKind::None => None,
            QosPolicyGroupKind::Fixed => Some(Feature::QosPolicyGroups),
            QosPolicyGroupKind::Adaptive => Some(Feature::AdaptiveQosPolicyGroups),
        }
    }
}

/// A FlexVol or FlexGroup volume
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Volume {
    /// Internal name, unique per SVM
    pub name: String,
    pub style: VolumeStyle,
    /// Aggregates the volume lives on; several for a FlexGroup
    pub aggregates: Vec<String>,
    /// Provisioned size in bytes
    pub size: u64,
    /// Used space in bytes, reported on reads only
    pub used: u64,
    pub comment: String,
    pub export_policy: String,
    pub unix_permissions: String,
    pub security_style: String,
    pub snapshot_policy: String,
    pub snapshot_reserve: Option<u32>,
    pub snapshot_directory_access: bool,
    pub space_reserve: String,
    pub junction_path: String,
    pub qos_policy_group: QosPolicyGroup,
    pub tiering_policy: String,
    pub encrypt: Option<bool>,
    /// `rw` for read-write, `dp` for replication destinations
    pub access_type: String,
}

impl Volume {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            access_type: "rw".to_string(),
            ..Default::default()
        }
    }

    /// Capabilities needed to create this volume as requested
    pub fn required_features(&self) -> Vec<Feature> {
        let mut features = Vec::new();
        if self.style == VolumeStyle::FlexGroup {
            features.push(Feature::FlexGroups);
        }
        if let Some(feature) = self.qos_policy_group.required_feature() {
            features.push(feature);
        }
        if !self.tiering_policy.is_empty() {
            features.push(match self.style {
                VolumeStyle::FlexVol => Feature::FabricPoolFlexVol,
                VolumeStyle::FlexGroup => Feature::FabricPoolFlexGroup,
            });
        }
        features
    }

    /// Reason an existing volume cannot satisfy a create request
    pub fn conflicts_with(&self, existing: &Volume) -> Option<String> {
        if self.style != existing.style {
            return Some(format!(
                "requested style {} but found {}",
                self.style, existing.style
            ));
        }
        if self.size != 0 && self.size != existing.size {
            return Some(format!(
                "requested size {} bytes but found {} bytes",
                self.size, existing.size
            ));
        }
        None
    }
}

/// Snapshot of a volume or flexgroup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    /// Source volume or flexgroup
    pub volume: String,
    /// Creation time as reported by the array
    pub create_time: String,
}

// =============================================================================
// LUNs
// =============================================================================

/// A LUN addressed by its path (`/vol/<volume>/<name>`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Lun {
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Opaque caller payload, usually a JSON attribute bag
    pub comment: String,
    pub os_type: String,
    pub qos_policy_group: QosPolicyGroup,
    pub space_reserved: Option<bool>,
    pub space_allocated: Option<bool>,
    pub serial_number: String,
    pub mapped: bool,
    pub online: bool,
}

impl Lun {
    pub fn new(path: impl Into<String>, size: u64, os_type: impl Into<String>) -> Self {
        Self {
            name: path.into(),
            size,
            os_type: os_type.into(),
            online: true,
            ..Default::default()
        }
    }

    /// Volume component of the LUN path
    pub fn volume_name(&self) -> Option<&str> {
        let mut parts = self.name.trim_start_matches('/').split('/');
        match (parts.next(), parts.next()) {
            (Some("vol"), Some(volume)) if !volume.is_empty() => Some(volume),
            _ => None,
        }
    }

    /// Reason an existing LUN cannot satisfy a create request
    pub fn conflicts_with(&self, existing: &Lun) -> Option<String> {
        if self.size != existing.size {
            return Some(format!(
                "requested size {} bytes but found {} bytes",
                self.size, existing.size
            ));
        }
        if !self.os_type.is_empty()
            && !existing.os_type.is_empty()
            && !self.os_type.eq_ignore_ascii_case(&existing.os_type)
        {
            return Some(format!(
                "requested os type {} but found {}",
                self.os_type, existing.os_type
            ));
        }
        None
    }
}

/// Attribute bag stored in a LUN comment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LunComment {
    #[serde(rename = "lunAttributes")]
    lun_attributes: IndexMap<String, String>,
}

/// Decode `{"lunAttributes": {...}}`, keeping key order
pub fn parse_lun_comment(comment: &str) -> Result<IndexMap<String, String>> {
    let parsed: LunComment = serde_json::from_str(comment)?;
    Ok(parsed.lun_attributes)
}

/// Encode an attribute bag the way [`parse_lun_comment`] reads it
pub fn format_lun_comment(attributes: &IndexMap<String, String>) -> Result<String> {
    Ok(serde_json::to_string(&LunComment {
        lun_attributes: attributes.clone(),
    })?)
}

/// Fold index-keyed export rules into the client-match view, keeping the
/// lowest index when several rules share a client match
pub fn by_client_match(rules: BTreeMap<u32, String>) -> BTreeMap<String, u32> {
    let mut view = BTreeMap::new();
    for (index, client_match) in rules {
        view.entry(client_match).or_insert(index);
    }
    view
}

// =============================================================================
// NAS Export Policies
// =============================================================================

/// One rule within an export policy; `index` is the match priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRule {
    pub index: u32,
    pub client_match: String,
}

// =============================================================================
// SAN
// =============================================================================

/// Initiator group
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Igroup {
    pub name: String,
    /// `iscsi`, `fcp` or `mixed`
    pub igroup_type: String,
    pub os_type: String,
    pub initiators: BTreeSet<String>,
}

impl Igroup {
    pub fn conflicts_with(&self, existing: &Igroup) -> Option<String> {
        if !self.igroup_type.eq_ignore_ascii_case(&existing.igroup_type) {
            return Some(format!(
                "requested type {} but found {}",
                self.igroup_type, existing.igroup_type
            ));
        }
        if !self.os_type.eq_ignore_ascii_case(&existing.os_type) {
            return Some(format!(
                "requested os type {} but found {}",
                self.os_type, existing.os_type
            ));
        }
        None
    }
}

/// Default iSCSI initiator security
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IscsiInitiatorAuth {
    pub svm: String,
    /// `none`, `deny` or `chap`
    pub auth_type: String,
    pub chap_user: String,
    #[serde(skip_serializing)]
    pub chap_passphrase: String,
    pub chap_outbound_user: String,
    #[serde(skip_serializing)]
    pub chap_outbound_passphrase: String,
}

// =============================================================================
// Cluster
// =============================================================================

/// Aggregate capacity as reported by the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateSpace {
    pub size: u64,
    pub used: u64,
    pub footprint: u64,
}

/// EMS autosupport event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmsEvent {
    pub driver_name: String,
    pub app_version: String,
    pub auto_support: bool,
    pub category: String,
    pub computer_name: String,
    pub event_description: String,
    pub event_id: u32,
    pub event_source: String,
    pub log_level: u32,
}

// =============================================================================
// SnapMirror
// =============================================================================

/// One side of a replication relationship
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapmirrorEndpoint {
    pub svm: String,
    pub volume: String,
}

impl SnapmirrorEndpoint {
    pub fn new(svm: impl Into<String>, volume: impl Into<String>) -> Self {
        Self {
            svm: svm.into(),
            volume: volume.into(),
        }
    }

    /// `svm:volume`
    pub fn path(&self) -> String {
        format!("{}:{}", self.svm, self.volume)
    }

    /// Parse `svm:volume`
    pub fn from_path(path: &str) -> Option<Self> {
        let (svm, volume) = path.split_once(':')?;
        Some(Self::new(svm, volume))
    }
}

impl std::fmt::Display for SnapmirrorEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.svm, self.volume)
    }
}

/// Mirror state of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapmirrorState {
    Uninitialized,
    Snapmirrored,
    BrokenOff,
    Paused,
    InSync,
    OutOfSync,
    Unknown,
}

impl SnapmirrorState {
    /// Accepts both `broken-off` and `broken_off` spellings
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "uninitialized" => Self::Uninitialized,
            "snapmirrored" => Self::Snapmirrored,
            "broken_off" => Self::BrokenOff,
            "paused" => Self::Paused,
            "in_sync" => Self::InSync,
            "out_of_sync" => Self::OutOfSync,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for SnapmirrorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Snapmirrored => "snapmirrored",
            Self::BrokenOff => "broken_off",
            Self::Paused => "paused",
            Self::InSync => "in_sync",
            Self::OutOfSync => "out_of_sync",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Transfer activity of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapmirrorStatus {
    Idle,
    Transferring,
    Quiescing,
    Quiesced,
    Aborting,
    Breaking,
    Finalizing,
    Unknown,
}

impl SnapmirrorStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "idle" | "success" | "aborted" | "failed" | "hard_aborted" => Self::Idle,
            "transferring" | "preparing" | "queued" => Self::Transferring,
            "quiescing" => Self::Quiescing,
            "quiesced" => Self::Quiesced,
            "aborting" => Self::Aborting,
            "breaking" => Self::Breaking,
            "finalizing" => Self::Finalizing,
            _ => Self::Unknown,
        }
    }

    pub fn is_transferring(&self) -> bool {
        matches!(
            self,
            Self::Transferring | Self::Finalizing | Self::Quiescing | Self::Aborting | Self::Breaking
        )
    }
}

/// Replication relationship between a source and a destination volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapmirrorRelationship {
    pub source: SnapmirrorEndpoint,
    pub destination: SnapmirrorEndpoint,
    pub policy: String,
    pub schedule: String,
    pub state: SnapmirrorState,
    pub status: SnapmirrorStatus,
    pub healthy: bool,
    pub unhealthy_reason: String,
}

/// Replication policy flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapmirrorPolicyType {
    Async,
    Sync,
    Unknown,
}

impl SnapmirrorPolicyType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "async" | "async_mirror" | "async-mirror" | "mirror_vault" | "mirror-vault" | "vault" => {
                Self::Async
            }
            "sync" | "sync_mirror" | "sync-mirror" | "strict_sync_mirror" | "strict-sync-mirror" => {
                Self::Sync
            }
            _ => Self::Unknown,
        }
    }
}

/// Replication policy with its retention rules (label → keep count)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapmirrorPolicy {
    pub name: String,
    pub policy_type: SnapmirrorPolicyType,
    pub copy_all_source_snapshots: bool,
    pub rules: BTreeMap<String, u32>,
}
