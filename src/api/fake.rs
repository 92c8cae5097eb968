//! In-memory array speaking both protocols
//!
//! [`FakeArray`] implements [`ZapiTransport`] and [`RestTransport`] over one
//! shared model, so the same scenario can be driven through either backend.
//! Every request is appended to a call log that tests inspect to prove a
//! call did, or did not, reach the array.

use crate::api::classifier::{rest_code, zapi_errno};
use crate::api::rest::{RestMethod, RestRequest, RestResponse, RestTransport};
use crate::api::transport::TransportError;
use crate::api::types::{SnapmirrorEndpoint, SnapmirrorState, VolumeStyle};
use crate::api::zapi::{ZapiElement, ZapiResponse, ZapiTransport};
use crate::api::{BackendOptions, RestBackend, ZapiBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const SVM: &str = "svm0";
pub(crate) const AGGREGATE: &str = "aggr1";

// =============================================================================
// Model
// =============================================================================

#[derive(Debug, Clone)]
struct FakeVolume {
    uuid: String,
    style: VolumeStyle,
    aggregates: Vec<String>,
    size: u64,
    comment: String,
    junction_path: String,
    export_policy: String,
    access_type: String,
    clone_parent: Option<(String, String)>,
    /// `(uuid, name)`
    snapshots: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct FakeLun {
    uuid: String,
    size: u64,
    os_type: String,
    comment: String,
    attributes: BTreeMap<String, String>,
    /// igroup name to LUN id
    maps: BTreeMap<String, i32>,
}

#[derive(Debug, Clone)]
struct FakeIgroup {
    uuid: String,
    protocol: String,
    os_type: String,
    initiators: BTreeSet<String>,
}

#[derive(Debug, Clone)]
struct FakePolicy {
    id: u64,
    /// rule index to client match
    rules: BTreeMap<u32, String>,
}

#[derive(Debug, Clone)]
struct FakeRelationship {
    uuid: String,
    source: SnapmirrorEndpoint,
    destination: SnapmirrorEndpoint,
    state: SnapmirrorState,
    transferring: bool,
    policy: String,
}

#[derive(Debug, Default)]
struct ArrayState {
    volumes: BTreeMap<String, FakeVolume>,
    luns: BTreeMap<String, FakeLun>,
    igroups: BTreeMap<String, FakeIgroup>,
    policies: BTreeMap<String, FakePolicy>,
    relationships: Vec<FakeRelationship>,
    next_id: u64,
}

impl ArrayState {
    fn next_uuid(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", kind, self.next_id)
    }

    fn volume_by_uuid(&mut self, uuid: &str) -> Option<&mut FakeVolume> {
        self.volumes.values_mut().find(|v| v.uuid == uuid)
    }

    fn lun_path_by_uuid(&self, uuid: &str) -> Option<String> {
        self.luns.iter().find(|(_, l)| l.uuid == uuid).map(|(p, _)| p.clone())
    }

    fn igroup_name_by_uuid(&self, uuid: &str) -> Option<String> {
        self.igroups.iter().find(|(_, g)| g.uuid == uuid).map(|(n, _)| n.clone())
    }

    fn policy_name_by_id(&self, id: &str) -> Option<String> {
        self.policies
            .iter()
            .find(|(_, p)| p.id.to_string() == id)
            .map(|(n, _)| n.clone())
    }

    fn relationship_by_uuid(&mut self, uuid: &str) -> Option<&mut FakeRelationship> {
        self.relationships.iter_mut().find(|r| r.uuid == uuid)
    }

    fn relationship(&mut self, destination: &str, source: Option<&str>) -> Option<&mut FakeRelationship> {
        self.relationships
            .iter_mut()
            .find(|r| r.destination.path() == destination && source.map_or(true, |s| r.source.path() == s))
    }

    fn next_lun_id(&self, igroup: &str) -> i32 {
        let used: BTreeSet<i32> = self
            .luns
            .values()
            .filter_map(|l| l.maps.get(igroup).copied())
            .collect();
        (0..).find(|id| !used.contains(id)).unwrap_or(0)
    }
}

fn matches(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    glob::Pattern::new(pattern).map_or(pattern == name, |p| p.matches(name))
}

// =============================================================================
// Fake Array
// =============================================================================

/// Simulated array shared by a ZAPI and a REST backend
pub(crate) struct FakeArray {
    state: Mutex<ArrayState>,
    calls: Mutex<Vec<String>>,
    zapi_version: (u32, u32),
    rest_version: (u32, u32, u32),
    san_optimized: bool,
    stuck_pagination: AtomicBool,
}

impl Default for FakeArray {
    fn default() -> Self {
        Self {
            state: Mutex::new(ArrayState::default()),
            calls: Mutex::new(Vec::new()),
            zapi_version: (1, 180),
            rest_version: (9, 12, 1),
            san_optimized: false,
            stuck_pagination: AtomicBool::new(false),
        }
    }
}

impl FakeArray {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Array reporting older versions
    pub fn with_versions(zapi: (u32, u32), rest: (u32, u32, u32)) -> Arc<Self> {
        Arc::new(Self {
            zapi_version: zapi,
            rest_version: rest,
            ..Self::default()
        })
    }

    pub fn san_optimized() -> Arc<Self> {
        Arc::new(Self {
            san_optimized: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Calls whose log entry contains `needle`
    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.contains(needle)).count()
    }

    /// Hand back the same continuation token on every page
    pub fn set_stuck_pagination(&self, stuck: bool) {
        self.stuck_pagination.store(stuck, Ordering::SeqCst);
    }

    pub fn add_volume(&self, name: &str, size: u64) {
        let mut state = self.state.lock();
        let uuid = state.next_uuid("vol");
        state.volumes.insert(
            name.to_string(),
            FakeVolume {
                uuid,
                style: VolumeStyle::FlexVol,
                aggregates: vec![AGGREGATE.to_string()],
                size,
                comment: String::new(),
                junction_path: String::new(),
                export_policy: "default".to_string(),
                access_type: "rw".to_string(),
                clone_parent: None,
                snapshots: Vec::new(),
            },
        );
    }

    pub fn add_relationship(&self, source: &SnapmirrorEndpoint, destination: &SnapmirrorEndpoint, state: SnapmirrorState) {
        let mut array = self.state.lock();
        let uuid = array.next_uuid("sm");
        array.relationships.push(FakeRelationship {
            uuid,
            source: source.clone(),
            destination: destination.clone(),
            state,
            transferring: false,
            policy: "MirrorAllSnapshots".to_string(),
        });
    }

    pub fn add_export_rule(&self, policy: &str, index: u32, client_match: &str) {
        let mut state = self.state.lock();
        let id = state.next_id + 1;
        state.next_id = id;
        state
            .policies
            .entry(policy.to_string())
            .or_insert(FakePolicy { id, rules: BTreeMap::new() })
            .rules
            .insert(index, client_match.to_string());
    }

    /// Rule indexes currently in `policy`
    pub fn export_rule_indexes(&self, policy: &str) -> Vec<u32> {
        self.state
            .lock()
            .policies
            .get(policy)
            .map(|p| p.rules.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.state.lock().volumes.contains_key(name)
    }

    pub fn has_lun(&self, path: &str) -> bool {
        self.state.lock().luns.contains_key(path)
    }

    pub fn relationship_state(&self, destination: &SnapmirrorEndpoint) -> Option<SnapmirrorState> {
        self.state
            .lock()
            .relationships
            .iter()
            .find(|r| &r.destination == destination)
            .map(|r| r.state)
    }

    fn log(&self, entry: String) {
        self.calls.lock().push(entry);
    }

    fn stuck(&self) -> bool {
        self.stuck_pagination.load(Ordering::SeqCst)
    }
}

/// Options that keep job polling fast in tests
pub(crate) fn test_options(page_size: u32) -> BackendOptions {
    BackendOptions {
        page_size,
        job_poll_interval: Duration::from_millis(1),
        job_timeout: Duration::from_secs(5),
        ..BackendOptions::default()
    }
}

pub(crate) fn zapi_backend(array: &Arc<FakeArray>, options: BackendOptions) -> ZapiBackend {
    ZapiBackend::new(array.clone(), SVM, options)
}

pub(crate) fn rest_backend(array: &Arc<FakeArray>, options: BackendOptions) -> RestBackend {
    RestBackend::new(array.clone(), SVM, options)
}

// =============================================================================
// ZAPI
// =============================================================================

fn zapi_fail(errno: &str, reason: &str) -> ZapiResponse {
    ZapiResponse::failed(errno, reason)
}

fn zapi_ok(results: ZapiElement) -> ZapiResponse {
    ZapiResponse::passed(results)
}

fn zapi_empty() -> ZapiResponse {
    zapi_ok(ZapiElement::new("results"))
}

fn query_text<'a>(request: &'a ZapiElement, path: &[&str]) -> &'a str {
    let mut full = vec!["query"];
    full.extend_from_slice(path);
    request.path_text(&full).unwrap_or_default()
}

fn text<'a>(request: &'a ZapiElement, name: &str) -> &'a str {
    request.text_of(name).unwrap_or_default()
}

fn zapi_mirror_state(state: SnapmirrorState) -> &'static str {
    match state {
        SnapmirrorState::Uninitialized => "uninitialized",
        SnapmirrorState::Snapmirrored => "snapmirrored",
        SnapmirrorState::BrokenOff => "broken-off",
        SnapmirrorState::Paused => "snapmirrored",
        SnapmirrorState::InSync => "in_sync",
        SnapmirrorState::OutOfSync => "out_of_sync",
        SnapmirrorState::Unknown => "unknown",
    }
}

impl FakeArray {
    /// One page of an iterator call
    fn zapi_page(&self, request: &ZapiElement, records: Vec<ZapiElement>) -> ZapiResponse {
        let max = request
            .text_of("max-records")
            .and_then(|m| m.parse::<usize>().ok())
            .unwrap_or(usize::MAX)
            .max(1);
        let start = request
            .text_of("tag")
            .and_then(|t| t.strip_prefix("offset-"))
            .and_then(|o| o.parse::<usize>().ok())
            .unwrap_or(0);
        let end = start.saturating_add(max).min(records.len());

        let mut list = ZapiElement::new("attributes-list");
        for record in records.iter().skip(start).take(end.saturating_sub(start)) {
            list.add(record.clone());
        }
        let mut results = ZapiElement::new("results")
            .push(list)
            .child("num-records", end.saturating_sub(start));
        if self.stuck() {
            results = results.child("next-tag", "stuck");
        } else if end < records.len() {
            results = results.child("next-tag", format!("offset-{}", end));
        }
        zapi_ok(results)
    }

    fn zapi(&self, request: &ZapiElement) -> ZapiResponse {
        let mut state = self.state.lock();
        match request.name() {
            "system-get-ontapi-version" => zapi_ok(
                ZapiElement::new("results")
                    .child("major-version", self.zapi_version.0)
                    .child("minor-version", self.zapi_version.1),
            ),

            "vserver-show-aggr-get-iter" => {
                drop(state);
                let records = vec![ZapiElement::new("show-aggregates")
                    .child("aggregate-name", AGGREGATE)
                    .child("aggregate-type", "hdd")];
                self.zapi_page(request, records)
            }
            "system-node-get-iter" => {
                drop(state);
                let records = ["4052312000001", "4052312000002"]
                    .iter()
                    .map(|serial| ZapiElement::new("node-details-info").child("node-serial-number", serial))
                    .collect();
                self.zapi_page(request, records)
            }

            "job-get" => zapi_ok(ZapiElement::new("results").push(
                ZapiElement::new("attributes").push(ZapiElement::new("job-info").child("job-state", "success")),
            )),

            // Volumes
            "volume-get-iter" => {
                let id = ["volume-attributes", "volume-id-attributes"];
                let name = query_text(request, &[id[0], id[1], "name"]);
                let style = query_text(request, &[id[0], id[1], "style-extended"]);
                let parent = ["volume-attributes", "volume-clone-attributes", "volume-clone-parent-attributes"];
                let parent_name = query_text(request, &[parent[0], parent[1], parent[2], "name"]);
                let parent_snapshot = query_text(request, &[parent[0], parent[1], parent[2], "snapshot-name"]);
                let records = state
                    .volumes
                    .iter()
                    .filter(|(n, v)| {
                        matches(name, n)
                            && (style.is_empty() || v.style.to_string() == style)
                            && (parent_name.is_empty()
                                || v.clone_parent.as_ref().map_or(false, |(p, s)| {
                                    p == parent_name && (parent_snapshot.is_empty() || s == parent_snapshot)
                                }))
                    })
                    .map(|(n, v)| {
                        let mut id = ZapiElement::new("volume-id-attributes")
                            .child("name", n)
                            .child("style-extended", v.style)
                            .child("comment", &v.comment)
                            .child("junction-path", &v.junction_path)
                            .child("type", &v.access_type);
                        if let Some(aggregate) = v.aggregates.first() {
                            id = id.child("containing-aggregate-name", aggregate);
                        }
                        ZapiElement::new("volume-attributes")
                            .push(id)
                            .push(
                                ZapiElement::new("volume-space-attributes")
                                    .child("size", v.size)
                                    .child("size-used", v.size / 10),
                            )
                            .push(ZapiElement::new("volume-export-attributes").child("policy", &v.export_policy))
                    })
                    .collect();
                drop(state);
                self.zapi_page(request, records)
            }
            api @ ("volume-create" | "volume-create-async") => {
                let (name, aggregates, style) = if api == "volume-create" {
                    (
                        text(request, "volume").to_string(),
                        vec![text(request, "containing-aggr-name").to_string()],
                        VolumeStyle::FlexVol,
                    )
                } else {
                    let aggregates = request
                        .get("aggr-list")
                        .map(|l| l.children().iter().filter_map(ZapiElement::text).map(str::to_string).collect())
                        .unwrap_or_default();
                    (text(request, "volume-name").to_string(), aggregates, VolumeStyle::FlexGroup)
                };
                if state.volumes.contains_key(&name) {
                    return zapi_fail(zapi_errno::EEXIST, "volume already exists");
                }
                let uuid = state.next_uuid("vol");
                state.volumes.insert(
                    name,
                    FakeVolume {
                        uuid,
                        style,
                        aggregates,
                        size: request.path_u64(&["size"]).unwrap_or(0),
                        comment: text(request, "volume-comment").to_string(),
                        junction_path: text(request, "junction-path").to_string(),
                        export_policy: text(request, "export-policy").to_string(),
                        access_type: match text(request, "volume-type") {
                            "" => "rw".to_string(),
                            other => other.to_string(),
                        },
                        clone_parent: None,
                        snapshots: Vec::new(),
                    },
                );
                if style == VolumeStyle::FlexGroup {
                    zapi_ok(
                        ZapiElement::new("results")
                            .child("result-status", "in_progress")
                            .child("result-jobid", state.next_id),
                    )
                } else {
                    zapi_empty()
                }
            }
            api @ ("volume-destroy" | "volume-destroy-async") => {
                let name = if api == "volume-destroy" {
                    text(request, "name")
                } else {
                    text(request, "volume-name")
                };
                match state.volumes.remove(name) {
                    Some(_) if api == "volume-destroy-async" => {
                        zapi_ok(ZapiElement::new("results").child("result-status", "succeeded"))
                    }
                    Some(_) => zapi_empty(),
                    None => zapi_fail(zapi_errno::EVOLUMEDOESNOTEXIST, "volume does not exist"),
                }
            }
            api @ ("volume-size" | "volume-size-async") => {
                let name = if api == "volume-size" {
                    text(request, "volume")
                } else {
                    text(request, "volume-name")
                };
                let size = request.path_u64(&["new-size"]).unwrap_or(0);
                match state.volumes.get_mut(name) {
                    Some(volume) => {
                        volume.size = size;
                        zapi_ok(ZapiElement::new("results").child("result-status", "succeeded"))
                    }
                    None => zapi_fail(zapi_errno::EVOLUMEDOESNOTEXIST, "volume does not exist"),
                }
            }
            "volume-modify-iter" | "volume-modify-iter-async" => {
                let name = query_text(request, &["volume-attributes", "volume-id-attributes", "name"]);
                let attributes = request.path(&["attributes", "volume-attributes"]);
                let Some(volume) = state.volumes.get_mut(name) else {
                    return zapi_ok(ZapiElement::new("results").child("num-succeeded", 0).child("num-failed", 0));
                };
                if let Some(attributes) = attributes {
                    if let Some(comment) = attributes.path_text(&["volume-id-attributes", "comment"]) {
                        volume.comment = comment.to_string();
                    }
                    if let Some(policy) = attributes.path_text(&["volume-export-attributes", "policy"]) {
                        volume.export_policy = policy.to_string();
                    }
                }
                zapi_ok(ZapiElement::new("results").child("num-succeeded", 1).child("num-failed", 0))
            }
            "volume-mount" => match state.volumes.get_mut(text(request, "volume-name")) {
                Some(volume) => {
                    volume.junction_path = text(request, "junction-path").to_string();
                    zapi_empty()
                }
                None => zapi_fail(zapi_errno::EVOLUMEDOESNOTEXIST, "volume does not exist"),
            },
            "volume-unmount" => match state.volumes.get_mut(text(request, "volume-name")) {
                Some(volume) => {
                    volume.junction_path.clear();
                    zapi_empty()
                }
                None => zapi_fail(zapi_errno::EVOLUMEDOESNOTEXIST, "volume does not exist"),
            },
            "volume-rename" => {
                let Some(mut volume) = state.volumes.remove(text(request, "volume")) else {
                    return zapi_fail(zapi_errno::EVOLUMEDOESNOTEXIST, "volume does not exist");
                };
                volume.junction_path.clear();
                state.volumes.insert(text(request, "new-volume-name").to_string(), volume);
                zapi_empty()
            }
            "volume-clone-create" | "volume-clone-create-async" => {
                let clone = text(request, "volume").to_string();
                let parent = text(request, "parent-volume");
                if state.volumes.contains_key(&clone) {
                    return zapi_fail(zapi_errno::EEXIST, "volume already exists");
                }
                let Some(source) = state.volumes.get(parent).cloned() else {
                    return zapi_fail(zapi_errno::EVOLUMEDOESNOTEXIST, "parent volume does not exist");
                };
                let uuid = state.next_uuid("vol");
                state.volumes.insert(
                    clone,
                    FakeVolume {
                        uuid,
                        clone_parent: Some((parent.to_string(), text(request, "parent-snapshot").to_string())),
                        snapshots: Vec::new(),
                        ..source
                    },
                );
                zapi_ok(ZapiElement::new("results").child("result-status", "succeeded"))
            }

            // Snapshots
            "snapshot-create" => {
                let snapshot = text(request, "snapshot").to_string();
                let uuid = state.next_uuid("snap");
                let Some(volume) = state.volumes.get_mut(text(request, "volume")) else {
                    return zapi_fail(zapi_errno::EVOLUMEDOESNOTEXIST, "volume does not exist");
                };
                if volume.snapshots.iter().any(|(_, n)| *n == snapshot) {
                    return zapi_fail(zapi_errno::EEXIST, "snapshot already exists");
                }
                volume.snapshots.push((uuid, snapshot));
                zapi_empty()
            }
            "snapshot-get-iter" => {
                let volume_name = query_text(request, &["snapshot-info", "volume"]);
                let records = state
                    .volumes
                    .get(volume_name)
                    .map(|v| {
                        v.snapshots
                            .iter()
                            .map(|(_, name)| {
                                ZapiElement::new("snapshot-info")
                                    .child("name", name)
                                    .child("volume", volume_name)
                                    .child("access-time", 1_700_000_000)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                drop(state);
                self.zapi_page(request, records)
            }
            "snapshot-delete" => {
                let snapshot = text(request, "snapshot");
                let Some(volume) = state.volumes.get_mut(text(request, "volume")) else {
                    return zapi_fail(zapi_errno::EVOLUMEDOESNOTEXIST, "volume does not exist");
                };
                let before = volume.snapshots.len();
                volume.snapshots.retain(|(_, n)| n != snapshot);
                if volume.snapshots.len() == before {
                    return zapi_fail(zapi_errno::EOBJECTNOTFOUND, "snapshot does not exist");
                }
                zapi_empty()
            }
            "snapshot-restore-volume" => {
                let snapshot = text(request, "snapshot");
                match state.volumes.get(text(request, "volume")) {
                    Some(volume) if volume.snapshots.iter().any(|(_, n)| n == snapshot) => zapi_empty(),
                    Some(_) => zapi_fail(zapi_errno::EOBJECTNOTFOUND, "snapshot does not exist"),
                    None => zapi_fail(zapi_errno::EVOLUMEDOESNOTEXIST, "volume does not exist"),
                }
            }

            // LUNs
            "lun-get-iter" => {
                let path = query_text(request, &["lun-info", "path"]);
                let records = state
                    .luns
                    .iter()
                    .filter(|(p, _)| matches(path, p))
                    .map(|(p, l)| {
                        ZapiElement::new("lun-info")
                            .child("path", p)
                            .child("size", l.size)
                            .child("comment", &l.comment)
                            .child("multiprotocol-type", &l.os_type)
                            .child("serial-number", &l.uuid)
                            .child("mapped", !l.maps.is_empty())
                            .child("online", true)
                    })
                    .collect();
                drop(state);
                self.zapi_page(request, records)
            }
            "lun-create-by-size" => {
                let path = text(request, "path").to_string();
                if state.luns.contains_key(&path) {
                    return zapi_fail(zapi_errno::EVDISKEXISTS, "LUN already exists");
                }
                let uuid = state.next_uuid("lun");
                state.luns.insert(
                    path,
                    FakeLun {
                        uuid,
                        size: request.path_u64(&["size"]).unwrap_or(0),
                        os_type: text(request, "ostype").to_string(),
                        comment: text(request, "comment").to_string(),
                        attributes: BTreeMap::new(),
                        maps: BTreeMap::new(),
                    },
                );
                zapi_empty()
            }
            "lun-destroy" => match state.luns.remove(text(request, "path")) {
                Some(_) => zapi_empty(),
                None => zapi_fail(zapi_errno::ENOSUCHVDISK, "LUN does not exist"),
            },
            "lun-set-attribute" => match state.luns.get_mut(text(request, "path")) {
                Some(lun) => {
                    lun.attributes
                        .insert(text(request, "name").to_string(), text(request, "value").to_string());
                    zapi_empty()
                }
                None => zapi_fail(zapi_errno::ENOSUCHVDISK, "LUN does not exist"),
            },
            "lun-resize" => match state.luns.get_mut(text(request, "path")) {
                Some(lun) => {
                    lun.size = request.path_u64(&["size"]).unwrap_or(lun.size);
                    zapi_ok(ZapiElement::new("results").child("actual-size", lun.size))
                }
                None => zapi_fail(zapi_errno::ENOSUCHVDISK, "LUN does not exist"),
            },
            "lun-map-list-info" => match state.luns.get(text(request, "path")) {
                Some(lun) => {
                    let mut groups = ZapiElement::new("initiator-groups");
                    for (igroup, id) in &lun.maps {
                        groups.add(
                            ZapiElement::new("initiator-group-info")
                                .child("initiator-group-name", igroup)
                                .child("lun-id", id),
                        );
                    }
                    zapi_ok(ZapiElement::new("results").push(groups))
                }
                None => zapi_fail(zapi_errno::ENOSUCHVDISK, "LUN does not exist"),
            },
            "lun-map" => {
                let igroup = text(request, "initiator-group").to_string();
                let id = state.next_lun_id(&igroup);
                let Some(lun) = state.luns.get_mut(text(request, "path")) else {
                    return zapi_fail(zapi_errno::ENOSUCHVDISK, "LUN does not exist");
                };
                if lun.maps.contains_key(&igroup) {
                    return zapi_fail(zapi_errno::ELUNALREADYMAPPED, "LUN already mapped");
                }
                lun.maps.insert(igroup, id);
                zapi_ok(ZapiElement::new("results").child("lun-id-assigned", id))
            }
            "lun-unmap" => {
                let igroup = text(request, "initiator-group");
                match state.luns.get_mut(text(request, "path")).map(|lun| lun.maps.remove(igroup)) {
                    Some(Some(_)) => zapi_empty(),
                    _ => zapi_fail(zapi_errno::ENOSUCHLUNMAP, "LUN map does not exist"),
                }
            }

            // Igroups
            "igroup-get-iter" => {
                let name = query_text(request, &["initiator-group-info", "initiator-group-name"]);
                let records = state
                    .igroups
                    .iter()
                    .filter(|(n, _)| matches(name, n))
                    .map(|(n, g)| {
                        let mut initiators = ZapiElement::new("initiators");
                        for initiator in &g.initiators {
                            initiators.add(ZapiElement::new("initiator-info").child("initiator-name", initiator));
                        }
                        ZapiElement::new("initiator-group-info")
                            .child("initiator-group-name", n)
                            .child("initiator-group-type", &g.protocol)
                            .child("initiator-group-os-type", &g.os_type)
                            .push(initiators)
                    })
                    .collect();
                drop(state);
                self.zapi_page(request, records)
            }
            "igroup-create" => {
                let name = text(request, "initiator-group-name").to_string();
                if state.igroups.contains_key(&name) {
                    return zapi_fail(zapi_errno::EINITGROUPEXISTS, "igroup already exists");
                }
                let uuid = state.next_uuid("ig");
                state.igroups.insert(
                    name,
                    FakeIgroup {
                        uuid,
                        protocol: text(request, "initiator-group-type").to_string(),
                        os_type: text(request, "os-type").to_string(),
                        initiators: BTreeSet::new(),
                    },
                );
                zapi_empty()
            }
            "igroup-destroy" => match state.igroups.remove(text(request, "initiator-group-name")) {
                Some(_) => zapi_empty(),
                None => zapi_fail(zapi_errno::ENOSUCHINITGROUP, "igroup does not exist"),
            },
            "igroup-add" => match state
                .igroups
                .get_mut(text(request, "initiator-group-name"))
                .map(|group| group.initiators.insert(text(request, "initiator").to_string()))
            {
                Some(false) => zapi_fail(zapi_errno::EINITIATORALREADYINGROUP, "initiator already in igroup"),
                Some(true) => zapi_empty(),
                None => zapi_fail(zapi_errno::ENOSUCHINITGROUP, "igroup does not exist"),
            },
            "igroup-remove" => match state
                .igroups
                .get_mut(text(request, "initiator-group-name"))
                .map(|group| group.initiators.remove(text(request, "initiator")))
            {
                Some(true) => zapi_empty(),
                Some(false) => zapi_fail(zapi_errno::EINITIATORNOTINGROUP, "initiator not in igroup"),
                None => zapi_fail(zapi_errno::ENOSUCHINITGROUP, "igroup does not exist"),
            },

            // Export policies
            "export-policy-create" => {
                let name = text(request, "policy-name").to_string();
                if state.policies.contains_key(&name) {
                    return zapi_fail(zapi_errno::EDUPLICATEENTRY, "export policy already exists");
                }
                state.next_id += 1;
                let id = state.next_id;
                state.policies.insert(name, FakePolicy { id, rules: BTreeMap::new() });
                zapi_empty()
            }
            "export-policy-destroy" => match state.policies.remove(text(request, "policy-name")) {
                Some(_) => zapi_empty(),
                None => zapi_fail(zapi_errno::EOBJECTNOTFOUND, "export policy does not exist"),
            },
            "export-policy-get-iter" => {
                let name = query_text(request, &["export-policy-info", "policy-name"]);
                let records = state
                    .policies
                    .keys()
                    .filter(|n| matches(name, n))
                    .map(|n| ZapiElement::new("export-policy-info").child("policy-name", n))
                    .collect();
                drop(state);
                self.zapi_page(request, records)
            }
            "export-rule-get-iter" => {
                let name = query_text(request, &["export-rule-info", "policy-name"]);
                let records = state
                    .policies
                    .get(name)
                    .map(|p| {
                        p.rules
                            .iter()
                            .map(|(index, client)| {
                                ZapiElement::new("export-rule-info")
                                    .child("policy-name", name)
                                    .child("client-match", client)
                                    .child("rule-index", index)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                drop(state);
                self.zapi_page(request, records)
            }
            "export-rule-create" => match state.policies.get_mut(text(request, "policy-name")) {
                Some(policy) => {
                    let index = policy.rules.keys().next_back().map_or(1, |i| i + 1);
                    policy.rules.insert(index, text(request, "client-match").to_string());
                    zapi_empty()
                }
                None => zapi_fail(zapi_errno::EOBJECTNOTFOUND, "export policy does not exist"),
            },
            "export-rule-destroy" => {
                let index = request.path_u64(&["rule-index"]).unwrap_or(0) as u32;
                match state.policies.get_mut(text(request, "policy-name")).map(|policy| policy.rules.remove(&index)) {
                    Some(Some(_)) => zapi_empty(),
                    _ => zapi_fail(zapi_errno::EOBJECTNOTFOUND, "export rule does not exist"),
                }
            }

            // SnapMirror
            "snapmirror-get-iter" => {
                let destination = query_text(request, &["snapmirror-info", "destination-location"]);
                let source = query_text(request, &["snapmirror-info", "source-location"]);
                let records = state
                    .relationships
                    .iter()
                    .filter(|r| {
                        r.destination.path() == destination && (source.is_empty() || r.source.path() == source)
                    })
                    .map(|r| {
                        let status = if r.transferring {
                            "transferring"
                        } else if r.state == SnapmirrorState::Paused {
                            "quiesced"
                        } else {
                            "idle"
                        };
                        ZapiElement::new("snapmirror-info")
                            .child("source-vserver", &r.source.svm)
                            .child("source-volume", &r.source.volume)
                            .child("destination-vserver", &r.destination.svm)
                            .child("destination-volume", &r.destination.volume)
                            .child("mirror-state", zapi_mirror_state(r.state))
                            .child("relationship-status", status)
                            .child("is-healthy", true)
                            .child("policy", &r.policy)
                    })
                    .collect();
                drop(state);
                self.zapi_page(request, records)
            }
            "snapmirror-create" => {
                let destination = text(request, "destination-location");
                let source = text(request, "source-location");
                if state.relationship(destination, Some(source)).is_some() {
                    return zapi_fail(zapi_errno::EDUPLICATEENTRY, "relationship already exists");
                }
                let (Some(source), Some(destination)) = (
                    SnapmirrorEndpoint::from_path(source),
                    SnapmirrorEndpoint::from_path(destination),
                ) else {
                    return zapi_fail(zapi_errno::EINVALIDINPUTERROR, "invalid location");
                };
                let uuid = state.next_uuid("sm");
                state.relationships.push(FakeRelationship {
                    uuid,
                    source,
                    destination,
                    state: SnapmirrorState::Uninitialized,
                    transferring: false,
                    policy: text(request, "policy").to_string(),
                });
                zapi_empty()
            }
            api @ ("snapmirror-initialize" | "snapmirror-resync" | "snapmirror-quiesce" | "snapmirror-abort"
            | "snapmirror-break") => {
                let destination = text(request, "destination-location");
                let source = text(request, "source-location");
                let Some(relationship) = state.relationship(destination, Some(source)) else {
                    return zapi_fail(zapi_errno::EOBJECTNOTFOUND, "relationship does not exist");
                };
                match api {
                    "snapmirror-initialize" | "snapmirror-resync" => relationship.state = SnapmirrorState::Snapmirrored,
                    "snapmirror-quiesce" => relationship.state = SnapmirrorState::Paused,
                    "snapmirror-abort" => relationship.transferring = false,
                    _ => relationship.state = SnapmirrorState::BrokenOff,
                }
                zapi_empty()
            }
            "snapmirror-destroy" => {
                let destination = text(request, "destination-location").to_string();
                let before = state.relationships.len();
                state.relationships.retain(|r| r.destination.path() != destination);
                if state.relationships.len() == before {
                    return zapi_fail(zapi_errno::EOBJECTNOTFOUND, "relationship does not exist");
                }
                zapi_empty()
            }
            "snapmirror-release-iter" => {
                zapi_ok(ZapiElement::new("results").child("num-succeeded", 0).child("num-failed", 0))
            }

            other => zapi_fail(zapi_errno::EAPINOTFOUND, &format!("Unable to find API: {}", other)),
        }
    }
}

#[async_trait]
impl ZapiTransport for FakeArray {
    async fn invoke(&self, request: &ZapiElement) -> std::result::Result<Option<ZapiResponse>, TransportError> {
        self.log(request.name().to_string());
        Ok(Some(self.zapi(request)))
    }
}

// =============================================================================
// REST
// =============================================================================

fn rest_error(status: u16, code: &str, message: &str) -> RestResponse {
    RestResponse::new(status, json!({ "error": { "code": code, "message": message } }))
}

fn not_found(what: &str) -> RestResponse {
    rest_error(404, rest_code::ENTRY_DOESNT_EXIST, &format!("{} not found", what))
}

fn duplicate(what: &str) -> RestResponse {
    rest_error(409, rest_code::DUPLICATE_ENTRY, &format!("{} already exists", what))
}

fn accepted(job: u64) -> RestResponse {
    RestResponse::new(202, json!({ "job": { "uuid": format!("job-{}", job) } }))
}

fn created() -> RestResponse {
    RestResponse::new(201, json!({}))
}

fn ok() -> RestResponse {
    RestResponse::new(200, json!({}))
}

fn body_str<'a>(body: &'a Value, pointer: &str) -> &'a str {
    body.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

fn volume_record(name: &str, volume: &FakeVolume) -> Value {
    json!({
        "uuid": volume.uuid,
        "name": name,
        "style": volume.style.to_string(),
        "type": volume.access_type,
        "aggregates": volume.aggregates.iter().map(|a| json!({ "name": a })).collect::<Vec<_>>(),
        "size": volume.size,
        "space": { "used": volume.size / 10 },
        "comment": volume.comment,
        "nas": { "path": volume.junction_path, "export_policy": { "name": volume.export_policy } },
    })
}

fn rest_state(state: SnapmirrorState) -> String {
    state.to_string()
}

impl FakeArray {
    /// One page of a collection, linking to the next
    fn rest_page(&self, request: &RestRequest, records: Vec<Value>) -> RestResponse {
        let max = request
            .query_value("max_records")
            .and_then(|m| m.parse::<usize>().ok())
            .unwrap_or(usize::MAX)
            .max(1);
        let start = request
            .query_value("start.offset")
            .and_then(|o| o.parse::<usize>().ok())
            .unwrap_or(0);
        let end = start.saturating_add(max).min(records.len());
        let page: Vec<Value> = records.iter().skip(start).take(end.saturating_sub(start)).cloned().collect();

        let mut body = json!({ "records": page, "num_records": page.len() });
        let next = if self.stuck() {
            Some(request.clone().set_query("start.offset", "stuck").href())
        } else if end < records.len() {
            Some(request.clone().set_query("start.offset", end).href())
        } else {
            None
        };
        if let Some(href) = next {
            body["_links"] = json!({ "next": { "href": href } });
        }
        RestResponse::new(200, body)
    }

    fn rest(&self, request: &RestRequest) -> RestResponse {
        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        let body = request.body.clone().unwrap_or(Value::Null);
        let q = |key: &str| request.query_value(key).unwrap_or_default();
        let mut state = self.state.lock();

        match (request.method, segments.as_slice()) {
            (RestMethod::Get, ["cluster"]) => RestResponse::new(
                200,
                json!({
                    "version": {
                        "generation": self.rest_version.0,
                        "major": self.rest_version.1,
                        "minor": self.rest_version.2,
                    },
                    "san_optimized": self.san_optimized,
                }),
            ),
            (RestMethod::Get, ["cluster", "jobs", _]) => RestResponse::new(200, json!({ "state": "success" })),
            (RestMethod::Get, ["cluster", "nodes"]) => {
                drop(state);
                let records = vec![
                    json!({ "serial_number": "4052312000001" }),
                    json!({ "serial_number": "4052312000002" }),
                ];
                self.rest_page(request, records)
            }
            (RestMethod::Get, ["svm", "svms"]) => {
                drop(state);
                let records = vec![json!({
                    "name": SVM,
                    "uuid": "svm-uuid-0",
                    "subtype": "default",
                    "aggregates": [{ "name": AGGREGATE }],
                })];
                self.rest_page(request, records)
            }

            // Volumes
            (RestMethod::Get, ["storage", "volumes"]) => {
                let records = state
                    .volumes
                    .iter()
                    .filter(|(n, v)| {
                        matches(q("name"), n)
                            && (q("style").is_empty() || v.style.to_string() == q("style"))
                            && (q("clone.parent_volume.name").is_empty()
                                || v.clone_parent.as_ref().map_or(false, |(p, s)| {
                                    p == q("clone.parent_volume.name")
                                        && (q("clone.parent_snapshot.name").is_empty()
                                            || s == q("clone.parent_snapshot.name"))
                                }))
                    })
                    .map(|(n, v)| volume_record(n, v))
                    .collect();
                drop(state);
                self.rest_page(request, records)
            }
            (RestMethod::Post, ["storage", "volumes"]) => {
                let name = body_str(&body, "/name").to_string();
                if state.volumes.contains_key(&name) {
                    return duplicate("volume");
                }
                let uuid = state.next_uuid("vol");
                let volume = if let Some(clone) = body.get("clone") {
                    let parent = body_str(clone, "/parent_volume/name");
                    let Some(source) = state.volumes.get(parent).cloned() else {
                        return not_found("parent volume");
                    };
                    FakeVolume {
                        uuid,
                        clone_parent: Some((parent.to_string(), body_str(clone, "/parent_snapshot/name").to_string())),
                        snapshots: Vec::new(),
                        ..source
                    }
                } else {
                    FakeVolume {
                        uuid,
                        style: if body_str(&body, "/style") == "flexgroup" {
                            VolumeStyle::FlexGroup
                        } else {
                            VolumeStyle::FlexVol
                        },
                        aggregates: body
                            .get("aggregates")
                            .and_then(Value::as_array)
                            .map(|a| a.iter().map(|x| body_str(x, "/name").to_string()).collect())
                            .unwrap_or_default(),
                        size: body.get("size").and_then(Value::as_u64).unwrap_or(0),
                        comment: body_str(&body, "/comment").to_string(),
                        junction_path: body_str(&body, "/nas/path").to_string(),
                        export_policy: body_str(&body, "/nas/export_policy/name").to_string(),
                        access_type: match body_str(&body, "/type") {
                            "" => "rw".to_string(),
                            other => other.to_string(),
                        },
                        clone_parent: None,
                        snapshots: Vec::new(),
                    }
                };
                state.volumes.insert(name, volume);
                accepted(state.next_id)
            }
            (RestMethod::Patch, ["storage", "volumes", uuid]) => {
                let uuid = uuid.to_string();
                let job = state.next_id;
                let Some(volume) = state.volume_by_uuid(&uuid) else {
                    return not_found("volume");
                };
                if let Some(size) = body.get("size").and_then(Value::as_u64) {
                    volume.size = size;
                }
                if let Some(comment) = body.get("comment").and_then(Value::as_str) {
                    volume.comment = comment.to_string();
                }
                if let Some(path) = body.pointer("/nas/path").and_then(Value::as_str) {
                    volume.junction_path = path.to_string();
                }
                if let Some(policy) = body.pointer("/nas/export_policy/name").and_then(Value::as_str) {
                    volume.export_policy = policy.to_string();
                }
                if let Some(new_name) = body.get("name").and_then(Value::as_str) {
                    let new_name = new_name.to_string();
                    if let Some(old) = state.volumes.iter().find(|(_, v)| v.uuid == uuid).map(|(n, _)| n.clone()) {
                        if let Some(volume) = state.volumes.remove(&old) {
                            state.volumes.insert(new_name, volume);
                        }
                    }
                }
                accepted(job)
            }
            (RestMethod::Delete, ["storage", "volumes", uuid]) => {
                let Some(name) = state.volumes.iter().find(|(_, v)| v.uuid == *uuid).map(|(n, _)| n.clone()) else {
                    return not_found("volume");
                };
                state.volumes.remove(&name);
                accepted(state.next_id)
            }

            // Snapshots
            (RestMethod::Get, ["storage", "volumes", uuid, "snapshots"]) => {
                let uuid = uuid.to_string();
                let Some(volume) = state.volume_by_uuid(&uuid) else {
                    return not_found("volume");
                };
                let records = volume
                    .snapshots
                    .iter()
                    .filter(|(_, n)| matches(q("name"), n))
                    .map(|(id, n)| json!({ "uuid": id, "name": n, "create_time": "2024-01-01T00:00:00Z" }))
                    .collect();
                drop(state);
                self.rest_page(request, records)
            }
            (RestMethod::Post, ["storage", "volumes", uuid, "snapshots"]) => {
                let uuid = uuid.to_string();
                let snapshot_uuid = state.next_uuid("snap");
                let job = state.next_id;
                let Some(volume) = state.volume_by_uuid(&uuid) else {
                    return not_found("volume");
                };
                let name = body_str(&body, "/name").to_string();
                if volume.snapshots.iter().any(|(_, n)| *n == name) {
                    return duplicate("snapshot");
                }
                volume.snapshots.push((snapshot_uuid, name));
                accepted(job)
            }
            (RestMethod::Delete, ["storage", "volumes", uuid, "snapshots", snapshot]) => {
                let uuid = uuid.to_string();
                let job = state.next_id;
                let Some(volume) = state.volume_by_uuid(&uuid) else {
                    return not_found("volume");
                };
                let before = volume.snapshots.len();
                volume.snapshots.retain(|(id, _)| id != snapshot);
                if volume.snapshots.len() == before {
                    return not_found("snapshot");
                }
                accepted(job)
            }

            // LUNs
            (RestMethod::Get, ["storage", "luns"]) => {
                let records = state
                    .luns
                    .iter()
                    .filter(|(p, _)| matches(q("name"), p))
                    .map(|(p, l)| {
                        json!({
                            "uuid": l.uuid,
                            "name": p,
                            "space": { "size": l.size },
                            "comment": l.comment,
                            "os_type": l.os_type,
                            "serial_number": l.uuid,
                            "status": { "mapped": !l.maps.is_empty(), "state": "online" },
                        })
                    })
                    .collect();
                drop(state);
                self.rest_page(request, records)
            }
            (RestMethod::Post, ["storage", "luns"]) => {
                let path = body_str(&body, "/name").to_string();
                if state.luns.contains_key(&path) {
                    return duplicate("lun");
                }
                let uuid = state.next_uuid("lun");
                state.luns.insert(
                    path,
                    FakeLun {
                        uuid,
                        size: body.pointer("/space/size").and_then(Value::as_u64).unwrap_or(0),
                        os_type: body_str(&body, "/os_type").to_string(),
                        comment: body_str(&body, "/comment").to_string(),
                        attributes: BTreeMap::new(),
                        maps: BTreeMap::new(),
                    },
                );
                created()
            }
            (RestMethod::Delete, ["storage", "luns", uuid]) => match state.lun_path_by_uuid(uuid) {
                Some(path) => {
                    state.luns.remove(&path);
                    ok()
                }
                None => not_found("lun"),
            },
            (RestMethod::Patch, ["storage", "luns", uuid]) => {
                let Some(path) = state.lun_path_by_uuid(uuid) else {
                    return not_found("lun");
                };
                let Some(mut lun) = state.luns.remove(&path) else {
                    return not_found("lun");
                };
                if let Some(size) = body.pointer("/space/size").and_then(Value::as_u64) {
                    lun.size = size;
                }
                let path = body.get("name").and_then(Value::as_str).map_or(path, str::to_string);
                state.luns.insert(path, lun);
                ok()
            }
            (RestMethod::Post, ["storage", "luns", uuid, "attributes"]) => {
                let Some(path) = state.lun_path_by_uuid(uuid) else {
                    return not_found("lun");
                };
                let Some(lun) = state.luns.get_mut(&path) else {
                    return not_found("lun");
                };
                let name = body_str(&body, "/name").to_string();
                if lun.attributes.contains_key(&name) {
                    return duplicate("lun attribute");
                }
                lun.attributes.insert(name, body_str(&body, "/value").to_string());
                created()
            }
            (RestMethod::Patch, ["storage", "luns", uuid, "attributes", name]) => {
                let Some(path) = state.lun_path_by_uuid(uuid) else {
                    return not_found("lun");
                };
                match state.luns.get_mut(&path) {
                    Some(lun) => {
                        lun.attributes.insert(name.to_string(), body_str(&body, "/value").to_string());
                        ok()
                    }
                    None => not_found("lun"),
                }
            }

            // LUN maps
            (RestMethod::Get, ["protocols", "san", "lun-maps"]) => {
                let records = state
                    .luns
                    .iter()
                    .filter(|(p, _)| matches(q("lun.name"), p))
                    .flat_map(|(p, l)| {
                        l.maps.iter().map(move |(igroup, id)| (p.clone(), l.uuid.clone(), igroup.clone(), *id))
                    })
                    .filter(|(_, _, igroup, _)| q("igroup.name").is_empty() || igroup == q("igroup.name"))
                    .map(|(path, lun_uuid, igroup, id)| {
                        let igroup_uuid = state.igroups.get(&igroup).map(|g| g.uuid.clone()).unwrap_or_default();
                        json!({
                            "lun": { "name": path, "uuid": lun_uuid },
                            "igroup": { "name": igroup, "uuid": igroup_uuid },
                            "logical_unit_number": id,
                            "reporting_nodes": [{ "name": "node-01" }, { "name": "node-02" }],
                        })
                    })
                    .collect();
                drop(state);
                self.rest_page(request, records)
            }
            (RestMethod::Post, ["protocols", "san", "lun-maps"]) => {
                let igroup = body_str(&body, "/igroup/name").to_string();
                let id = state.next_lun_id(&igroup);
                let Some(lun) = state.luns.get_mut(body_str(&body, "/lun/name")) else {
                    return not_found("lun");
                };
                if lun.maps.contains_key(&igroup) {
                    return rest_error(409, rest_code::LUN_MAP_EXISTS, "LUN already mapped");
                }
                lun.maps.insert(igroup, id);
                RestResponse::new(201, json!({ "records": [{ "logical_unit_number": id }] }))
            }
            (RestMethod::Delete, ["protocols", "san", "lun-maps", lun_uuid, igroup_uuid]) => {
                let igroup = state.igroup_name_by_uuid(igroup_uuid);
                let path = state.lun_path_by_uuid(lun_uuid);
                match (path, igroup) {
                    (Some(path), Some(igroup)) => match state.luns.get_mut(&path).map(|lun| lun.maps.remove(&igroup)) {
                        Some(Some(_)) => ok(),
                        _ => not_found("lun map"),
                    },
                    _ => not_found("lun map"),
                }
            }

            // Igroups
            (RestMethod::Get, ["protocols", "san", "igroups"]) => {
                let records = state
                    .igroups
                    .iter()
                    .filter(|(n, _)| matches(q("name"), n))
                    .map(|(n, g)| {
                        json!({
                            "uuid": g.uuid,
                            "name": n,
                            "protocol": g.protocol,
                            "os_type": g.os_type,
                            "initiators": g.initiators.iter().map(|i| json!({ "name": i })).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                drop(state);
                self.rest_page(request, records)
            }
            (RestMethod::Post, ["protocols", "san", "igroups"]) => {
                let name = body_str(&body, "/name").to_string();
                if state.igroups.contains_key(&name) {
                    return duplicate("igroup");
                }
                let uuid = state.next_uuid("ig");
                state.igroups.insert(
                    name,
                    FakeIgroup {
                        uuid,
                        protocol: body_str(&body, "/protocol").to_string(),
                        os_type: body_str(&body, "/os_type").to_string(),
                        initiators: BTreeSet::new(),
                    },
                );
                created()
            }
            (RestMethod::Delete, ["protocols", "san", "igroups", uuid]) => match state.igroup_name_by_uuid(uuid) {
                Some(name) => {
                    state.igroups.remove(&name);
                    ok()
                }
                None => not_found("igroup"),
            },
            (RestMethod::Post, ["protocols", "san", "igroups", uuid, "initiators"]) => {
                let Some(name) = state.igroup_name_by_uuid(uuid) else {
                    return not_found("igroup");
                };
                match state
                    .igroups
                    .get_mut(&name)
                    .map(|group| group.initiators.insert(body_str(&body, "/name").to_string()))
                {
                    Some(true) => created(),
                    Some(false) => duplicate("initiator"),
                    None => not_found("igroup"),
                }
            }
            (RestMethod::Delete, ["protocols", "san", "igroups", uuid, "initiators", initiator]) => {
                let Some(name) = state.igroup_name_by_uuid(uuid) else {
                    return not_found("igroup");
                };
                match state.igroups.get_mut(&name).map(|group| group.initiators.remove(*initiator)) {
                    Some(true) => ok(),
                    _ => not_found("initiator"),
                }
            }

            // Export policies
            (RestMethod::Get, ["protocols", "nfs", "export-policies"]) => {
                let records = state
                    .policies
                    .iter()
                    .filter(|(n, _)| matches(q("name"), n))
                    .map(|(n, p)| json!({ "id": p.id, "name": n }))
                    .collect();
                drop(state);
                self.rest_page(request, records)
            }
            (RestMethod::Post, ["protocols", "nfs", "export-policies"]) => {
                let name = body_str(&body, "/name").to_string();
                if state.policies.contains_key(&name) {
                    return duplicate("export policy");
                }
                state.next_id += 1;
                let id = state.next_id;
                state.policies.insert(name, FakePolicy { id, rules: BTreeMap::new() });
                created()
            }
            (RestMethod::Delete, ["protocols", "nfs", "export-policies", id]) => match state.policy_name_by_id(id) {
                Some(name) => {
                    state.policies.remove(&name);
                    ok()
                }
                None => not_found("export policy"),
            },
            (RestMethod::Get, ["protocols", "nfs", "export-policies", id, "rules"]) => {
                let Some(name) = state.policy_name_by_id(id) else {
                    return not_found("export policy");
                };
                let records = state
                    .policies
                    .get(&name)
                    .map(|p| {
                        p.rules
                            .iter()
                            .map(|(index, client)| {
                                let clients: Vec<Value> = client.split(',').map(|c| json!({ "match": c })).collect();
                                json!({ "index": index, "clients": clients })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                drop(state);
                self.rest_page(request, records)
            }
            (RestMethod::Post, ["protocols", "nfs", "export-policies", id, "rules"]) => {
                let Some(name) = state.policy_name_by_id(id) else {
                    return not_found("export policy");
                };
                let clients: Vec<String> = body
                    .get("clients")
                    .and_then(Value::as_array)
                    .map(|c| c.iter().map(|x| body_str(x, "/match").to_string()).collect())
                    .unwrap_or_default();
                match state.policies.get_mut(&name) {
                    Some(policy) => {
                        let index = policy.rules.keys().next_back().map_or(1, |i| i + 1);
                        policy.rules.insert(index, clients.join(","));
                        created()
                    }
                    None => not_found("export policy"),
                }
            }
            (RestMethod::Delete, ["protocols", "nfs", "export-policies", id, "rules", index]) => {
                let Some(name) = state.policy_name_by_id(id) else {
                    return not_found("export policy");
                };
                let index: u32 = index.parse().unwrap_or(0);
                match state.policies.get_mut(&name).map(|policy| policy.rules.remove(&index)) {
                    Some(Some(_)) => ok(),
                    _ => not_found("export rule"),
                }
            }

            // SnapMirror
            (RestMethod::Get, ["snapmirror", "relationships"]) => {
                let records = state
                    .relationships
                    .iter()
                    .filter(|r| {
                        (q("destination.path").is_empty() || r.destination.path() == q("destination.path"))
                            && (q("source.path").is_empty() || r.source.path() == q("source.path"))
                    })
                    .map(|r| {
                        let mut record = json!({
                            "uuid": r.uuid,
                            "source": { "path": r.source.path() },
                            "destination": { "path": r.destination.path() },
                            "state": rest_state(r.state),
                            "healthy": true,
                            "policy": { "name": r.policy },
                        });
                        if r.transferring {
                            record["transfer"] = json!({ "state": "transferring", "uuid": format!("{}-xfer", r.uuid) });
                        }
                        record
                    })
                    .collect();
                drop(state);
                self.rest_page(request, records)
            }
            (RestMethod::Post, ["snapmirror", "relationships"]) => {
                let source = body_str(&body, "/source/path").to_string();
                let destination = body_str(&body, "/destination/path").to_string();
                if state.relationship(&destination, Some(source.as_str())).is_some() {
                    return duplicate("relationship");
                }
                let (Some(source), Some(destination)) = (
                    SnapmirrorEndpoint::from_path(&source),
                    SnapmirrorEndpoint::from_path(&destination),
                ) else {
                    return rest_error(400, "13303845", "invalid path");
                };
                let uuid = state.next_uuid("sm");
                state.relationships.push(FakeRelationship {
                    uuid,
                    source,
                    destination,
                    state: SnapmirrorState::Uninitialized,
                    transferring: false,
                    policy: body_str(&body, "/policy/name").to_string(),
                });
                accepted(state.next_id)
            }
            (RestMethod::Patch, ["snapmirror", "relationships", uuid]) => {
                let job = state.next_id;
                let Some(relationship) = state.relationship_by_uuid(uuid) else {
                    return not_found("relationship");
                };
                relationship.state = SnapmirrorState::parse(body_str(&body, "/state"));
                accepted(job)
            }
            (RestMethod::Patch, ["snapmirror", "relationships", uuid, "transfers", _]) => {
                let Some(relationship) = state.relationship_by_uuid(uuid) else {
                    return not_found("relationship");
                };
                relationship.transferring = false;
                ok()
            }
            (RestMethod::Delete, ["snapmirror", "relationships", uuid]) => {
                let before = state.relationships.len();
                state.relationships.retain(|r| r.uuid != *uuid);
                if state.relationships.len() == before {
                    return not_found("relationship");
                }
                accepted(state.next_id)
            }

            _ => rest_error(400, "262179", &format!("unexpected {} {}", request.method, request.path)),
        }
    }
}

#[async_trait]
impl RestTransport for FakeArray {
    async fn send(&self, request: &RestRequest) -> std::result::Result<Option<RestResponse>, TransportError> {
        self.log(format!("{} {}", request.method, request.path));
        Ok(Some(self.rest(request)))
    }
}
