//! REST FlexVol and FlexGroup management
//!
//! Both styles live under `/storage/volumes` and differ only in the `style`
//! filter and the capabilities they need. Volume mutations return jobs.

use super::{bool_at, str_at, u64_at, uuid_of, RestBackend, RestRequest};
use crate::api::abstraction::{FlexgroupApi, VolumeApi};
use crate::api::capability::Feature;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::pagination;
use crate::api::types::{QosPolicyGroup, Volume, VolumeStyle};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

const VOLUME_FIELDS: &[&str] = &[
    "uuid",
    "name",
    "style",
    "type",
    "aggregates.name",
    "size",
    "space.used",
    "space.snapshot.reserve_percent",
    "comment",
    "nas.path",
    "nas.export_policy.name",
    "nas.unix_permissions",
    "nas.security_style",
    "snapshot_policy.name",
    "snapshot_directory_access_enabled",
    "guarantee.type",
    "qos.policy.name",
    "tiering.policy",
    "encryption.enabled",
];

fn parse_volume(record: &Value) -> Volume {
    let style = match str_at(record, "/style").as_str() {
        "flexgroup" => VolumeStyle::FlexGroup,
        _ => VolumeStyle::FlexVol,
    };
    let aggregates = record
        .get("aggregates")
        .and_then(Value::as_array)
        .map(|list| list.iter().map(|a| str_at(a, "/name")).filter(|n| !n.is_empty()).collect())
        .unwrap_or_default();
    let qos = match str_at(record, "/qos/policy/name") {
        name if name.is_empty() || name == "none" => QosPolicyGroup::none(),
        name => QosPolicyGroup::fixed(name),
    };

    Volume {
        name: str_at(record, "/name"),
        style,
        aggregates,
        size: u64_at(record, "/size").unwrap_or(0),
        used: u64_at(record, "/space/used").unwrap_or(0),
        comment: str_at(record, "/comment"),
        export_policy: str_at(record, "/nas/export_policy/name"),
        unix_permissions: str_at(record, "/nas/unix_permissions"),
        security_style: str_at(record, "/nas/security_style"),
        snapshot_policy: str_at(record, "/snapshot_policy/name"),
        snapshot_reserve: u64_at(record, "/space/snapshot/reserve_percent").map(|v| v as u32),
        snapshot_directory_access: bool_at(record, "/snapshot_directory_access_enabled").unwrap_or(false),
        space_reserve: str_at(record, "/guarantee/type"),
        junction_path: str_at(record, "/nas/path"),
        qos_policy_group: qos,
        tiering_policy: str_at(record, "/tiering/policy"),
        encrypt: bool_at(record, "/encryption/enabled"),
        access_type: str_at(record, "/type"),
    }
}

/// Unix permissions travel as an integer such as `755`
fn permissions_value(permissions: &str) -> Value {
    match permissions.trim().parse::<u32>() {
        Ok(mode) => json!(mode),
        Err(_) => json!(permissions),
    }
}

fn create_body(svm: &str, volume: &Volume) -> Result<Value> {
    if volume.aggregates.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "{} {} needs an aggregate",
            volume.style.kind(),
            volume.name
        )));
    }

    let mut body = Map::new();
    body.insert("name".into(), json!(volume.name));
    body.insert("svm".into(), json!({ "name": svm }));
    body.insert("style".into(), json!(volume.style.to_string()));
    body.insert("size".into(), json!(volume.size));
    body.insert(
        "aggregates".into(),
        Value::Array(volume.aggregates.iter().map(|a| json!({ "name": a })).collect()),
    );

    let mut nas = Map::new();
    if !volume.export_policy.is_empty() {
        nas.insert("export_policy".into(), json!({ "name": volume.export_policy }));
    }
    if !volume.unix_permissions.is_empty() {
        nas.insert("unix_permissions".into(), permissions_value(&volume.unix_permissions));
    }
    if !volume.security_style.is_empty() {
        nas.insert("security_style".into(), json!(volume.security_style));
    }
    if !volume.junction_path.is_empty() {
        nas.insert("path".into(), json!(volume.junction_path));
    }
    if !nas.is_empty() {
        body.insert("nas".into(), Value::Object(nas));
    }

    if !volume.comment.is_empty() {
        body.insert("comment".into(), json!(volume.comment));
    }
    if !volume.snapshot_policy.is_empty() {
        body.insert("snapshot_policy".into(), json!({ "name": volume.snapshot_policy }));
    }
    if let Some(reserve) = volume.snapshot_reserve {
        body.insert("space".into(), json!({ "snapshot": { "reserve_percent": reserve } }));
    }
    if !volume.space_reserve.is_empty() {
        body.insert("guarantee".into(), json!({ "type": volume.space_reserve }));
    }
    if !volume.qos_policy_group.is_none() {
        body.insert("qos".into(), json!({ "policy": { "name": volume.qos_policy_group.name } }));
    }
    if !volume.tiering_policy.is_empty() {
        body.insert("tiering".into(), json!({ "policy": volume.tiering_policy }));
    }
    if let Some(encrypt) = volume.encrypt {
        body.insert("encryption".into(), json!({ "enabled": encrypt }));
    }
    if !volume.access_type.is_empty() {
        body.insert("type".into(), json!(volume.access_type));
    }
    Ok(Value::Object(body))
}

impl RestBackend {
    pub(super) fn require_style(&self, style: VolumeStyle) -> Result<()> {
        match style {
            VolumeStyle::FlexVol => Ok(()),
            VolumeStyle::FlexGroup => self.require(Feature::FlexGroups),
        }
    }

    async fn volume_records(&self, site: &CallSite<'_>, name: &str, style: Option<VolumeStyle>) -> Result<Vec<Value>> {
        let mut request = self
            .scoped(RestRequest::get("/storage/volumes"))
            .query("name", name)
            .fields(VOLUME_FIELDS);
        if let Some(style) = style {
            request = request.query("style", style);
        }
        self.collect(site, request).await
    }

    async fn find_volumes(&self, site: &CallSite<'_>, name: &str, style: Option<VolumeStyle>) -> Result<Vec<Volume>> {
        let records = self.volume_records(site, name, style).await?;
        let volumes = records.iter().map(parse_volume).filter(|v| !v.name.is_empty());
        Ok(pagination::assemble(volumes, |v| v.name.clone()))
    }

    async fn find_volume(&self, site: &CallSite<'_>, name: &str, style: Option<VolumeStyle>) -> Result<Option<Volume>> {
        Ok(self
            .find_volumes(site, name, style)
            .await?
            .into_iter()
            .find(|v| v.name == name))
    }

    async fn volume_info_styled(&self, site: &CallSite<'_>, name: &str, style: VolumeStyle) -> Result<Volume> {
        self.find_volume(site, name, Some(style))
            .await?
            .ok_or_else(|| Error::not_found(style.kind(), name))
    }

    /// UUID of the named volume, or `None` when absent
    async fn volume_uuid(&self, site: &CallSite<'_>, name: &str, style: VolumeStyle) -> Result<Option<String>> {
        let request = self
            .scoped(RestRequest::get("/storage/volumes"))
            .query("name", name)
            .query("style", style)
            .fields(&["uuid", "name"]);
        let records = self.collect(site, request).await?;
        match records.iter().find(|r| str_at(r, "/name") == name) {
            Some(record) => uuid_of(site, record, "/uuid").map(Some),
            None => Ok(None),
        }
    }

    async fn require_volume_uuid(&self, site: &CallSite<'_>, name: &str, style: VolumeStyle) -> Result<String> {
        self.volume_uuid(site, name, style)
            .await?
            .ok_or_else(|| Error::not_found(style.kind(), name))
    }

    async fn create_styled(&self, site: &CallSite<'_>, volume: &Volume) -> Result<()> {
        for feature in volume.required_features() {
            self.require(feature)?;
        }

        if let Some(existing) = self.find_volume(site, &volume.name, None).await? {
            return match volume.conflicts_with(&existing) {
                Some(reason) => Err(Error::conflict(volume.style.kind(), &volume.name, reason)),
                None => {
                    debug!(volume = %volume.name, style = %volume.style, "Volume already exists");
                    Ok(())
                }
            };
        }

        let body = create_body(&self.svm, volume)?;
        match self.mutate(site, RestRequest::post("/storage/volumes", body)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => {
                let existing = self.volume_info_styled(site, &volume.name, volume.style).await?;
                match volume.conflicts_with(&existing) {
                    Some(reason) => Err(Error::conflict(volume.style.kind(), &volume.name, reason)),
                    None => Ok(()),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn destroy_styled(&self, site: &CallSite<'_>, name: &str, style: VolumeStyle, force: bool) -> Result<()> {
        let Some(uuid) = self.volume_uuid(site, name, style).await? else {
            debug!(volume = name, style = %style, "Volume already deleted");
            return Ok(());
        };
        if force {
            // Clear the junction first so a mounted volume can go
            let unmount = RestRequest::patch(format!("/storage/volumes/{}", uuid), json!({ "nas": { "path": "" } }));
            match self.mutate(site, unmount).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        match self.mutate(site, RestRequest::delete(format!("/storage/volumes/{}", uuid))).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn patch_styled(&self, site: &CallSite<'_>, name: &str, style: VolumeStyle, body: Value) -> Result<()> {
        let uuid = self.require_volume_uuid(site, name, style).await?;
        self.mutate(site, RestRequest::patch(format!("/storage/volumes/{}", uuid), body))
            .await
            .map(|_| ())
    }

    async fn set_qos_styled(&self, site: &CallSite<'_>, name: &str, style: VolumeStyle, qos: &QosPolicyGroup) -> Result<()> {
        if let Some(feature) = qos.required_feature() {
            self.require(feature)?;
        }
        let policy = if qos.is_none() { "none" } else { qos.name.as_str() };
        self.patch_styled(site, name, style, json!({ "qos": { "policy": { "name": policy } } }))
            .await
    }

    async fn clone_styled(
        &self,
        site: &CallSite<'_>,
        clone: &str,
        style: VolumeStyle,
        source: &str,
        snapshot: &str,
    ) -> Result<()> {
        if self.find_volume(site, clone, Some(style)).await?.is_some() {
            debug!(clone, source, "Clone already exists");
            return Ok(());
        }

        let mut clone_spec = json!({
            "parent_volume": { "name": source },
            "is_flexclone": true,
        });
        if !snapshot.is_empty() {
            clone_spec["parent_snapshot"] = json!({ "name": snapshot });
        }
        let body = json!({
            "name": clone,
            "svm": { "name": self.svm },
            "clone": clone_spec,
        });
        match self.mutate(site, RestRequest::post("/storage/volumes", body)).await {
            Err(e) if e.is_already_exists() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn list_by_snapshot_parent_styled(
        &self,
        site: &CallSite<'_>,
        style: VolumeStyle,
        snapshot: &str,
        source: &str,
    ) -> Result<Vec<String>> {
        let request = self
            .scoped(RestRequest::get("/storage/volumes"))
            .query("style", style)
            .query("clone.parent_volume.name", source)
            .query("clone.parent_snapshot.name", snapshot)
            .fields(&["name"]);
        let records = self.collect(site, request).await?;
        let names = records.iter().map(|r| str_at(r, "/name")).filter(|n| !n.is_empty());
        Ok(pagination::assemble(names, String::clone))
    }
}

// =============================================================================
// FlexVol
// =============================================================================

#[async_trait]
impl VolumeApi for RestBackend {
    async fn volume_create(&self, ctx: &RequestContext, volume: &Volume) -> Result<()> {
        self.facade
            .call(ctx, "VolumeCreate", &volume.name, async {
                let site = CallSite::new("VolumeCreate", "volume", &volume.name);
                let mut volume = volume.clone();
                volume.style = VolumeStyle::FlexVol;
                self.create_styled(&site, &volume).await
            })
            .await
    }

    async fn volume_exists(&self, ctx: &RequestContext, name: &str) -> Result<bool> {
        self.facade
            .call(ctx, "VolumeExists", name, async {
                let site = CallSite::new("VolumeExists", "volume", name);
                Ok(self.volume_uuid(&site, name, VolumeStyle::FlexVol).await?.is_some())
            })
            .await
    }

    async fn volume_info(&self, ctx: &RequestContext, name: &str) -> Result<Volume> {
        self.facade
            .call(ctx, "VolumeInfo", name, async {
                let site = CallSite::new("VolumeInfo", "volume", name);
                self.volume_info_styled(&site, name, VolumeStyle::FlexVol).await
            })
            .await
    }

    async fn volume_list_by_prefix(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<Volume>> {
        self.facade
            .call(ctx, "VolumeListByPrefix", prefix, async {
                let site = CallSite::new("VolumeListByPrefix", "volume", prefix);
                let pattern = format!("{}*", prefix);
                self.find_volumes(&site, &pattern, Some(VolumeStyle::FlexVol)).await
            })
            .await
    }

    async fn volume_list_by_snapshot_parent(
        &self,
        ctx: &RequestContext,
        snapshot: &str,
        source: &str,
    ) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "VolumeListBySnapshotParent", source, async {
                let site = CallSite::new("VolumeListBySnapshotParent", "volume", source);
                self.list_by_snapshot_parent_styled(&site, VolumeStyle::FlexVol, snapshot, source)
                    .await
            })
            .await
    }

    async fn volume_destroy(&self, ctx: &RequestContext, name: &str, force: bool) -> Result<()> {
        self.facade
            .call(ctx, "VolumeDestroy", name, async {
                let site = CallSite::new("VolumeDestroy", "volume", name);
                self.destroy_styled(&site, name, VolumeStyle::FlexVol, force).await
            })
            .await
    }

    async fn volume_mount(&self, ctx: &RequestContext, name: &str, junction_path: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeMount", name, async {
                let site = CallSite::new("VolumeMount", "volume", name);
                self.patch_styled(&site, name, VolumeStyle::FlexVol, json!({ "nas": { "path": junction_path } }))
                    .await
            })
            .await
    }

    async fn volume_unmount(&self, ctx: &RequestContext, name: &str, _force: bool) -> Result<()> {
        self.facade
            .call(ctx, "VolumeUnmount", name, async {
                let site = CallSite::new("VolumeUnmount", "volume", name);
                self.patch_styled(&site, name, VolumeStyle::FlexVol, json!({ "nas": { "path": "" } }))
                    .await
            })
            .await
    }

    async fn volume_rename(&self, ctx: &RequestContext, name: &str, new_name: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeRename", name, async {
                let site = CallSite::new("VolumeRename", "volume", name);
                self.patch_styled(&site, name, VolumeStyle::FlexVol, json!({ "name": new_name }))
                    .await
            })
            .await
    }

    async fn volume_set_comment(&self, ctx: &RequestContext, name: &str, comment: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeSetComment", name, async {
                let site = CallSite::new("VolumeSetComment", "volume", name);
                self.patch_styled(&site, name, VolumeStyle::FlexVol, json!({ "comment": comment }))
                    .await
            })
            .await
    }

    async fn volume_modify_unix_permissions(
        &self,
        ctx: &RequestContext,
        name: &str,
        unix_permissions: &str,
    ) -> Result<()> {
        self.facade
            .call(ctx, "VolumeModifyUnixPermissions", name, async {
                let site = CallSite::new("VolumeModifyUnixPermissions", "volume", name);
                let body = json!({ "nas": { "unix_permissions": permissions_value(unix_permissions) } });
                self.patch_styled(&site, name, VolumeStyle::FlexVol, body).await
            })
            .await
    }

    async fn volume_modify_export_policy(&self, ctx: &RequestContext, name: &str, policy: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeModifyExportPolicy", name, async {
                let site = CallSite::new("VolumeModifyExportPolicy", "volume", name);
                let body = json!({ "nas": { "export_policy": { "name": policy } } });
                self.patch_styled(&site, name, VolumeStyle::FlexVol, body).await
            })
            .await
    }

    async fn volume_disable_snapshot_directory_access(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeDisableSnapshotDirectoryAccess", name, async {
                let site = CallSite::new("VolumeDisableSnapshotDirectoryAccess", "volume", name);
                let body = json!({ "snapshot_directory_access_enabled": false });
                self.patch_styled(&site, name, VolumeStyle::FlexVol, body).await
            })
            .await
    }

    async fn volume_set_qos_policy_group_name(
        &self,
        ctx: &RequestContext,
        name: &str,
        qos: &QosPolicyGroup,
    ) -> Result<()> {
        self.facade
            .call(ctx, "VolumeSetQosPolicyGroupName", name, async {
                let site = CallSite::new("VolumeSetQosPolicyGroupName", "volume", name);
                self.set_qos_styled(&site, name, VolumeStyle::FlexVol, qos).await
            })
            .await
    }

    async fn volume_set_size(&self, ctx: &RequestContext, name: &str, size: u64) -> Result<()> {
        self.facade
            .call(ctx, "VolumeSetSize", name, async {
                let site = CallSite::new("VolumeSetSize", "volume", name);
                self.patch_styled(&site, name, VolumeStyle::FlexVol, json!({ "size": size }))
                    .await
            })
            .await
    }

    async fn volume_size(&self, ctx: &RequestContext, name: &str) -> Result<u64> {
        self.facade
            .call(ctx, "VolumeSize", name, async {
                let site = CallSite::new("VolumeSize", "volume", name);
                Ok(self.volume_info_styled(&site, name, VolumeStyle::FlexVol).await?.size)
            })
            .await
    }

    async fn volume_used_size(&self, ctx: &RequestContext, name: &str) -> Result<u64> {
        self.facade
            .call(ctx, "VolumeUsedSize", name, async {
                let site = CallSite::new("VolumeUsedSize", "volume", name);
                Ok(self.volume_info_styled(&site, name, VolumeStyle::FlexVol).await?.used)
            })
            .await
    }

    async fn volume_clone_create(
        &self,
        ctx: &RequestContext,
        clone: &str,
        source: &str,
        snapshot: &str,
        async_clone: bool,
    ) -> Result<()> {
        self.facade
            .call(ctx, "VolumeCloneCreate", clone, async {
                if async_clone {
                    self.require(Feature::VolumeCloneAsync)?;
                }
                let site = CallSite::new("VolumeCloneCreate", "volume", clone);
                self.clone_styled(&site, clone, VolumeStyle::FlexVol, source, snapshot).await
            })
            .await
    }

    async fn volume_clone_split_start(&self, ctx: &RequestContext, clone: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeCloneSplitStart", clone, async {
                let site = CallSite::new("VolumeCloneSplitStart", "volume", clone);
                let body = json!({ "clone": { "split_initiated": true } });
                self.patch_styled(&site, clone, VolumeStyle::FlexVol, body).await
            })
            .await
    }

    async fn volume_get_type(&self, ctx: &RequestContext, name: &str) -> Result<String> {
        self.facade
            .call(ctx, "VolumeGetType", name, async {
                let site = CallSite::new("VolumeGetType", "volume", name);
                Ok(self.volume_info_styled(&site, name, VolumeStyle::FlexVol).await?.access_type)
            })
            .await
    }
}

// =============================================================================
// FlexGroup
// =============================================================================

#[async_trait]
impl FlexgroupApi for RestBackend {
    async fn flexgroup_create(&self, ctx: &RequestContext, volume: &Volume) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupCreate", &volume.name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupCreate", "flexgroup", &volume.name);
                let mut volume = volume.clone();
                volume.style = VolumeStyle::FlexGroup;
                self.create_styled(&site, &volume).await
            })
            .await
    }

    async fn flexgroup_exists(&self, ctx: &RequestContext, name: &str) -> Result<bool> {
        self.facade
            .call(ctx, "FlexgroupExists", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupExists", "flexgroup", name);
                Ok(self.volume_uuid(&site, name, VolumeStyle::FlexGroup).await?.is_some())
            })
            .await
    }

    async fn flexgroup_info(&self, ctx: &RequestContext, name: &str) -> Result<Volume> {
        self.facade
            .call(ctx, "FlexgroupInfo", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupInfo", "flexgroup", name);
                self.volume_info_styled(&site, name, VolumeStyle::FlexGroup).await
            })
            .await
    }

    async fn flexgroup_list_by_prefix(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<Volume>> {
        self.facade
            .call(ctx, "FlexgroupListByPrefix", prefix, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupListByPrefix", "flexgroup", prefix);
                let pattern = format!("{}*", prefix);
                self.find_volumes(&site, &pattern, Some(VolumeStyle::FlexGroup)).await
            })
            .await
    }

    async fn flexgroup_list_by_snapshot_parent(
        &self,
        ctx: &RequestContext,
        snapshot: &str,
        source: &str,
    ) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "FlexgroupListBySnapshotParent", source, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupListBySnapshotParent", "flexgroup", source);
                self.list_by_snapshot_parent_styled(&site, VolumeStyle::FlexGroup, snapshot, source)
                    .await
            })
            .await
    }

    async fn flexgroup_destroy(&self, ctx: &RequestContext, name: &str, force: bool) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupDestroy", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupDestroy", "flexgroup", name);
                self.destroy_styled(&site, name, VolumeStyle::FlexGroup, force).await
            })
            .await
    }

    async fn flexgroup_mount(&self, ctx: &RequestContext, name: &str, junction_path: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupMount", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupMount", "flexgroup", name);
                let body = json!({ "nas": { "path": junction_path } });
                self.patch_styled(&site, name, VolumeStyle::FlexGroup, body).await
            })
            .await
    }

    async fn flexgroup_unmount(&self, ctx: &RequestContext, name: &str, _force: bool) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupUnmount", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupUnmount", "flexgroup", name);
                self.patch_styled(&site, name, VolumeStyle::FlexGroup, json!({ "nas": { "path": "" } }))
                    .await
            })
            .await
    }

    async fn flexgroup_rename(&self, ctx: &RequestContext, name: &str, new_name: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupRename", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupRename", "flexgroup", name);
                self.patch_styled(&site, name, VolumeStyle::FlexGroup, json!({ "name": new_name }))
                    .await
            })
            .await
    }

    async fn flexgroup_set_comment(&self, ctx: &RequestContext, name: &str, comment: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupSetComment", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupSetComment", "flexgroup", name);
                self.patch_styled(&site, name, VolumeStyle::FlexGroup, json!({ "comment": comment }))
                    .await
            })
            .await
    }

    async fn flexgroup_modify_unix_permissions(
        &self,
        ctx: &RequestContext,
        name: &str,
        unix_permissions: &str,
    ) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupModifyUnixPermissions", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupModifyUnixPermissions", "flexgroup", name);
                let body = json!({ "nas": { "unix_permissions": permissions_value(unix_permissions) } });
                self.patch_styled(&site, name, VolumeStyle::FlexGroup, body).await
            })
            .await
    }

    async fn flexgroup_modify_export_policy(&self, ctx: &RequestContext, name: &str, policy: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupModifyExportPolicy", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupModifyExportPolicy", "flexgroup", name);
                let body = json!({ "nas": { "export_policy": { "name": policy } } });
                self.patch_styled(&site, name, VolumeStyle::FlexGroup, body).await
            })
            .await
    }

    async fn flexgroup_disable_snapshot_directory_access(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupDisableSnapshotDirectoryAccess", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupDisableSnapshotDirectoryAccess", "flexgroup", name);
                let body = json!({ "snapshot_directory_access_enabled": false });
                self.patch_styled(&site, name, VolumeStyle::FlexGroup, body).await
            })
            .await
    }

    async fn flexgroup_set_qos_policy_group_name(
        &self,
        ctx: &RequestContext,
        name: &str,
        qos: &QosPolicyGroup,
    ) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupSetQosPolicyGroupName", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupSetQosPolicyGroupName", "flexgroup", name);
                self.set_qos_styled(&site, name, VolumeStyle::FlexGroup, qos).await
            })
            .await
    }

    async fn flexgroup_set_size(&self, ctx: &RequestContext, name: &str, size: u64) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupSetSize", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupSetSize", "flexgroup", name);
                self.patch_styled(&site, name, VolumeStyle::FlexGroup, json!({ "size": size }))
                    .await
            })
            .await
    }

    async fn flexgroup_size(&self, ctx: &RequestContext, name: &str) -> Result<u64> {
        self.facade
            .call(ctx, "FlexgroupSize", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupSize", "flexgroup", name);
                Ok(self.volume_info_styled(&site, name, VolumeStyle::FlexGroup).await?.size)
            })
            .await
    }

    async fn flexgroup_used_size(&self, ctx: &RequestContext, name: &str) -> Result<u64> {
        self.facade
            .call(ctx, "FlexgroupUsedSize", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupUsedSize", "flexgroup", name);
                Ok(self.volume_info_styled(&site, name, VolumeStyle::FlexGroup).await?.used)
            })
            .await
    }

    async fn flexgroup_clone_create(
        &self,
        ctx: &RequestContext,
        clone: &str,
        source: &str,
        snapshot: &str,
    ) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupCloneCreate", clone, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                self.require(Feature::FlexGroupClone)?;
                let site = CallSite::new("FlexgroupCloneCreate", "flexgroup", clone);
                self.clone_styled(&site, clone, VolumeStyle::FlexGroup, source, snapshot).await
            })
            .await
    }

    async fn flexgroup_clone_split_start(&self, ctx: &RequestContext, clone: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupCloneSplitStart", clone, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                self.require(Feature::FlexGroupClone)?;
                let site = CallSite::new("FlexgroupCloneSplitStart", "flexgroup", clone);
                let body = json!({ "clone": { "split_initiated": true } });
                self.patch_styled(&site, clone, VolumeStyle::FlexGroup, body).await
            })
            .await
    }

    async fn flexgroup_get_type(&self, ctx: &RequestContext, name: &str) -> Result<String> {
        self.facade
            .call(ctx, "FlexgroupGetType", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupGetType", "flexgroup", name);
                Ok(self.volume_info_styled(&site, name, VolumeStyle::FlexGroup).await?.access_type)
            })
            .await
    }
}
