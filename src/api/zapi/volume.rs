//! ZAPI FlexVol and FlexGroup management
//!
//! Both styles share one set of helpers keyed by [`VolumeStyle`]. FlexGroup
//! calls use the `-async` variants and wait for the resulting job.

use super::{query, ZapiBackend, ZapiElement};
use crate::api::abstraction::{FlexgroupApi, VolumeApi};
use crate::api::capability::Feature;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::pagination;
use crate::api::types::{QosPolicyGroup, QosPolicyGroupKind, Volume, VolumeStyle};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

const ID: &str = "volume-id-attributes";

fn id_query(name: &str, style: Option<VolumeStyle>) -> ZapiElement {
    let mut id = ZapiElement::new(ID).child("name", name);
    if let Some(style) = style {
        id = id.child("style-extended", style);
    }
    query(ZapiElement::new("volume-attributes").push(id))
}

fn parse_volume(record: &ZapiElement) -> Volume {
    let style = match record.path_text(&[ID, "style-extended"]) {
        Some("flexgroup") => VolumeStyle::FlexGroup,
        _ => VolumeStyle::FlexVol,
    };

    let mut aggregates: Vec<String> = record
        .path(&[ID, "aggr-list"])
        .map(|list| list.children().iter().filter_map(ZapiElement::text).map(str::to_string).collect())
        .unwrap_or_default();
    if aggregates.is_empty() {
        if let Some(aggr) = record.path_text(&[ID, "containing-aggregate-name"]) {
            aggregates.push(aggr.to_string());
        }
    }

    let qos = match (
        record.path_text(&["volume-qos-attributes", "policy-group-name"]),
        record.path_text(&["volume-qos-attributes", "adaptive-policy-group-name"]),
    ) {
        (Some(name), _) if name != "none" => QosPolicyGroup::fixed(name),
        (_, Some(name)) if name != "none" => QosPolicyGroup::adaptive(name),
        _ => QosPolicyGroup::none(),
    };

    Volume {
        name: record.path_string(&[ID, "name"]),
        style,
        aggregates,
        size: record.path_u64(&["volume-space-attributes", "size"]).unwrap_or(0),
        used: record.path_u64(&["volume-space-attributes", "size-used"]).unwrap_or(0),
        comment: record.path_string(&[ID, "comment"]),
        export_policy: record.path_string(&["volume-export-attributes", "policy"]),
        unix_permissions: record.path_string(&[
            "volume-security-attributes",
            "volume-security-unix-attributes",
            "permissions",
        ]),
        security_style: record.path_string(&["volume-security-attributes", "style"]),
        snapshot_policy: record.path_string(&["volume-snapshot-attributes", "snapshot-policy"]),
        snapshot_reserve: record
            .path_u64(&["volume-space-attributes", "percentage-snapshot-reserve"])
            .map(|v| v as u32),
        snapshot_directory_access: record
            .path_bool(&["volume-snapshot-attributes", "snapdir-access-enabled"])
            .unwrap_or(false),
        space_reserve: record.path_string(&["volume-space-attributes", "space-guarantee"]),
        junction_path: record.path_string(&[ID, "junction-path"]),
        qos_policy_group: qos,
        tiering_policy: record.path_string(&["volume-comp-aggr-attributes", "tiering-policy"]),
        encrypt: record.path_bool(&["encrypt"]),
        access_type: record.path_string(&[ID, "type"]),
    }
}

fn qos_element(qos: &QosPolicyGroup) -> ZapiElement {
    match qos.kind {
        QosPolicyGroupKind::Adaptive => ZapiElement::new("volume-qos-attributes")
            .child("adaptive-policy-group-name", &qos.name),
        _ if qos.is_none() => ZapiElement::new("volume-qos-attributes").child("policy-group-name", "none"),
        _ => ZapiElement::new("volume-qos-attributes").child("policy-group-name", &qos.name),
    }
}

fn create_request(volume: &Volume) -> Result<ZapiElement> {
    let mut request = match volume.style {
        VolumeStyle::FlexVol => {
            let aggregate = volume
                .aggregates
                .first()
                .ok_or_else(|| Error::InvalidArgument(format!("volume {} needs an aggregate", volume.name)))?;
            ZapiElement::new("volume-create")
                .child("volume", &volume.name)
                .child("containing-aggr-name", aggregate)
        }
        VolumeStyle::FlexGroup => {
            if volume.aggregates.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "flexgroup {} needs at least one aggregate",
                    volume.name
                )));
            }
            let mut aggr_list = ZapiElement::new("aggr-list");
            for aggregate in &volume.aggregates {
                aggr_list.add(ZapiElement::leaf("aggr-name", aggregate));
            }
            ZapiElement::new("volume-create-async")
                .child("volume-name", &volume.name)
                .push(aggr_list)
        }
    };

    request = request
        .child("size", volume.size)
        .child_opt("volume-comment", &volume.comment)
        .child_opt("export-policy", &volume.export_policy)
        .child_opt("unix-permissions", &volume.unix_permissions)
        .child_opt("volume-security-style", &volume.security_style)
        .child_opt("snapshot-policy", &volume.snapshot_policy)
        .child_opt("space-reserve", &volume.space_reserve)
        .child_opt("junction-path", &volume.junction_path)
        .child_opt("tiering-policy", &volume.tiering_policy)
        .child_opt("volume-type", &volume.access_type);

    if let Some(reserve) = volume.snapshot_reserve {
        request = request.child("percentage-snapshot-reserve", reserve);
    }
    if let Some(encrypt) = volume.encrypt {
        request = request.child("encrypt", encrypt);
    }
    if !volume.qos_policy_group.is_none() {
        request = match volume.qos_policy_group.kind {
            QosPolicyGroupKind::Adaptive => {
                request.child("qos-adaptive-policy-group-name", &volume.qos_policy_group.name)
            }
            _ => request.child("qos-policy-group-name", &volume.qos_policy_group.name),
        };
    }
    Ok(request)
}

impl ZapiBackend {
    pub(super) fn require_style(&self, style: VolumeStyle) -> Result<()> {
        match style {
            VolumeStyle::FlexVol => Ok(()),
            VolumeStyle::FlexGroup => self.require(Feature::FlexGroups),
        }
    }

    async fn find_volumes(
        &self,
        site: &CallSite<'_>,
        name: &str,
        style: Option<VolumeStyle>,
    ) -> Result<Vec<Volume>> {
        let records = self.iterate(site, || ZapiElement::new("volume-get-iter").push(id_query(name, style))).await?;
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

    async fn create_styled(&self, site: &CallSite<'_>, volume: &Volume) -> Result<()> {
        for feature in volume.required_features() {
            self.require(feature)?;
        }

        let existing = self.find_volume(site, &volume.name, None).await?;
        if let Some(existing) = existing {
            return match volume.conflicts_with(&existing) {
                Some(reason) => Err(Error::conflict(volume.style.kind(), &volume.name, reason)),
                None => {
                    debug!(volume = %volume.name, style = %volume.style, "Volume already exists");
                    Ok(())
                }
            };
        }

        let request = create_request(volume)?;

        let outcome = match self.invoke(site, request).await {
            Ok(results) if volume.style == VolumeStyle::FlexGroup => self.wait_for_async(site, &results).await,
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        match outcome {
            Err(e) if e.is_already_exists() => {
                // Lost a race with another creator; accept only a compatible volume
                let existing = self.volume_info_styled(site, &volume.name, volume.style).await?;
                match volume.conflicts_with(&existing) {
                    Some(reason) => Err(Error::conflict(volume.style.kind(), &volume.name, reason)),
                    None => Ok(()),
                }
            }
            other => other,
        }
    }

    async fn destroy_styled(&self, site: &CallSite<'_>, name: &str, style: VolumeStyle, force: bool) -> Result<()> {
        let request = match style {
            VolumeStyle::FlexVol => ZapiElement::new("volume-destroy")
                .child("name", name)
                .child("unmount-and-offline", force),
            VolumeStyle::FlexGroup => ZapiElement::new("volume-destroy-async")
                .child("volume-name", name)
                .child("unmount-and-offline", force),
        };

        let outcome = match self.invoke(site, request).await {
            Ok(results) if style == VolumeStyle::FlexGroup => self.wait_for_async(site, &results).await,
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        match outcome {
            Err(e) if e.is_not_found() => {
                debug!(volume = name, style = %style, "Volume already deleted");
                Ok(())
            }
            other => other,
        }
    }

    async fn modify_styled(
        &self,
        site: &CallSite<'_>,
        name: &str,
        style: VolumeStyle,
        attributes: ZapiElement,
    ) -> Result<()> {
        let api = match style {
            VolumeStyle::FlexVol => "volume-modify-iter",
            VolumeStyle::FlexGroup => "volume-modify-iter-async",
        };
        let request = ZapiElement::new(api)
            .push(id_query(name, Some(style)))
            .push(ZapiElement::new("attributes").push(ZapiElement::new("volume-attributes").push(attributes)));
        let results = self.invoke(site, request).await?;
        self.check_iter_result(site, &results)
    }

    async fn mount_styled(&self, site: &CallSite<'_>, name: &str, junction_path: &str) -> Result<()> {
        let request = ZapiElement::new("volume-mount")
            .child("volume-name", name)
            .child("junction-path", junction_path);
        self.invoke(site, request).await.map(|_| ())
    }

    async fn unmount_styled(&self, site: &CallSite<'_>, name: &str, force: bool) -> Result<()> {
        let request = ZapiElement::new("volume-unmount")
            .child("volume-name", name)
            .child("force", force);
        self.invoke(site, request).await.map(|_| ())
    }

    async fn rename_styled(&self, site: &CallSite<'_>, name: &str, style: VolumeStyle, new_name: &str) -> Result<()> {
        match style {
            VolumeStyle::FlexVol => {
                let request = ZapiElement::new("volume-rename")
                    .child("volume", name)
                    .child("new-volume-name", new_name);
                self.invoke(site, request).await.map(|_| ())
            }
            VolumeStyle::FlexGroup => {
                let request = ZapiElement::new("volume-rename-async")
                    .child("volume-name", name)
                    .child("new-volume-name", new_name);
                let results = self.invoke(site, request).await?;
                self.wait_for_async(site, &results).await
            }
        }
    }

    async fn set_size_styled(&self, site: &CallSite<'_>, name: &str, style: VolumeStyle, size: u64) -> Result<()> {
        match style {
            VolumeStyle::FlexVol => {
                let request = ZapiElement::new("volume-size").child("volume", name).child("new-size", size);
                self.invoke(site, request).await.map(|_| ())
            }
            VolumeStyle::FlexGroup => {
                let request = ZapiElement::new("volume-size-async")
                    .child("volume-name", name)
                    .child("new-size", size);
                let results = self.invoke(site, request).await?;
                self.wait_for_async(site, &results).await
            }
        }
    }

    async fn set_qos_styled(
        &self,
        site: &CallSite<'_>,
        name: &str,
        style: VolumeStyle,
        qos: &QosPolicyGroup,
    ) -> Result<()> {
        if let Some(feature) = qos.required_feature() {
            self.require(feature)?;
        }
        self.modify_styled(site, name, style, qos_element(qos)).await
    }

    async fn clone_styled(
        &self,
        site: &CallSite<'_>,
        clone: &str,
        style: VolumeStyle,
        source: &str,
        snapshot: &str,
        async_clone: bool,
    ) -> Result<()> {
        if self.find_volume(site, clone, Some(style)).await?.is_some() {
            debug!(clone, source, "Clone already exists");
            return Ok(());
        }

        let api = if async_clone {
            "volume-clone-create-async"
        } else {
            "volume-clone-create"
        };
        let request = ZapiElement::new(api)
            .child("volume", clone)
            .child("parent-volume", source)
            .child_opt("parent-snapshot", snapshot);

        let outcome = match self.invoke(site, request).await {
            Ok(results) if async_clone => self.wait_for_async(site, &results).await,
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        match outcome {
            Err(e) if e.is_already_exists() => Ok(()),
            other => other,
        }
    }

    async fn clone_split_styled(&self, site: &CallSite<'_>, clone: &str) -> Result<()> {
        let request = ZapiElement::new("volume-clone-split-start").child("volume", clone);
        self.invoke(site, request).await.map(|_| ())
    }

    async fn list_by_snapshot_parent_styled(
        &self,
        site: &CallSite<'_>,
        style: VolumeStyle,
        snapshot: &str,
        source: &str,
    ) -> Result<Vec<String>> {
        let records = self
            .iterate(site, || {
                ZapiElement::new("volume-get-iter").push(query(
                    ZapiElement::new("volume-attributes")
                        .push(ZapiElement::new(ID).child("style-extended", style))
                        .push(
                            ZapiElement::new("volume-clone-attributes").push(
                                ZapiElement::new("volume-clone-parent-attributes")
                                    .child("name", source)
                                    .child("snapshot-name", snapshot),
                            ),
                        ),
                ))
            })
            .await?;
        let names = records.iter().map(|r| r.path_string(&[ID, "name"])).filter(|n| !n.is_empty());
        Ok(pagination::assemble(names, String::clone))
    }
}

fn comment_attributes(comment: &str) -> ZapiElement {
    ZapiElement::new(ID).child("comment", comment)
}

fn unix_permissions_attributes(permissions: &str) -> ZapiElement {
    ZapiElement::new("volume-security-attributes")
        .push(ZapiElement::new("volume-security-unix-attributes").child("permissions", permissions))
}

fn export_policy_attributes(policy: &str) -> ZapiElement {
    ZapiElement::new("volume-export-attributes").child("policy", policy)
}

fn snapdir_disabled_attributes() -> ZapiElement {
    ZapiElement::new("volume-snapshot-attributes").child("snapdir-access-enabled", false)
}

// =============================================================================
// FlexVol
// =============================================================================

#[async_trait]
impl VolumeApi for ZapiBackend {
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
                Ok(self.find_volume(&site, name, Some(VolumeStyle::FlexVol)).await?.is_some())
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
                self.mount_styled(&site, name, junction_path).await
            })
            .await
    }

    async fn volume_unmount(&self, ctx: &RequestContext, name: &str, force: bool) -> Result<()> {
        self.facade
            .call(ctx, "VolumeUnmount", name, async {
                let site = CallSite::new("VolumeUnmount", "volume", name);
                self.unmount_styled(&site, name, force).await
            })
            .await
    }

    async fn volume_rename(&self, ctx: &RequestContext, name: &str, new_name: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeRename", name, async {
                let site = CallSite::new("VolumeRename", "volume", name);
                self.rename_styled(&site, name, VolumeStyle::FlexVol, new_name).await
            })
            .await
    }

    async fn volume_set_comment(&self, ctx: &RequestContext, name: &str, comment: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeSetComment", name, async {
                let site = CallSite::new("VolumeSetComment", "volume", name);
                self.modify_styled(&site, name, VolumeStyle::FlexVol, comment_attributes(comment))
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
                let attributes = unix_permissions_attributes(unix_permissions);
                self.modify_styled(&site, name, VolumeStyle::FlexVol, attributes).await
            })
            .await
    }

    async fn volume_modify_export_policy(&self, ctx: &RequestContext, name: &str, policy: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeModifyExportPolicy", name, async {
                let site = CallSite::new("VolumeModifyExportPolicy", "volume", name);
                self.modify_styled(&site, name, VolumeStyle::FlexVol, export_policy_attributes(policy))
                    .await
            })
            .await
    }

    async fn volume_disable_snapshot_directory_access(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeDisableSnapshotDirectoryAccess", name, async {
                let site = CallSite::new("VolumeDisableSnapshotDirectoryAccess", "volume", name);
                self.modify_styled(&site, name, VolumeStyle::FlexVol, snapdir_disabled_attributes())
                    .await
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
                self.set_size_styled(&site, name, VolumeStyle::FlexVol, size).await
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
                self.clone_styled(&site, clone, VolumeStyle::FlexVol, source, snapshot, async_clone)
                    .await
            })
            .await
    }

    async fn volume_clone_split_start(&self, ctx: &RequestContext, clone: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeCloneSplitStart", clone, async {
                let site = CallSite::new("VolumeCloneSplitStart", "volume", clone);
                self.clone_split_styled(&site, clone).await
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
impl FlexgroupApi for ZapiBackend {
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
                Ok(self.find_volume(&site, name, Some(VolumeStyle::FlexGroup)).await?.is_some())
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
                self.mount_styled(&site, name, junction_path).await
            })
            .await
    }

    async fn flexgroup_unmount(&self, ctx: &RequestContext, name: &str, force: bool) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupUnmount", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupUnmount", "flexgroup", name);
                self.unmount_styled(&site, name, force).await
            })
            .await
    }

    async fn flexgroup_rename(&self, ctx: &RequestContext, name: &str, new_name: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupRename", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupRename", "flexgroup", name);
                self.rename_styled(&site, name, VolumeStyle::FlexGroup, new_name).await
            })
            .await
    }

    async fn flexgroup_set_comment(&self, ctx: &RequestContext, name: &str, comment: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupSetComment", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupSetComment", "flexgroup", name);
                self.modify_styled(&site, name, VolumeStyle::FlexGroup, comment_attributes(comment))
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
                let attributes = unix_permissions_attributes(unix_permissions);
                self.modify_styled(&site, name, VolumeStyle::FlexGroup, attributes).await
            })
            .await
    }

    async fn flexgroup_modify_export_policy(&self, ctx: &RequestContext, name: &str, policy: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupModifyExportPolicy", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupModifyExportPolicy", "flexgroup", name);
                self.modify_styled(&site, name, VolumeStyle::FlexGroup, export_policy_attributes(policy))
                    .await
            })
            .await
    }

    async fn flexgroup_disable_snapshot_directory_access(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupDisableSnapshotDirectoryAccess", name, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupDisableSnapshotDirectoryAccess", "flexgroup", name);
                self.modify_styled(&site, name, VolumeStyle::FlexGroup, snapdir_disabled_attributes())
                    .await
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
                self.set_size_styled(&site, name, VolumeStyle::FlexGroup, size).await
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
                self.clone_styled(&site, clone, VolumeStyle::FlexGroup, source, snapshot, true)
                    .await
            })
            .await
    }

    async fn flexgroup_clone_split_start(&self, ctx: &RequestContext, clone: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupCloneSplitStart", clone, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                self.require(Feature::FlexGroupClone)?;
                let site = CallSite::new("FlexgroupCloneSplitStart", "flexgroup", clone);
                self.clone_split_styled(&site, clone).await
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
