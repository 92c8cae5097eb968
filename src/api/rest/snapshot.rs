use super::{str_at, uuid_of, RestBackend, RestRequest};
use crate::api::abstraction::SnapshotApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::pagination;
use crate::api::types::{Snapshot, VolumeStyle};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

impl RestBackend {
    async fn snapshot_volume_uuid(&self, site: &CallSite<'_>, volume: &str) -> Result<Option<String>> {
        let request = self
            .scoped(RestRequest::get("/storage/volumes"))
            .query("name", volume)
            .fields(&["uuid", "name"]);
        let records = self.collect(site, request).await?;
        match records.iter().find(|r| str_at(r, "/name") == volume) {
            Some(record) => uuid_of(site, record, "/uuid").map(Some),
            None => Ok(None),
        }
    }

    async fn snapshot_records(&self, site: &CallSite<'_>, volume_uuid: &str, name: Option<&str>) -> Result<Vec<Snapshot>> {
        let mut request =
            RestRequest::get(format!("/storage/volumes/{}/snapshots", volume_uuid)).fields(&["name", "create_time", "uuid"]);
        if let Some(name) = name {
            request = request.query("name", name);
        }
        let records = self.collect(site, request).await?;
        Ok(records
            .iter()
            .map(|r| Snapshot {
                name: str_at(r, "/name"),
                volume: String::new(),
                create_time: str_at(r, "/create_time"),
            })
            .filter(|s| !s.name.is_empty())
            .collect())
    }

    async fn snapshot_uuid(&self, site: &CallSite<'_>, volume_uuid: &str, snapshot: &str) -> Result<Option<String>> {
        let request = RestRequest::get(format!("/storage/volumes/{}/snapshots", volume_uuid))
            .query("name", snapshot)
            .fields(&["uuid", "name"]);
        let records = self.collect(site, request).await?;
        match records.iter().find(|r| str_at(r, "/name") == snapshot) {
            Some(record) => uuid_of(site, record, "/uuid").map(Some),
            None => Ok(None),
        }
    }

    async fn snapshot_create_styled(&self, site: &CallSite<'_>, snapshot: &str, volume: &str) -> Result<()> {
        let volume_uuid = self
            .snapshot_volume_uuid(site, volume)
            .await?
            .ok_or_else(|| Error::not_found("volume", volume))?;

        if !self.snapshot_records(site, &volume_uuid, Some(snapshot)).await?.is_empty() {
            debug!(snapshot, volume, "Snapshot already exists");
            return Ok(());
        }

        let request = RestRequest::post(
            format!("/storage/volumes/{}/snapshots", volume_uuid),
            json!({ "name": snapshot }),
        );
        match self.mutate(site, request).await {
            Err(e) if e.is_already_exists() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn snapshot_list_styled(&self, site: &CallSite<'_>, volume: &str) -> Result<Vec<Snapshot>> {
        let volume_uuid = self
            .snapshot_volume_uuid(site, volume)
            .await?
            .ok_or_else(|| Error::not_found("volume", volume))?;
        let snapshots = self
            .snapshot_records(site, &volume_uuid, None)
            .await?
            .into_iter()
            .map(|s| Snapshot {
                volume: volume.to_string(),
                ..s
            });
        Ok(pagination::assemble(snapshots, |s| s.name.clone()))
    }

    async fn snapshot_delete_styled(&self, site: &CallSite<'_>, snapshot: &str, volume: &str) -> Result<()> {
        let Some(volume_uuid) = self.snapshot_volume_uuid(site, volume).await? else {
            debug!(snapshot, volume, "Volume gone, snapshot already deleted");
            return Ok(());
        };
        let Some(snapshot_uuid) = self.snapshot_uuid(site, &volume_uuid, snapshot).await? else {
            debug!(snapshot, volume, "Snapshot already deleted");
            return Ok(());
        };
        let request = RestRequest::delete(format!("/storage/volumes/{}/snapshots/{}", volume_uuid, snapshot_uuid));
        match self.mutate(site, request).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn snapshot_restore_styled(&self, site: &CallSite<'_>, snapshot: &str, volume: &str) -> Result<()> {
        let volume_uuid = self
            .snapshot_volume_uuid(site, volume)
            .await?
            .ok_or_else(|| Error::not_found("volume", volume))?;
        let request = RestRequest::patch(
            format!("/storage/volumes/{}", volume_uuid),
            json!({ "restore_to": { "snapshot": { "name": snapshot } } }),
        );
        self.mutate(site, request).await.map(|_| ())
    }
}

#[async_trait]
impl SnapshotApi for RestBackend {
    async fn volume_snapshot_create(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeSnapshotCreate", snapshot, async {
                let site = CallSite::new("VolumeSnapshotCreate", "snapshot", snapshot);
                self.snapshot_create_styled(&site, snapshot, volume).await
            })
            .await
    }

    async fn volume_snapshot_list(&self, ctx: &RequestContext, volume: &str) -> Result<Vec<Snapshot>> {
        self.facade
            .call(ctx, "VolumeSnapshotList", volume, async {
                let site = CallSite::new("VolumeSnapshotList", "snapshot", volume);
                self.snapshot_list_styled(&site, volume).await
            })
            .await
    }

    async fn volume_snapshot_delete(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()> {
        self.facade
            .call(ctx, "VolumeSnapshotDelete", snapshot, async {
                let site = CallSite::new("VolumeSnapshotDelete", "snapshot", snapshot);
                self.snapshot_delete_styled(&site, snapshot, volume).await
            })
            .await
    }

    async fn flexgroup_snapshot_create(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupSnapshotCreate", snapshot, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupSnapshotCreate", "snapshot", snapshot);
                self.snapshot_create_styled(&site, snapshot, volume).await
            })
            .await
    }

    async fn flexgroup_snapshot_list(&self, ctx: &RequestContext, volume: &str) -> Result<Vec<Snapshot>> {
        self.facade
            .call(ctx, "FlexgroupSnapshotList", volume, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupSnapshotList", "snapshot", volume);
                self.snapshot_list_styled(&site, volume).await
            })
            .await
    }

    async fn flexgroup_snapshot_delete(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()> {
        self.facade
            .call(ctx, "FlexgroupSnapshotDelete", snapshot, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("FlexgroupSnapshotDelete", "snapshot", snapshot);
                self.snapshot_delete_styled(&site, snapshot, volume).await
            })
            .await
    }

    async fn snapshot_restore_volume(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()> {
        self.facade
            .call(ctx, "SnapshotRestoreVolume", volume, async {
                let site = CallSite::new("SnapshotRestoreVolume", "snapshot", snapshot);
                self.snapshot_restore_styled(&site, snapshot, volume).await
            })
            .await
    }

    async fn snapshot_restore_flexgroup(&self, ctx: &RequestContext, snapshot: &str, volume: &str) -> Result<()> {
        self.facade
            .call(ctx, "SnapshotRestoreFlexgroup", volume, async {
                self.require_style(VolumeStyle::FlexGroup)?;
                let site = CallSite::new("SnapshotRestoreFlexgroup", "snapshot", snapshot);
                self.snapshot_restore_styled(&site, snapshot, volume).await
            })
            .await
    }
}
