use super::{query, ZapiBackend, ZapiElement};
use crate::api::abstraction::SnapshotApi;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::pagination;
use crate::api::types::{Snapshot, VolumeStyle};
use crate::error::Result;
use async_trait::async_trait;
use tracing::debug;

impl ZapiBackend {
    async fn snapshot_create_styled(&self, site: &CallSite<'_>, snapshot: &str, volume: &str) -> Result<()> {
        let request = ZapiElement::new("snapshot-create")
            .child("volume", volume)
            .child("snapshot", snapshot);
        match self.invoke(site, request).await {
            Err(e) if e.is_already_exists() => {
                debug!(snapshot, volume, "Snapshot already exists");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    async fn snapshot_list_styled(&self, site: &CallSite<'_>, volume: &str) -> Result<Vec<Snapshot>> {
        let records = self
            .iterate(site, || {
                ZapiElement::new("snapshot-get-iter").push(query(
                    ZapiElement::new("snapshot-info")
                        .child("volume", volume)
                        .child("vserver", &self.svm),
                ))
            })
            .await?;
        let snapshots = records
            .iter()
            .filter(|r| r.text_of("volume") == Some(volume))
            .map(|r| Snapshot {
                name: r.path_string(&["name"]),
                volume: volume.to_string(),
                create_time: r.path_string(&["access-time"]),
            });
        Ok(pagination::assemble(snapshots, |s| s.name.clone()))
    }

    async fn snapshot_delete_styled(&self, site: &CallSite<'_>, snapshot: &str, volume: &str) -> Result<()> {
        let request = ZapiElement::new("snapshot-delete")
            .child("volume", volume)
            .child("snapshot", snapshot);
        match self.invoke(site, request).await {
            Err(e) if e.is_not_found() => {
                debug!(snapshot, volume, "Snapshot already deleted");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    async fn snapshot_restore_styled(&self, site: &CallSite<'_>, snapshot: &str, volume: &str) -> Result<()> {
        let request = ZapiElement::new("snapshot-restore-volume")
            .child("volume", volume)
            .child("snapshot", snapshot);
        self.invoke(site, request).await.map(|_| ())
    }
}

#[async_trait]
impl SnapshotApi for ZapiBackend {
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
