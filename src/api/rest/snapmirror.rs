//! REST SnapMirror relationships and policies
//!
//! State changes are PATCHes of the relationship's `state`; aborts target
//! the active transfer instead.

use super::{bool_at, str_at, u64_at, uuid_of, RestBackend, RestRequest};
use crate::api::abstraction::SnapmirrorApi;
use crate::api::capability::Feature;
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::replication::{self, Plan, Transition};
use crate::api::types::{
    SnapmirrorEndpoint, SnapmirrorPolicy, SnapmirrorPolicyType, SnapmirrorRelationship, SnapmirrorState,
    SnapmirrorStatus,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

const RELATIONSHIP_FIELDS: &[&str] = &[
    "uuid",
    "source.path",
    "destination.path",
    "state",
    "healthy",
    "unhealthy_reason",
    "policy.name",
    "transfer_schedule.name",
    "transfer.state",
    "transfer.uuid",
];

fn endpoint(record: &Value, side: &str) -> SnapmirrorEndpoint {
    let path = str_at(record, &format!("/{}/path", side));
    SnapmirrorEndpoint::from_path(&path).unwrap_or_else(|| SnapmirrorEndpoint::new("", path))
}

/// Reasons arrive as a list of `{ "message": ... }` objects
fn unhealthy_reason(record: &Value) -> String {
    match record.get("unhealthy_reason") {
        Some(Value::Array(reasons)) => reasons
            .iter()
            .map(|r| str_at(r, "/message"))
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Some(Value::String(reason)) => reason.clone(),
        _ => String::new(),
    }
}

fn parse_relationship(record: &Value) -> SnapmirrorRelationship {
    let state = SnapmirrorState::parse(&str_at(record, "/state"));
    // Without an active transfer the relationship is idle, or quiesced when paused
    let status = match str_at(record, "/transfer/state") {
        transfer if !transfer.is_empty() => SnapmirrorStatus::parse(&transfer),
        _ if state == SnapmirrorState::Paused => SnapmirrorStatus::Quiesced,
        _ => SnapmirrorStatus::Idle,
    };
    SnapmirrorRelationship {
        source: endpoint(record, "source"),
        destination: endpoint(record, "destination"),
        policy: str_at(record, "/policy/name"),
        schedule: str_at(record, "/transfer_schedule/name"),
        state,
        status,
        healthy: bool_at(record, "/healthy").unwrap_or(false),
        unhealthy_reason: unhealthy_reason(record),
    }
}

fn parse_policy(record: &Value) -> SnapmirrorPolicy {
    let rules: BTreeMap<String, u32> = record
        .get("retention")
        .and_then(Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| {
                    let label = str_at(rule, "/label");
                    let count = u64_at(rule, "/count").unwrap_or(0) as u32;
                    (!label.is_empty()).then_some((label, count))
                })
                .collect()
        })
        .unwrap_or_default();
    SnapmirrorPolicy {
        name: str_at(record, "/name"),
        policy_type: SnapmirrorPolicyType::parse(&str_at(record, "/type")),
        copy_all_source_snapshots: bool_at(record, "/copy_all_source_snapshots").unwrap_or(false),
        rules,
    }
}

impl RestBackend {
    /// Relationship record and its uuid
    async fn relationship(
        &self,
        site: &CallSite<'_>,
        destination: &SnapmirrorEndpoint,
        source: Option<&SnapmirrorEndpoint>,
    ) -> Result<(String, SnapmirrorRelationship, Value)> {
        let mut request = RestRequest::get("/snapmirror/relationships")
            .query("destination.path", destination.path())
            .fields(RELATIONSHIP_FIELDS);
        if let Some(source) = source {
            request = request.query("source.path", source.path());
        }
        let records = self.collect(site, request).await?;
        for record in records {
            let relationship = parse_relationship(&record);
            if &relationship.destination == destination && source.map_or(true, |s| &relationship.source == s) {
                let uuid = uuid_of(site, &record, "/uuid")?;
                return Ok((uuid, relationship, record));
            }
        }
        Err(Error::not_found("snapmirror", destination.path()))
    }

    /// Read, consult the transition guard, then PATCH when needed
    async fn transition(
        &self,
        site: &CallSite<'_>,
        transition: Transition,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()> {
        let (uuid, relationship, record) = self.relationship(site, destination, Some(source)).await?;
        if replication::plan(transition, &relationship)? == Plan::AlreadySatisfied {
            debug!(
                destination = %destination,
                transition = %transition,
                state = %relationship.state,
                "SnapMirror transition already satisfied"
            );
            return Ok(());
        }

        let relationship_path = format!("/snapmirror/relationships/{}", uuid);
        let request = match transition {
            Transition::Initialize | Transition::Resync => {
                RestRequest::patch(relationship_path, json!({ "state": "snapmirrored" }))
            }
            Transition::Quiesce => RestRequest::patch(relationship_path, json!({ "state": "paused" })),
            Transition::Break => RestRequest::patch(relationship_path, json!({ "state": "broken_off" })),
            Transition::Abort => {
                let transfer = uuid_of(site, &record, "/transfer/uuid")?;
                RestRequest::patch(
                    format!("{}/transfers/{}", relationship_path, transfer),
                    json!({ "state": "aborted" }),
                )
            }
        };
        self.mutate(site, request).await?;
        info!(destination = %destination, source = %source, transition = %transition, "SnapMirror transition issued");
        Ok(())
    }

    async fn delete_relationship(&self, site: &CallSite<'_>, uuid: &str) -> Result<()> {
        let request = RestRequest::delete(format!("/snapmirror/relationships/{}", uuid)).query("destination_only", true);
        match self.mutate(site, request).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn find_snapmirror_policy(&self, site: &CallSite<'_>, name: &str) -> Result<Option<SnapmirrorPolicy>> {
        let request = self
            .scoped(RestRequest::get("/snapmirror/policies"))
            .query("name", name)
            .fields(&["name", "type", "copy_all_source_snapshots", "retention.label", "retention.count"]);
        let records = self.collect(site, request).await?;
        Ok(records.iter().map(parse_policy).find(|p| p.name == name))
    }
}

#[async_trait]
impl SnapmirrorApi for RestBackend {
    async fn snapmirror_get(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<SnapmirrorRelationship> {
        let target = destination.path();
        self.facade
            .call(ctx, "SnapmirrorGet", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorGet", "snapmirror", &target);
                Ok(self.relationship(&site, destination, Some(source)).await?.1)
            })
            .await
    }

    async fn snapmirror_create(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
        policy: &str,
        schedule: &str,
    ) -> Result<()> {
        let target = destination.path();
        self.facade
            .call(ctx, "SnapmirrorCreate", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorCreate", "snapmirror", &target);
                match self.relationship(&site, destination, Some(source)).await {
                    Ok(_) => {
                        debug!(destination = %destination, "SnapMirror relationship already exists");
                        return Ok(());
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }

                let mut body = json!({
                    "source": { "path": source.path() },
                    "destination": { "path": destination.path() },
                });
                if !policy.is_empty() {
                    body["policy"] = json!({ "name": policy });
                }
                if !schedule.is_empty() {
                    body["transfer_schedule"] = json!({ "name": schedule });
                }
                match self.mutate(&site, RestRequest::post("/snapmirror/relationships", body)).await {
                    Err(e) if e.is_already_exists() => Ok(()),
                    other => other.map(|_| ()),
                }
            })
            .await
    }

    async fn snapmirror_initialize(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()> {
        let target = destination.path();
        self.facade
            .call(ctx, "SnapmirrorInitialize", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorInitialize", "snapmirror", &target);
                self.transition(&site, Transition::Initialize, destination, source).await
            })
            .await
    }

    async fn snapmirror_resync(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()> {
        let target = destination.path();
        self.facade
            .call(ctx, "SnapmirrorResync", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorResync", "snapmirror", &target);
                self.transition(&site, Transition::Resync, destination, source).await
            })
            .await
    }

    async fn snapmirror_quiesce(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()> {
        let target = destination.path();
        self.facade
            .call(ctx, "SnapmirrorQuiesce", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorQuiesce", "snapmirror", &target);
                self.transition(&site, Transition::Quiesce, destination, source).await
            })
            .await
    }

    async fn snapmirror_abort(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()> {
        let target = destination.path();
        self.facade
            .call(ctx, "SnapmirrorAbort", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorAbort", "snapmirror", &target);
                self.transition(&site, Transition::Abort, destination, source).await
            })
            .await
    }

    async fn snapmirror_break(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()> {
        let target = destination.path();
        self.facade
            .call(ctx, "SnapmirrorBreak", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorBreak", "snapmirror", &target);
                self.transition(&site, Transition::Break, destination, source).await
            })
            .await
    }

    async fn snapmirror_delete(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()> {
        let target = destination.path();
        self.facade
            .call(ctx, "SnapmirrorDelete", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorDelete", "snapmirror", &target);
                match self.relationship(&site, destination, Some(source)).await {
                    Ok((uuid, _, _)) => self.delete_relationship(&site, &uuid).await,
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn snapmirror_delete_via_destination(
        &self,
        ctx: &RequestContext,
        destination: &SnapmirrorEndpoint,
    ) -> Result<()> {
        let target = destination.path();
        self.facade
            .call(ctx, "SnapmirrorDeleteViaDestination", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorDeleteViaDestination", "snapmirror", &target);
                match self.relationship(&site, destination, None).await {
                    Ok((uuid, _, _)) => self.delete_relationship(&site, &uuid).await,
                    Err(e) if e.is_not_found() => Ok(()),
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn snapmirror_release(&self, ctx: &RequestContext, source: &SnapmirrorEndpoint) -> Result<()> {
        let target = source.path();
        self.facade
            .call(ctx, "SnapmirrorRelease", &target, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorRelease", "snapmirror", &target);
                let request = RestRequest::get("/snapmirror/relationships")
                    .query("list_destinations_only", true)
                    .query("source.path", source.path())
                    .fields(&["uuid"]);
                for record in self.collect(&site, request).await? {
                    let uuid = uuid_of(&site, &record, "/uuid")?;
                    let release = RestRequest::delete(format!("/snapmirror/relationships/{}", uuid))
                        .query("source_only", true);
                    match self.mutate(&site, release).await {
                        Ok(_) => info!(source = %source, relationship = %uuid, "SnapMirror relationship released"),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            })
            .await
    }

    async fn snapmirror_policy_exists(&self, ctx: &RequestContext, name: &str) -> Result<bool> {
        self.facade
            .call(ctx, "SnapmirrorPolicyExists", name, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorPolicyExists", "snapmirror-policy", name);
                Ok(self.find_snapmirror_policy(&site, name).await?.is_some())
            })
            .await
    }

    async fn snapmirror_policy_get(&self, ctx: &RequestContext, name: &str) -> Result<SnapmirrorPolicy> {
        self.facade
            .call(ctx, "SnapmirrorPolicyGet", name, async {
                self.require(Feature::VolumeReplication)?;
                let site = CallSite::new("SnapmirrorPolicyGet", "snapmirror-policy", name);
                self.find_snapmirror_policy(&site, name)
                    .await?
                    .ok_or_else(|| Error::not_found("snapmirror-policy", name))
            })
            .await
    }
}
