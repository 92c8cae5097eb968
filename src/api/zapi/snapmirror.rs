//! ZAPI SnapMirror relationships and policies

use super::{query, ZapiBackend, ZapiElement, ZapiResponse};
use crate::api::abstraction::SnapmirrorApi;
use crate::api::capability::Feature;
use crate::api::classifier::{self, CallSite};
use crate::api::context::RequestContext;
use crate::api::replication::{self, Plan, Transition};
use crate::api::types::{
    SnapmirrorEndpoint, SnapmirrorPolicy, SnapmirrorPolicyType, SnapmirrorRelationship, SnapmirrorState,
    SnapmirrorStatus,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info};

fn endpoint(record: &ZapiElement, side: &str) -> SnapmirrorEndpoint {
    let field = |suffix: &str| record.path_string(&[format!("{}-{}", side, suffix).as_str()]);
    let svm = field("vserver");
    let volume = field("volume");
    if svm.is_empty() {
        if let Some(parsed) = SnapmirrorEndpoint::from_path(&field("location")) {
            return parsed;
        }
    }
    SnapmirrorEndpoint::new(svm, volume)
}

fn parse_relationship(record: &ZapiElement) -> SnapmirrorRelationship {
    SnapmirrorRelationship {
        source: endpoint(record, "source"),
        destination: endpoint(record, "destination"),
        policy: record.path_string(&["policy"]),
        schedule: record.path_string(&["schedule"]),
        state: SnapmirrorState::parse(&record.path_string(&["mirror-state"])),
        status: SnapmirrorStatus::parse(&record.path_string(&["relationship-status"])),
        healthy: record.path_bool(&["is-healthy"]).unwrap_or(false),
        unhealthy_reason: record.path_string(&["unhealthy-reason"]),
    }
}

fn locations(request: ZapiElement, destination: &SnapmirrorEndpoint, source: &SnapmirrorEndpoint) -> ZapiElement {
    request
        .child("destination-location", destination.path())
        .child("source-location", source.path())
}

impl ZapiBackend {
    async fn relationship(
        &self,
        site: &CallSite<'_>,
        destination: &SnapmirrorEndpoint,
        source: Option<&SnapmirrorEndpoint>,
    ) -> Result<SnapmirrorRelationship> {
        let records = self
            .iterate(site, || {
                let mut info = ZapiElement::new("snapmirror-info").child("destination-location", destination.path());
                if let Some(source) = source {
                    info = info.child("source-location", source.path());
                }
                ZapiElement::new("snapmirror-get-iter").push(query(info))
            })
            .await?;
        records
            .iter()
            .map(parse_relationship)
            .find(|r| &r.destination == destination && source.map_or(true, |s| &r.source == s))
            .ok_or_else(|| Error::not_found("snapmirror", destination.path()))
    }

    /// Read, consult the transition guard, then issue `api` when needed
    async fn transition(
        &self,
        site: &CallSite<'_>,
        transition: Transition,
        api: &str,
        destination: &SnapmirrorEndpoint,
        source: &SnapmirrorEndpoint,
    ) -> Result<()> {
        let relationship = self.relationship(site, destination, Some(source)).await?;
        match replication::plan(transition, &relationship)? {
            Plan::AlreadySatisfied => {
                debug!(
                    destination = %destination,
                    transition = %transition,
                    state = %relationship.state,
                    "SnapMirror transition already satisfied"
                );
                Ok(())
            }
            Plan::Issue => {
                let request = locations(ZapiElement::new(api), destination, source);
                self.invoke(site, request).await?;
                info!(destination = %destination, source = %source, transition = %transition, "SnapMirror transition issued");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SnapmirrorApi for ZapiBackend {
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
                self.relationship(&site, destination, Some(source)).await
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

                let request = locations(ZapiElement::new("snapmirror-create"), destination, source)
                    .child("relationship-type", "extended_data_protection")
                    .child_opt("policy", policy)
                    .child_opt("schedule", schedule);
                match self.invoke(&site, request).await {
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
                self.transition(&site, Transition::Initialize, "snapmirror-initialize", destination, source)
                    .await
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
                self.transition(&site, Transition::Resync, "snapmirror-resync", destination, source)
                    .await
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
                self.transition(&site, Transition::Quiesce, "snapmirror-quiesce", destination, source)
                    .await
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
                self.transition(&site, Transition::Abort, "snapmirror-abort", destination, source)
                    .await
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
                self.transition(&site, Transition::Break, "snapmirror-break", destination, source)
                    .await
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
                let request = locations(ZapiElement::new("snapmirror-destroy"), destination, source);
                match self.invoke(&site, request).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other.map(|_| ()),
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
                let relationship = match self.relationship(&site, destination, None).await {
                    Ok(relationship) => relationship,
                    Err(e) if e.is_not_found() => return Ok(()),
                    Err(e) => return Err(e),
                };
                let request = locations(
                    ZapiElement::new("snapmirror-destroy"),
                    destination,
                    &relationship.source,
                );
                match self.invoke(&site, request).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other.map(|_| ()),
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
                let request = ZapiElement::new("snapmirror-release-iter").push(query(
                    ZapiElement::new("snapmirror-destination-info")
                        .child("source-vserver", &source.svm)
                        .child("source-volume", &source.volume),
                ));
                let results = self.invoke(&site, request).await?;
                // Nothing to release is fine; only explicit failures count
                if let Some(failure) = results.list("failure-list").first() {
                    let errno = failure.text_of("error-code").unwrap_or_default();
                    let reason = failure.text_of("error-message").unwrap_or_default();
                    return classifier::classify_zapi(&site, Ok(Some(ZapiResponse::failed(errno, reason))))
                        .map(|_| ());
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

impl ZapiBackend {
    async fn find_snapmirror_policy(&self, site: &CallSite<'_>, name: &str) -> Result<Option<SnapmirrorPolicy>> {
        let records = self
            .iterate(site, || {
                ZapiElement::new("snapmirror-policy-get-iter").push(query(
                    ZapiElement::new("snapmirror-policy-info")
                        .child("policy-name", name)
                        .child("vserver-name", &self.svm),
                ))
            })
            .await?;

        Ok(records
            .iter()
            .find(|r| r.text_of("policy-name") == Some(name))
            .map(|r| {
                let rules = r
                    .list("snapmirror-policy-rules")
                    .iter()
                    .filter_map(|rule| {
                        let label = rule.text_of("snapmirror-label")?;
                        let keep = rule.path_u64(&["keep"]).unwrap_or(0) as u32;
                        Some((label.to_string(), keep))
                    })
                    .collect::<std::collections::BTreeMap<_, _>>();
                SnapmirrorPolicy {
                    name: name.to_string(),
                    policy_type: SnapmirrorPolicyType::parse(&r.path_string(&["type"])),
                    copy_all_source_snapshots: rules.contains_key("all_source_snapshots"),
                    rules,
                }
            }))
    }
}
