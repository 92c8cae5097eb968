//! REST version negotiation and cluster-wide queries

use super::{bool_at, str_at, u64_at, RestBackend, RestRequest};
use crate::api::abstraction::ClusterApi;
use crate::api::capability::{ArrayPersonality, Feature};
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::types::{AggregateSpace, EmsEvent};
use crate::config::ApiProtocol;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;

/// EMS severity names in numeric order
const LOG_LEVELS: [&str; 6] = ["emergency", "alert", "error", "notice", "informational", "debug"];

impl RestBackend {
    /// `generation.major.minor` and the SAN-optimized flag
    async fn query_cluster_version(&self, site: &CallSite<'_>) -> Result<(String, ArrayPersonality)> {
        let request = RestRequest::get("/cluster").fields(&["version", "san_optimized"]);
        let response = self.send(site, request).await?;
        let body = response
            .body
            .ok_or_else(|| Error::internal(site.operation, "cluster query returned no body"))?;

        let version = format!(
            "{}.{}.{}",
            u64_at(&body, "/version/generation").unwrap_or(0),
            u64_at(&body, "/version/major").unwrap_or(0),
            u64_at(&body, "/version/minor").unwrap_or(0),
        );
        let personality = if bool_at(&body, "/san_optimized").unwrap_or(false) {
            ArrayPersonality::SanOptimized
        } else {
            ArrayPersonality::Unified
        };
        Ok((version, personality))
    }

    async fn svm_aggregate_list(&self, site: &CallSite<'_>) -> Result<Vec<String>> {
        let request = RestRequest::get("/svm/svms")
            .query("name", &self.svm)
            .fields(&["aggregates.name"]);
        let svm = self
            .first(site, request)
            .await?
            .ok_or_else(|| Error::not_found("svm", &self.svm))?;
        Ok(svm
            .get("aggregates")
            .and_then(|a| a.as_array())
            .map(|aggrs| aggrs.iter().map(|a| str_at(a, "/name")).filter(|n| !n.is_empty()).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ClusterApi for RestBackend {
    fn protocol(&self) -> ApiProtocol {
        ApiProtocol::Rest
    }

    fn supports_feature(&self, feature: Feature) -> bool {
        self.negotiator.supports(feature)
    }

    fn tiering_policy_value(&self) -> String {
        if self.negotiator.supports(Feature::FabricPoolFlexVol) {
            "none".to_string()
        } else {
            "snapshot-only".to_string()
        }
    }

    async fn api_version(&self, ctx: &RequestContext) -> Result<String> {
        if let Some(caps) = self.negotiator.current() {
            return Ok(caps.reported_version.clone());
        }
        self.facade
            .call(ctx, "ApiVersion", &self.svm, async {
                let site = CallSite::new("ApiVersion", "cluster", &self.svm);
                Ok(self.query_cluster_version(&site).await?.0)
            })
            .await
    }

    async fn validate_api_version(&self, ctx: &RequestContext) -> Result<()> {
        self.facade
            .call(ctx, "ValidateApiVersion", &self.svm, async {
                let site = CallSite::new("ValidateApiVersion", "cluster", &self.svm);
                let (version, personality) = self.query_cluster_version(&site).await?;
                self.negotiator.apply(&version, personality)?;
                Ok(())
            })
            .await
    }

    async fn ems_autosupport_log(&self, ctx: &RequestContext, event: &EmsEvent) -> Result<()> {
        self.facade
            .call(ctx, "EmsAutosupportLog", &event.event_source, async {
                let site = CallSite::new("EmsAutosupportLog", "ems", &event.event_source);
                let severity = LOG_LEVELS
                    .get(event.log_level as usize)
                    .copied()
                    .unwrap_or("notice");
                let body = json!({
                    "computer_name": event.computer_name,
                    "event_id": event.event_id,
                    "event_source": event.event_source,
                    "app_version": event.app_version,
                    "category": event.category,
                    "event_description": event.event_description,
                    "severity": severity,
                    "autosupport_required": event.auto_support,
                });
                self.mutate(&site, RestRequest::post("/support/ems/application-logs", body))
                    .await
                    .map(|_| ())
            })
            .await
    }

    async fn svm_aggregate_names(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "SvmAggregateNames", &self.svm, async {
                let site = CallSite::new("SvmAggregateNames", "svm", &self.svm);
                self.svm_aggregate_list(&site).await
            })
            .await
    }

    async fn svm_aggregate_attributes(&self, ctx: &RequestContext) -> Result<BTreeMap<String, String>> {
        self.facade
            .call(ctx, "SvmAggregateAttributes", &self.svm, async {
                let site = CallSite::new("SvmAggregateAttributes", "svm", &self.svm);
                let names = self.svm_aggregate_list(&site).await?;
                if names.is_empty() {
                    return Ok(BTreeMap::new());
                }
                let request = RestRequest::get("/storage/aggregates")
                    .query("name", names.join("|"))
                    .fields(&["name", "block_storage.primary.disk_type"]);
                let records = self.collect(&site, request).await?;
                Ok(records
                    .iter()
                    .map(|r| (str_at(r, "/name"), str_at(r, "/block_storage/primary/disk_type")))
                    .filter(|(name, _)| names.contains(name))
                    .collect())
            })
            .await
    }

    async fn svm_aggregate_space(&self, ctx: &RequestContext, aggregate: &str) -> Result<Vec<AggregateSpace>> {
        self.facade
            .call(ctx, "SvmAggregateSpace", aggregate, async {
                let site = CallSite::new("SvmAggregateSpace", "aggregate", aggregate);
                let request = RestRequest::get("/storage/aggregates").query("name", aggregate).fields(&[
                    "space.block_storage.size",
                    "space.block_storage.used",
                    "space.footprint",
                ]);
                let records = self.collect(&site, request).await?;
                Ok(records
                    .iter()
                    .filter(|r| str_at(r, "/name") == aggregate)
                    .map(|r| AggregateSpace {
                        size: u64_at(r, "/space/block_storage/size").unwrap_or(0),
                        used: u64_at(r, "/space/block_storage/used").unwrap_or(0),
                        footprint: u64_at(r, "/space/footprint").unwrap_or(0),
                    })
                    .collect())
            })
            .await
    }

    async fn node_list_serial_numbers(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "NodeListSerialNumbers", "cluster", async {
                let site = CallSite::new("NodeListSerialNumbers", "node", "cluster");
                let request = RestRequest::get("/cluster/nodes").fields(&["serial_number"]);
                let serials: Vec<String> = self
                    .collect(&site, request)
                    .await?
                    .iter()
                    .map(|r| str_at(r, "/serial_number"))
                    .filter(|s| !s.is_empty())
                    .collect();
                if serials.is_empty() {
                    return Err(Error::not_found("node", "serial numbers"));
                }
                Ok(serials)
            })
            .await
    }

    async fn peered_vservers(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "PeeredVservers", &self.svm, async {
                let site = CallSite::new("PeeredVservers", "svm", &self.svm);
                let request = self.scoped(RestRequest::get("/svm/peers")).fields(&["peer.svm.name"]);
                Ok(self
                    .collect(&site, request)
                    .await?
                    .iter()
                    .map(|r| str_at(r, "/peer/svm/name"))
                    .filter(|n| !n.is_empty())
                    .collect())
            })
            .await
    }

    async fn is_svm_dr_capable(&self, ctx: &RequestContext) -> Result<bool> {
        if !self.negotiator.supports(Feature::SvmDisasterRecovery) {
            return Ok(false);
        }
        self.facade
            .call(ctx, "IsSvmDrCapable", &self.svm, async {
                let site = CallSite::new("IsSvmDrCapable", "svm", &self.svm);
                let request = RestRequest::get("/svm/svms")
                    .query("name", &self.svm)
                    .fields(&["subtype"]);
                let svm = self
                    .first(&site, request)
                    .await?
                    .ok_or_else(|| Error::not_found("svm", &self.svm))?;
                Ok(str_at(&svm, "/subtype") != "dp_destination")
            })
            .await
    }

    async fn job_schedule_exists(&self, ctx: &RequestContext, name: &str) -> Result<bool> {
        self.facade
            .call(ctx, "JobScheduleExists", name, async {
                let site = CallSite::new("JobScheduleExists", "job-schedule", name);
                let request = RestRequest::get("/cluster/schedules").query("name", name).fields(&["name"]);
                Ok(!self.collect(&site, request).await?.is_empty())
            })
            .await
    }
}
