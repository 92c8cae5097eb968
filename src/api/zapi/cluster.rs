//! ZAPI version negotiation and cluster-wide queries

use super::{query, ZapiBackend, ZapiElement};
use crate::api::abstraction::ClusterApi;
use crate::api::capability::{ArrayPersonality, Feature};
use crate::api::classifier::CallSite;
use crate::api::context::RequestContext;
use crate::api::types::{AggregateSpace, EmsEvent};
use crate::config::ApiProtocol;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

impl ZapiBackend {
    /// ONTAPI version as `major.minor`
    async fn query_ontapi_version(&self, site: &CallSite<'_>) -> Result<String> {
        let results = self
            .invoke(site, ZapiElement::new("system-get-ontapi-version"))
            .await?;
        let major = results.text_of("major-version").unwrap_or_default();
        let minor = results.text_of("minor-version").unwrap_or_default();
        Ok(format!("{}.{}", major, minor))
    }

    async fn svm_aggregates(&self, site: &CallSite<'_>) -> Result<Vec<(String, String)>> {
        let records = self
            .iterate(site, || {
                ZapiElement::new("vserver-show-aggr-get-iter").child("vserver", &self.svm)
            })
            .await?;
        Ok(records
            .iter()
            .filter_map(|r| {
                let name = r.text_of("aggregate-name")?;
                Some((name.to_string(), r.text_of("aggregate-type").unwrap_or_default().to_string()))
            })
            .collect())
    }
}

#[async_trait]
impl ClusterApi for ZapiBackend {
    fn protocol(&self) -> ApiProtocol {
        ApiProtocol::Zapi
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
                self.query_ontapi_version(&site).await
            })
            .await
    }

    async fn validate_api_version(&self, ctx: &RequestContext) -> Result<()> {
        self.facade
            .call(ctx, "ValidateApiVersion", &self.svm, async {
                let site = CallSite::new("ValidateApiVersion", "cluster", &self.svm);
                let reported = self.query_ontapi_version(&site).await?;
                // ONTAPI does not report a SAN-optimized personality
                self.negotiator.apply(&reported, ArrayPersonality::Unified)?;
                Ok(())
            })
            .await
    }

    async fn ems_autosupport_log(&self, ctx: &RequestContext, event: &EmsEvent) -> Result<()> {
        self.facade
            .call(ctx, "EmsAutosupportLog", &event.event_source, async {
                let site = CallSite::new("EmsAutosupportLog", "ems", &event.event_source);
                let request = ZapiElement::new("ems-autosupport-log")
                    .child("app-version", &event.app_version)
                    .child("auto-support", event.auto_support)
                    .child("category", &event.category)
                    .child("computer-name", &event.computer_name)
                    .child("event-description", &event.event_description)
                    .child("event-id", event.event_id)
                    .child("event-source", &event.event_source)
                    .child("log-level", event.log_level);
                self.invoke(&site, request).await.map(|_| ())
            })
            .await
    }

    async fn svm_aggregate_names(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "SvmAggregateNames", &self.svm, async {
                let site = CallSite::new("SvmAggregateNames", "svm", &self.svm);
                let aggregates = self.svm_aggregates(&site).await?;
                Ok(aggregates.into_iter().map(|(name, _)| name).collect())
            })
            .await
    }

    async fn svm_aggregate_attributes(&self, ctx: &RequestContext) -> Result<BTreeMap<String, String>> {
        self.facade
            .call(ctx, "SvmAggregateAttributes", &self.svm, async {
                let site = CallSite::new("SvmAggregateAttributes", "svm", &self.svm);
                Ok(self.svm_aggregates(&site).await?.into_iter().collect())
            })
            .await
    }

    async fn svm_aggregate_space(&self, ctx: &RequestContext, aggregate: &str) -> Result<Vec<AggregateSpace>> {
        self.facade
            .call(ctx, "SvmAggregateSpace", aggregate, async {
                let site = CallSite::new("SvmAggregateSpace", "aggregate", aggregate);
                let records = self
                    .iterate(&site, || {
                        ZapiElement::new("aggr-space-get-iter").push(query(
                            ZapiElement::new("space-information").child("aggregate", aggregate),
                        ))
                    })
                    .await?;
                Ok(records
                    .iter()
                    .filter(|r| r.text_of("aggregate") == Some(aggregate))
                    .map(|r| AggregateSpace {
                        size: r.path_u64(&["aggregate-size"]).unwrap_or(0),
                        used: r.path_u64(&["used-including-snapshot-reserve"]).unwrap_or(0),
                        footprint: r.path_u64(&["volume-footprints"]).unwrap_or(0),
                    })
                    .collect())
            })
            .await
    }

    async fn node_list_serial_numbers(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        self.facade
            .call(ctx, "NodeListSerialNumbers", "cluster", async {
                let site = CallSite::new("NodeListSerialNumbers", "node", "cluster");
                let records = self
                    .iterate(&site, || ZapiElement::new("system-node-get-iter"))
                    .await?;
                let serials: Vec<String> = records
                    .iter()
                    .filter_map(|r| r.text_of("node-serial-number"))
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
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
                let records = self
                    .iterate(&site, || {
                        ZapiElement::new("vserver-peer-get-iter")
                            .push(query(ZapiElement::new("vserver-peer-info").child("vserver", &self.svm)))
                    })
                    .await?;
                Ok(records
                    .iter()
                    .filter_map(|r| r.text_of("remote-vserver-name"))
                    .map(str::to_string)
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
                let records = self
                    .iterate(&site, || {
                        ZapiElement::new("vserver-get-iter")
                            .push(query(ZapiElement::new("vserver-info").child("vserver-name", &self.svm)))
                    })
                    .await?;
                let subtype = records
                    .first()
                    .and_then(|r| r.text_of("vserver-subtype"))
                    .ok_or_else(|| Error::not_found("svm", &self.svm))?;
                Ok(subtype != "dp_destination")
            })
            .await
    }

    async fn job_schedule_exists(&self, ctx: &RequestContext, name: &str) -> Result<bool> {
        self.facade
            .call(ctx, "JobScheduleExists", name, async {
                let site = CallSite::new("JobScheduleExists", "job-schedule", name);
                let records = self
                    .iterate(&site, || {
                        ZapiElement::new("job-schedule-get-iter")
                            .push(query(ZapiElement::new("job-schedule-info").child("job-schedule-name", name)))
                    })
                    .await?;
                Ok(!records.is_empty())
            })
            .await
    }
}
