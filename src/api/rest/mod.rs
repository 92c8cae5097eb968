//! REST backend
//!
//! Implements the full contract over the ONTAP JSON API. Each resource
//! family lives in its own file; this module holds the shared call
//! plumbing: classification, `_links.next` paging and `202 Accepted` job
//! waiting.

mod cluster;
mod export;
mod igroup;
mod lun;
mod network;
mod request;
mod snapmirror;
mod snapshot;
mod transport;
mod volume;

pub use request::{RestMethod, RestRequest, RestResponse};
pub use transport::{HttpRestTransport, RestTransport};

use crate::api::capability::{Capabilities, CapabilityNegotiator, Feature};
use crate::api::classifier::{self, CallSite};
use crate::api::facade::Facade;
use crate::api::job::{self, JobPoll};
use crate::api::pagination::PageCursor;
use crate::api::BackendOptions;
use crate::config::ApiProtocol;
use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Backend speaking REST
pub struct RestBackend {
    transport: Arc<dyn RestTransport>,
    svm: String,
    negotiator: CapabilityNegotiator,
    facade: Facade,
    options: BackendOptions,
}

impl RestBackend {
    pub fn new(transport: Arc<dyn RestTransport>, svm: &str, options: BackendOptions) -> Self {
        Self {
            transport,
            svm: svm.to_string(),
            negotiator: CapabilityNegotiator::new(ApiProtocol::Rest),
            facade: Facade::new(ApiProtocol::Rest, options.trace_methods),
            options,
        }
    }

    /// Capabilities from the last successful validation
    pub fn capabilities(&self) -> Option<Arc<Capabilities>> {
        self.negotiator.current()
    }

    fn require(&self, feature: Feature) -> Result<()> {
        self.negotiator.require(feature)
    }

    /// One request, classified
    async fn send(&self, site: &CallSite<'_>, request: RestRequest) -> Result<RestResponse> {
        let outcome = self.transport.send(&request).await;
        classifier::classify_rest(site, outcome)
    }

    /// Follow `_links.next` until the collection is exhausted
    async fn collect(&self, site: &CallSite<'_>, request: RestRequest) -> Result<Vec<Value>> {
        let mut cursor = PageCursor::new(site.operation);
        let mut records = Vec::new();
        let mut request = request.set_query("max_records", self.options.page_size);

        loop {
            let response = self.send(site, request).await?;
            records.extend(response.records().iter().cloned());

            match cursor.advance(response.next_href())? {
                Some(href) => request = RestRequest::from_href(&href),
                None => break,
            }
        }

        Ok(records)
    }

    /// First record of a filtered collection
    async fn first(&self, site: &CallSite<'_>, request: RestRequest) -> Result<Option<Value>> {
        Ok(self.collect(site, request).await?.into_iter().next())
    }

    /// Send a mutation and wait for its job when the array answers `202`
    async fn mutate(&self, site: &CallSite<'_>, request: RestRequest) -> Result<RestResponse> {
        let response = self.send(site, request).await?;
        if response.status != 202 {
            return Ok(response);
        }
        let Some(job_id) = response.job_uuid().map(str::to_string) else {
            return Ok(response);
        };

        let job_site = *site;
        let job_id_ref = job_id.as_str();
        job::wait_for_job(&self.options, site, job_id_ref, move || async move {
            let request = RestRequest::get(format!("/cluster/jobs/{}", job_id_ref)).fields(&["state", "code", "message"]);
            let job = self.send(&job_site, request).await?;
            let body = job.body.unwrap_or(Value::Null);
            Ok(match str_at(&body, "/state").as_str() {
                "success" => JobPoll::Succeeded,
                "failure" => {
                    let code = match body.get("code") {
                        Some(Value::Number(n)) => n.to_string(),
                        Some(Value::String(s)) => s.clone(),
                        _ => String::new(),
                    };
                    JobPoll::Failed(classifier::classify_rest_job(&job_site, &code, &str_at(&body, "/message")))
                }
                _ => JobPoll::Pending,
            })
        })
        .await?;

        Ok(response)
    }

    /// `svm.name` filter applied to every SVM-scoped collection
    fn scoped(&self, request: RestRequest) -> RestRequest {
        request.query("svm.name", &self.svm)
    }
}

// =============================================================================
// JSON helpers
// =============================================================================

fn str_at(value: &Value, pointer: &str) -> String {
    match value.pointer(pointer) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn u64_at(value: &Value, pointer: &str) -> Option<u64> {
    match value.pointer(pointer)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_at(value: &Value, pointer: &str) -> Option<bool> {
    value.pointer(pointer)?.as_bool()
}

/// Identity of a record, failing loudly when the array omits it
fn uuid_of(site: &CallSite<'_>, record: &Value, pointer: &str) -> Result<String> {
    match str_at(record, pointer) {
        id if !id.is_empty() => Ok(id),
        _ => Err(Error::internal(site.operation, format!("record has no {}", pointer))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_helpers() {
        let record = json!({"space": {"size": 1024, "used": "512"}, "uuid": "u-1", "enabled": true});
        assert_eq!(u64_at(&record, "/space/size"), Some(1024));
        assert_eq!(u64_at(&record, "/space/used"), Some(512));
        assert_eq!(str_at(&record, "/uuid"), "u-1");
        assert_eq!(str_at(&record, "/missing"), "");
        assert_eq!(bool_at(&record, "/enabled"), Some(true));

        let site = CallSite::new("VolumeInfo", "volume", "vol1");
        assert!(uuid_of(&site, &record, "/uuid").is_ok());
        assert!(uuid_of(&site, &record, "/nope").is_err());
    }
}
