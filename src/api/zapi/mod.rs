//! ZAPI backend
//!
//! Implements the full contract over the legacy XML RPC protocol. Each
//! resource family lives in its own file; this module holds the shared call
//! plumbing: classification, iterator paging and async-job waiting.

mod cluster;
mod element;
mod export;
mod igroup;
mod lun;
mod network;
mod snapmirror;
mod snapshot;
mod transport;
mod volume;

pub use element::{envelope, ZapiElement, ZapiResponse};
pub use transport::{HttpZapiTransport, ZapiTransport};

use crate::api::capability::{Capabilities, CapabilityNegotiator, Feature};
use crate::api::classifier::{self, CallSite};
use crate::api::facade::Facade;
use crate::api::job::{self, JobPoll};
use crate::api::pagination::PageCursor;
use crate::api::BackendOptions;
use crate::config::ApiProtocol;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Backend speaking ZAPI
pub struct ZapiBackend {
    transport: Arc<dyn ZapiTransport>,
    svm: String,
    negotiator: CapabilityNegotiator,
    facade: Facade,
    options: BackendOptions,
}

impl ZapiBackend {
    pub fn new(transport: Arc<dyn ZapiTransport>, svm: &str, options: BackendOptions) -> Self {
        Self {
            transport,
            svm: svm.to_string(),
            negotiator: CapabilityNegotiator::new(ApiProtocol::Zapi),
            facade: Facade::new(ApiProtocol::Zapi, options.trace_methods),
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
    async fn invoke(&self, site: &CallSite<'_>, request: ZapiElement) -> Result<ZapiElement> {
        let outcome = self.transport.invoke(&request).await;
        classifier::classify_zapi(site, outcome).map(|response| response.results)
    }

    /// Run a `*-get-iter` call to completion and return every record
    async fn iterate<F>(&self, site: &CallSite<'_>, build: F) -> Result<Vec<ZapiElement>>
    where
        F: Fn() -> ZapiElement + Send + Sync,
    {
        let mut cursor = PageCursor::new(site.operation);
        let mut records = Vec::new();
        let mut tag: Option<String> = None;

        loop {
            let mut request = build().child("max-records", self.options.page_size);
            if let Some(tag) = &tag {
                request = request.child("tag", tag);
            }

            let results = self.invoke(site, request).await?;
            records.extend(results.list("attributes-list").iter().cloned());

            match cursor.advance(results.text_of("next-tag"))? {
                Some(next) => tag = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    /// Turn per-record failures of a `*-iter` mutation into one classified error
    ///
    /// `*-iter` calls report `passed` even when every record failed; the
    /// failures sit in `failure-list`. No matching record means absent.
    fn check_iter_result(&self, site: &CallSite<'_>, results: &ZapiElement) -> Result<()> {
        if let Some(failure) = results.list("failure-list").first() {
            let errno = failure.text_of("error-code").unwrap_or_default();
            let reason = failure.text_of("error-message").unwrap_or_default();
            return classifier::classify_zapi(site, Ok(Some(ZapiResponse::failed(errno, reason)))).map(|_| ());
        }
        if results.path_u64(&["num-succeeded"]).unwrap_or(0) == 0 {
            return Err(Error::not_found(site.resource, site.target));
        }
        Ok(())
    }

    /// Wait for the job behind an `-async` call, if it has not finished yet
    async fn wait_for_async(&self, site: &CallSite<'_>, results: &ZapiElement) -> Result<()> {
        let status = results.text_of("result-status").unwrap_or("succeeded");
        match status {
            "succeeded" | "passed" => return Ok(()),
            "failed" => {
                let errno = results.text_of("result-error-code").unwrap_or_default();
                let reason = results.text_of("result-error-message").unwrap_or_default();
                return classifier::classify_zapi(site, Ok(Some(ZapiResponse::failed(errno, reason))))
                    .map(|_| ());
            }
            _ => {}
        }

        let job_id = results
            .text_of("result-jobid")
            .ok_or_else(|| Error::internal(site.operation, "async call returned no job id"))?
            .to_string();

        let job_site = CallSite::new(site.operation, site.resource, site.target);
        let job_id_ref = job_id.as_str();
        job::wait_for_job(&self.options, site, job_id_ref, move || async move {
            let request = ZapiElement::new("job-get").child("job-id", job_id_ref);
            let results = self.invoke(&job_site, request).await?;
            let info = results.path(&["attributes", "job-info"]);
            let state = info.and_then(|i| i.text_of("job-state")).unwrap_or_default();
            Ok(match state {
                "success" => JobPoll::Succeeded,
                "failure" | "error" | "dead" => {
                    let errno = info.and_then(|i| i.text_of("job-completion-code")).unwrap_or_default();
                    let reason = info.and_then(|i| i.text_of("job-completion")).unwrap_or_default();
                    match classifier::classify_zapi(&job_site, Ok(Some(ZapiResponse::failed(errno, reason)))) {
                        Err(e) => JobPoll::Failed(e),
                        Ok(_) => JobPoll::Succeeded,
                    }
                }
                _ => JobPoll::Pending,
            })
        })
        .await
    }
}

/// `<query>` wrapper used by every iterator and `*-iter` mutation
fn query(attributes: ZapiElement) -> ZapiElement {
    ZapiElement::new("query").push(attributes)
}
