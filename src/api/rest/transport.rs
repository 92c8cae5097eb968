//! REST transport
//!
//! JSON over `https://LIF/api` with basic auth. Error statuses come back as
//! responses so that the classifier can read the array's error body.

use crate::api::rest::request::{RestMethod, RestRequest, RestResponse};
use crate::api::transport::TransportError;
use crate::config::OntapConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Sends one request and returns the status and decoded body
///
/// `Ok(None)` means no response reached us at all.
#[async_trait]
pub trait RestTransport: Send + Sync {
    async fn send(&self, request: &RestRequest) -> std::result::Result<Option<RestResponse>, TransportError>;
}

/// REST over HTTPS
pub struct HttpRestTransport {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    trace_api: bool,
}

impl HttpRestTransport {
    pub fn new(config: &OntapConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("https://{}/api", config.management_lif),
            username: config.username.clone(),
            password: config.password.clone(),
            trace_api: config.debug_trace_flags.api,
        })
    }

    fn method(method: RestMethod) -> reqwest::Method {
        match method {
            RestMethod::Get => reqwest::Method::GET,
            RestMethod::Post => reqwest::Method::POST,
            RestMethod::Patch => reqwest::Method::PATCH,
            RestMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Requests whose bodies carry secrets are never traced
fn is_sensitive(request: &RestRequest) -> bool {
    request.path.contains("/credentials") || request.path.starts_with("/security")
}

#[async_trait]
impl RestTransport for HttpRestTransport {
    async fn send(&self, request: &RestRequest) -> std::result::Result<Option<RestResponse>, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);

        if self.trace_api {
            match (&request.body, is_sensitive(request)) {
                (Some(_), true) => debug!(method = %request.method, href = %request.href(), "REST request: <redacted>"),
                (Some(body), false) => debug!(method = %request.method, href = %request.href(), "REST request: {}", body),
                (None, _) => debug!(method = %request.method, href = %request.href(), "REST request"),
            }
        }

        let mut builder = self
            .client
            .request(Self::method(request.method), &url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if self.trace_api && !is_sensitive(request) {
            debug!(status, "REST response: {}", text);
        }

        if text.trim().is_empty() {
            return Ok(Some(RestResponse::empty(status)));
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Ok(Some(RestResponse::new(status, body))),
            // Gateways answer non-JSON errors; the status still decides
            Err(_) if !(200..300).contains(&status) => Ok(Some(RestResponse::empty(status))),
            Err(e) => Err(TransportError::malformed(format!("invalid REST JSON: {}", e))),
        }
    }
}
