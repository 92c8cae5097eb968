//! ZAPI transport
//!
//! The backend only needs [`ZapiTransport::invoke`]; the HTTP implementation
//! posts the XML envelope to the filer servlet with basic auth.

use crate::api::transport::TransportError;
use crate::api::zapi::element::{envelope, ZapiElement, ZapiResponse};
use crate::config::OntapConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

const ZAPI_PATH: &str = "/servlets/netapp.servlets.admin.XMLrequest_filer";
const ZAPI_ENVELOPE_VERSION: &str = "1.21";

/// Sends one request element and returns the parsed `<results>`
///
/// `Ok(None)` means the array answered with an empty body.
#[async_trait]
pub trait ZapiTransport: Send + Sync {
    async fn invoke(&self, request: &ZapiElement) -> std::result::Result<Option<ZapiResponse>, TransportError>;
}

/// ZAPI over HTTPS
pub struct HttpZapiTransport {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
    svm: String,
    trace_api: bool,
}

impl HttpZapiTransport {
    pub fn new(config: &OntapConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("https://{}{}", config.management_lif, ZAPI_PATH),
            username: config.username.clone(),
            password: config.password.clone(),
            svm: config.svm.clone(),
            trace_api: config.debug_trace_flags.api,
        })
    }
}

/// Requests whose bodies carry secrets are never traced
fn is_sensitive(request: &ZapiElement) -> bool {
    request.name().contains("auth") || request.name().starts_with("security-")
}

#[async_trait]
impl ZapiTransport for HttpZapiTransport {
    async fn invoke(&self, request: &ZapiElement) -> std::result::Result<Option<ZapiResponse>, TransportError> {
        let body = envelope(request, ZAPI_ENVELOPE_VERSION, &self.svm);

        if self.trace_api {
            if is_sensitive(request) {
                debug!(api = request.name(), "ZAPI request: <redacted>");
            } else {
                debug!(api = request.name(), "ZAPI request: {}", body);
            }
        }

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("unexpected HTTP status"),
            ));
        }

        let text = response.text().await?;
        if self.trace_api && !is_sensitive(request) {
            debug!(api = request.name(), "ZAPI response: {}", text);
        }
        if text.trim().is_empty() {
            return Ok(None);
        }

        ZapiResponse::from_xml(&text).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_and_credentials_from_config() {
        let config = OntapConfig {
            management_lif: "10.0.0.5".into(),
            svm: "svm0".into(),
            username: "vsadmin".into(),
            ..Default::default()
        };
        let transport = HttpZapiTransport::new(&config).unwrap();
        assert_eq!(
            transport.url,
            "https://10.0.0.5/servlets/netapp.servlets.admin.XMLrequest_filer"
        );
        assert_eq!(transport.username, "vsadmin");
    }

    #[test]
    fn test_sensitive_requests() {
        assert!(is_sensitive(&ZapiElement::new("iscsi-initiator-set-default-auth")));
        assert!(!is_sensitive(&ZapiElement::new("volume-get-iter")));
    }
}
