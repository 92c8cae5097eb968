//! REST request and response values

use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for RestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestMethod::Get => write!(f, "GET"),
            RestMethod::Post => write!(f, "POST"),
            RestMethod::Patch => write!(f, "PATCH"),
            RestMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// One REST call, relative to `https://LIF/api`
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: RestMethod,
    /// Path below `/api`, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RestRequest {
    pub fn new(method: RestMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(RestMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(RestMethod::Post, path).body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(RestMethod::Patch, path).body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(RestMethod::Delete, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Replace any existing value for `key`
    pub fn set_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn fields(self, fields: &[&str]) -> Self {
        self.query("fields", fields.join(","))
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Follow a `_links.next.href` returned by the array
    ///
    /// The href carries the `/api` prefix and an already-encoded query.
    pub fn from_href(href: &str) -> Self {
        let (path, query) = href.split_once('?').unwrap_or((href, ""));
        let path = path.strip_prefix("/api").unwrap_or(path);
        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(k), decode(v))
            })
            .collect();
        Self {
            method: RestMethod::Get,
            path: path.to_string(),
            query,
            body: None,
        }
    }

    /// Path and encoded query, as logged and as followed in hrefs
    pub fn href(&self) -> String {
        if self.query.is_empty() {
            return format!("/api{}", self.path);
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("/api{}?{}", self.path, query.join("&"))
    }
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Status and decoded JSON body of one REST call
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl RestResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self { status, body: None }
    }

    /// Collection records, or nothing
    pub fn records(&self) -> &[Value] {
        self.body
            .as_ref()
            .and_then(|b| b.get("records"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn next_href(&self) -> Option<&str> {
        self.body.as_ref()?.pointer("/_links/next/href")?.as_str()
    }

    pub fn job_uuid(&self) -> Option<&str> {
        self.body.as_ref()?.pointer("/job/uuid")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_href_round_trip() {
        let request = RestRequest::get("/storage/volumes")
            .query("name", "trident_*")
            .query("svm.name", "svm0");
        let href = request.href();
        assert_eq!(href, "/api/storage/volumes?name=trident_%2A&svm.name=svm0");

        let followed = RestRequest::from_href(&href);
        assert_eq!(followed.path, "/storage/volumes");
        assert_eq!(followed.query_value("name"), Some("trident_*"));
    }

    #[test]
    fn test_response_accessors() {
        let response = RestResponse::new(
            200,
            json!({
                "records": [{"name": "vol1"}],
                "_links": {"next": {"href": "/api/storage/volumes?start.uuid=abc"}}
            }),
        );
        assert_eq!(response.records().len(), 1);
        assert_eq!(response.next_href(), Some("/api/storage/volumes?start.uuid=abc"));
        assert_eq!(RestResponse::empty(204).records().len(), 0);

        let accepted = RestResponse::new(202, json!({"job": {"uuid": "j-1"}}));
        assert_eq!(accepted.job_uuid(), Some("j-1"));
    }

    #[test]
    fn test_set_query_replaces() {
        let request = RestRequest::get("/x").query("max_records", 10).set_query("max_records", 5);
        assert_eq!(request.query.len(), 1);
        assert_eq!(request.query_value("max_records"), Some("5"));
    }
}
