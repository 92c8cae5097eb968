//! Error Classifier
//!
//! Single entry point per protocol that turns a transport outcome into
//! either a successful response or exactly one classified [`Error`]. This is
//! also the only place array failures are logged, so one array-side failure
//! produces one diagnostic record.
//!
//! Rules, in priority order:
//! 1. Transport failures are transient, except authentication and
//!    malformed-request statuses, which are permanent.
//! 2. Failed application responses are classified by status and errno/code.
//!    Unknown combinations are permanent.
//! 3. A missing response is a permanent "empty response" error.

use crate::api::rest::RestResponse;
use crate::api::transport::{TransportError, TransportErrorKind};
use crate::api::zapi::ZapiResponse;
use crate::error::{Error, ErrorKind, Result};
use crate::metrics;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Identity of one array call, carried into every classified error
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    /// Contract operation name, e.g. `VolumeCreate`
    pub operation: &'a str,
    /// Resource family, e.g. `volume`
    pub resource: &'a str,
    /// Resource identity, e.g. the volume name
    pub target: &'a str,
}

impl<'a> CallSite<'a> {
    pub fn new(operation: &'a str, resource: &'a str, target: &'a str) -> Self {
        Self {
            operation,
            resource,
            target,
        }
    }
}

/// Coarse outcome of a failed application response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    NotFound,
    Exists,
    Transient,
    Permanent,
}

// =============================================================================
// ZAPI errno table
// =============================================================================

pub mod zapi_errno {
    pub const EEXIST: &str = "17";
    pub const EAPIERROR: &str = "13001";
    pub const EAPIPRIVILEGE: &str = "13003";
    pub const EAPINOTFOUND: &str = "13005";
    pub const EVOLUMEBUSY: &str = "13023";
    pub const EVOLUMEDOESNOTEXIST: &str = "13040";
    pub const EINVALIDINPUTERROR: &str = "13115";
    pub const EDUPLICATEENTRY: &str = "13130";
    pub const EOBJECTNOTFOUND: &str = "15661";
    pub const ESNAPSHOTBUSY: &str = "13021";
    pub const ETRANSFERINPROGRESS: &str = "13102";
    pub const ENOSUCHINITGROUP: &str = "9003";
    pub const EINITGROUPEXISTS: &str = "9004";
    pub const EINITIATORALREADYINGROUP: &str = "9008";
    pub const EINITIATORNOTINGROUP: &str = "9009";
    pub const EVDISKEXISTS: &str = "9012";
    pub const ENOSUCHLUNMAP: &str = "9016";
    pub const ENOSUCHVDISK: &str = "9017";
    pub const ELUNALREADYMAPPED: &str = "9029";
}

fn zapi_class(errno: &str) -> Class {
    use zapi_errno::*;
    match errno {
        EVOLUMEDOESNOTEXIST | EOBJECTNOTFOUND | ENOSUCHINITGROUP | EINITIATORNOTINGROUP
        | ENOSUCHLUNMAP | ENOSUCHVDISK => Class::NotFound,
        EEXIST | EDUPLICATEENTRY | EINITGROUPEXISTS | EINITIATORALREADYINGROUP | EVDISKEXISTS
        | ELUNALREADYMAPPED => Class::Exists,
        EVOLUMEBUSY | ESNAPSHOTBUSY | ETRANSFERINPROGRESS => Class::Transient,
        _ => Class::Permanent,
    }
}

// =============================================================================
// REST error-code table
// =============================================================================

pub mod rest_code {
    pub const DUPLICATE_ENTRY: &str = "1";
    pub const ENTRY_DOESNT_EXIST: &str = "4";
    pub const LUN_MAP_EXISTS: &str = "5374922";
    pub const SNAPMIRROR_TRANSFER_IN_PROGRESS: &str = "13303812";
    pub const SNAPMIRROR_TRANSFER_IN_PROGRESS_BROKEN_OFF: &str = "13303808";
    pub const SNAPMIRROR_MODIFICATION_IN_PROGRESS: &str = "13303822";
    pub const VOLUME_BUSY: &str = "917536";
}

fn rest_class(status: u16, code: &str) -> Class {
    use rest_code::*;
    match code {
        ENTRY_DOESNT_EXIST => return Class::NotFound,
        DUPLICATE_ENTRY | LUN_MAP_EXISTS => return Class::Exists,
        SNAPMIRROR_TRANSFER_IN_PROGRESS
        | SNAPMIRROR_TRANSFER_IN_PROGRESS_BROKEN_OFF
        | SNAPMIRROR_MODIFICATION_IN_PROGRESS
        | VOLUME_BUSY => return Class::Transient,
        _ => {}
    }
    match status {
        404 => Class::NotFound,
        409 => Class::Exists,
        408 | 429 | 502 | 503 | 504 => Class::Transient,
        _ => Class::Permanent,
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Classify the outcome of one ZAPI invocation
pub fn classify_zapi(
    site: &CallSite<'_>,
    outcome: std::result::Result<Option<ZapiResponse>, TransportError>,
) -> Result<ZapiResponse> {
    let response = match outcome {
        Err(e) => return Err(report(site, transport_error(site, &e), &transport_status(&e), "")),
        Ok(None) => return Err(report(site, empty_response(site), "", "")),
        Ok(Some(response)) => response,
    };

    if response.status.eq_ignore_ascii_case("passed") {
        return Ok(response);
    }

    let err = from_class(
        site,
        zapi_class(&response.errno),
        &response.status,
        &response.errno,
        &response.reason,
    );
    Err(report(site, err, &response.status, &response.errno))
}

/// Classify the outcome of one REST request
pub fn classify_rest(
    site: &CallSite<'_>,
    outcome: std::result::Result<Option<RestResponse>, TransportError>,
) -> Result<RestResponse> {
    let response = match outcome {
        Err(e) => return Err(report(site, transport_error(site, &e), &transport_status(&e), "")),
        Ok(None) => return Err(report(site, empty_response(site), "", "")),
        Ok(Some(response)) => response,
    };

    if (200..300).contains(&response.status) {
        return Ok(response);
    }

    let status = response.status.to_string();
    let (code, message) = rest_error_fields(response.body.as_ref());

    if response.status == 401 || response.status == 403 {
        let err = Error::Authentication {
            operation: site.operation.to_string(),
            target: site.target.to_string(),
            status: status.clone(),
        };
        return Err(report(site, err, &status, &code));
    }

    let err = from_class(site, rest_class(response.status, &code), &status, &code, &message);
    Err(report(site, err, &status, &code))
}

/// Classify a REST job that finished in the `failure` state
pub fn classify_rest_job(site: &CallSite<'_>, code: &str, message: &str) -> Error {
    // Jobs carry no HTTP status of their own; only the code decides
    let err = from_class(site, rest_class(200, code), "failure", code, message);
    report(site, err, "failure", code)
}

// =============================================================================
// Helpers
// =============================================================================

fn transport_error(site: &CallSite<'_>, e: &TransportError) -> Error {
    match e.kind {
        TransportErrorKind::Status(401) | TransportErrorKind::Status(403) => Error::Authentication {
            operation: site.operation.to_string(),
            target: site.target.to_string(),
            status: transport_status(e),
        },
        TransportErrorKind::Status(400) => Error::Api {
            operation: site.operation.to_string(),
            target: site.target.to_string(),
            status: "400".to_string(),
            code: String::new(),
            reason: e.message.clone(),
            retryable: false,
        },
        _ => Error::Transport {
            operation: site.operation.to_string(),
            target: site.target.to_string(),
            reason: e.to_string(),
        },
    }
}

fn transport_status(e: &TransportError) -> String {
    e.http_status().map(|s| s.to_string()).unwrap_or_default()
}

fn empty_response(site: &CallSite<'_>) -> Error {
    Error::EmptyResponse {
        operation: site.operation.to_string(),
        target: site.target.to_string(),
    }
}

fn from_class(site: &CallSite<'_>, class: Class, status: &str, code: &str, reason: &str) -> Error {
    match class {
        Class::NotFound => Error::not_found(site.resource, site.target),
        Class::Exists => Error::ResourceExists {
            kind: site.resource.to_string(),
            name: site.target.to_string(),
        },
        Class::Transient | Class::Permanent => Error::Api {
            operation: site.operation.to_string(),
            target: site.target.to_string(),
            status: status.to_string(),
            code: code.to_string(),
            reason: reason.to_string(),
            retryable: class == Class::Transient,
        },
    }
}

/// Extract `error.code` and `error.message` from a REST error body
fn rest_error_fields(body: Option<&Value>) -> (String, String) {
    let Some(error) = body.and_then(|b| b.get("error")) else {
        return (String::new(), String::new());
    };
    let code = match error.get("code") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    (code, message)
}

/// The single logging and metrics point for classified failures
fn report(site: &CallSite<'_>, err: Error, status: &str, code: &str) -> Error {
    let kind = err.kind();
    metrics::record_error(site.operation, kind);

    match kind {
        ErrorKind::NotFound => debug!(
            operation = site.operation,
            target = site.target,
            status,
            code,
            "Array reported resource absent"
        ),
        _ if err.is_already_exists() => debug!(
            operation = site.operation,
            target = site.target,
            status,
            code,
            "Array reported resource already exists"
        ),
        ErrorKind::Transient => warn!(
            operation = site.operation,
            target = site.target,
            status,
            code,
            kind = %kind,
            "Array call failed: {}",
            err
        ),
        _ => error!(
            operation = site.operation,
            target = site.target,
            status,
            code,
            kind = %kind,
            "Array call failed: {}",
            err
        ),
    }

    err
}
