//! Fault injection for LUN provisioning tests
//!
//! A [`FaultHook`] is consulted just before the array call at each
//! [`FaultPoint`]. Hooks can only be installed through
//! `BackendOptions::with_fault_hook`, which exists in test builds and with
//! the `test-backdoors` feature; release builds carry no hook.

use crate::error::{Error, Result};
use std::fmt;

/// Places in the LUN workflow where a fault can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    LunCreate,
    LunSetAttribute,
}

impl fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPoint::LunCreate => write!(f, "lun-create"),
            FaultPoint::LunSetAttribute => write!(f, "lun-set-attribute"),
        }
    }
}

/// Decides whether a call for `name` at `point` should fail
pub trait FaultHook: Send + Sync + fmt::Debug {
    fn should_fail(&self, point: FaultPoint, name: &str) -> bool;
}

/// Fails one point for resources whose name contains a marker
#[derive(Debug, Clone)]
pub struct NameMarkerFault {
    pub point: FaultPoint,
    pub marker: String,
}

impl NameMarkerFault {
    pub fn new(point: FaultPoint, marker: impl Into<String>) -> Self {
        Self {
            point,
            marker: marker.into(),
        }
    }
}

impl FaultHook for NameMarkerFault {
    fn should_fail(&self, point: FaultPoint, name: &str) -> bool {
        point == self.point && name.contains(&self.marker)
    }
}

/// Run the optional hook, turning a hit into a permanent error
pub(crate) fn check(hook: Option<&dyn FaultHook>, point: FaultPoint, name: &str) -> Result<()> {
    match hook {
        Some(hook) if hook.should_fail(point, name) => Err(Error::InjectedFault {
            point: point.to_string(),
            name: name.to_string(),
        }),
        _ => Ok(()),
    }
}
