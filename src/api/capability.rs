//! Capability Negotiator
//!
//! Derives an immutable feature bitmap from the array version, the protocol
//! in use and the array personality. The bitmap is computed once per
//! validation and read lock-free-ish thereafter: readers clone an `Arc`
//! under a short read lock, writers swap the whole `Arc`.

use crate::api::version::OntapVersion;
use crate::config::ApiProtocol;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

// =============================================================================
// Features
// =============================================================================

/// Optional, version-gated array behaviors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    QosPolicyGroups,
    AdaptiveQosPolicyGroups,
    FlexGroups,
    FlexGroupClone,
    VolumeCloneAsync,
    FabricPoolFlexVol,
    FabricPoolFlexGroup,
    LunGeometrySkip,
    VolumeReplication,
    SvmDisasterRecovery,
}

/// Minimum versions and personality constraint for one feature
#[derive(Debug, Clone, Copy)]
struct Requirement {
    zapi: OntapVersion,
    rest: OntapVersion,
    unified_only: bool,
}

impl Feature {
    pub const ALL: [Feature; 10] = [
        Feature::QosPolicyGroups,
        Feature::AdaptiveQosPolicyGroups,
        Feature::FlexGroups,
        Feature::FlexGroupClone,
        Feature::VolumeCloneAsync,
        Feature::FabricPoolFlexVol,
        Feature::FabricPoolFlexGroup,
        Feature::LunGeometrySkip,
        Feature::VolumeReplication,
        Feature::SvmDisasterRecovery,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    fn requirement(self) -> Requirement {
        let (zapi_minor, rest, unified_only) = match self {
            Feature::QosPolicyGroups => (110, OntapVersion::new(9, 8, 0), false),
            Feature::AdaptiveQosPolicyGroups => (130, OntapVersion::new(9, 8, 0), false),
            Feature::FlexGroups => (120, OntapVersion::new(9, 8, 0), true),
            Feature::FlexGroupClone => (170, OntapVersion::new(9, 8, 0), true),
            Feature::VolumeCloneAsync => (140, OntapVersion::new(9, 8, 0), false),
            Feature::FabricPoolFlexVol => (140, OntapVersion::new(9, 8, 0), false),
            Feature::FabricPoolFlexGroup => (150, OntapVersion::new(9, 8, 0), true),
            Feature::LunGeometrySkip => (150, OntapVersion::new(9, 8, 0), false),
            Feature::VolumeReplication => (130, OntapVersion::new(9, 8, 0), false),
            Feature::SvmDisasterRecovery => (150, OntapVersion::new(9, 10, 0), true),
        };
        Requirement {
            zapi: OntapVersion::new(1, zapi_minor, 0),
            rest,
            unified_only,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// How the array presents itself; SAN-optimized arrays carry no NAS scale-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayPersonality {
    Unified,
    SanOptimized,
}

/// Immutable bitset of supported features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSet(u32);

impl FeatureSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Compute the features available for a version, protocol and personality
    pub fn derive(version: OntapVersion, protocol: ApiProtocol, personality: ArrayPersonality) -> Self {
        if !version.at_least(&minimum_version(protocol)) {
            return Self::empty();
        }

        let mut bits = 0;
        for feature in Feature::ALL {
            let req = feature.requirement();
            let floor = match protocol {
                ApiProtocol::Zapi => req.zapi,
                ApiProtocol::Rest => req.rest,
            };
            if !version.at_least(&floor) {
                continue;
            }
            if req.unified_only && personality == ArrayPersonality::SanOptimized {
                continue;
            }
            bits |= feature.bit();
        }
        Self(bits)
    }

    #[inline]
    pub fn contains(&self, feature: Feature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        Feature::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

/// Lowest version each protocol is supported against
pub fn minimum_version(protocol: ApiProtocol) -> OntapVersion {
    match protocol {
        ApiProtocol::Zapi => OntapVersion::new(1, 110, 0),
        ApiProtocol::Rest => OntapVersion::new(9, 8, 0),
    }
}

// =============================================================================
// Negotiated Capabilities
// =============================================================================

/// Result of one successful validation
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Version string exactly as reported by the array
    pub reported_version: String,
    pub version: OntapVersion,
    pub protocol: ApiProtocol,
    pub personality: ArrayPersonality,
    pub features: FeatureSet,
}

// =============================================================================
// Capability Negotiator
// =============================================================================

/// Two-state machine: unvalidated until [`CapabilityNegotiator::apply`] succeeds
pub struct CapabilityNegotiator {
    protocol: ApiProtocol,
    state: RwLock<Option<Arc<Capabilities>>>,
}

impl CapabilityNegotiator {
    pub fn new(protocol: ApiProtocol) -> Self {
        Self {
            protocol,
            state: RwLock::new(None),
        }
    }

    pub fn protocol(&self) -> ApiProtocol {
        self.protocol
    }

    /// Record the outcome of a validation round trip
    ///
    /// The new state is published in a single swap, so concurrent readers
    /// observe either the previous capabilities or the complete new ones.
    pub fn apply(&self, reported: &str, personality: ArrayPersonality) -> Result<Arc<Capabilities>> {
        let version = match OntapVersion::parse(reported) {
            Ok(v) => v,
            Err(e) => {
                *self.state.write() = None;
                return Err(e);
            }
        };

        let minimum = minimum_version(self.protocol);
        if !version.at_least(&minimum) {
            warn!(
                protocol = %self.protocol,
                version = %version,
                minimum = %minimum,
                "Array version is below the supported floor"
            );
            *self.state.write() = None;
            return Err(Error::UnsupportedVersion {
                version: reported.to_string(),
                minimum: minimum.to_string(),
            });
        }

        let caps = Arc::new(Capabilities {
            reported_version: reported.to_string(),
            version,
            protocol: self.protocol,
            personality,
            features: FeatureSet::derive(version, self.protocol, personality),
        });

        info!(
            protocol = %self.protocol,
            version = %version,
            personality = ?personality,
            features = ?caps.features.iter().collect::<Vec<_>>(),
            "Array API version validated"
        );

        *self.state.write() = Some(caps.clone());
        Ok(caps)
    }

    /// Current capabilities, if validated
    pub fn current(&self) -> Option<Arc<Capabilities>> {
        self.state.read().clone()
    }

    pub fn is_validated(&self) -> bool {
        self.state.read().is_some()
    }

    /// Pure lookup; false for every feature until validated
    pub fn supports(&self, feature: Feature) -> bool {
        self.state
            .read()
            .as_ref()
            .map(|caps| caps.features.contains(feature))
            .unwrap_or(false)
    }

    /// Fail with a permanent error unless `feature` is available
    pub fn require(&self, feature: Feature) -> Result<()> {
        if self.supports(feature) {
            Ok(())
        } else {
            Err(Error::UnsupportedFeature {
                feature: feature.to_string(),
            })
        }
    }
}
