// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network segments: one encapsulation layer of a network.

use crate::Id;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;

/// The encapsulation used by a segment.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIs,
    strum::EnumIter,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Flat,
    Vlan,
    Vxlan,
    Gre,
    Geneve,
    Local,
}

impl NetworkType {
    /// Tunnel types are carried over the underlay rather than on a physical network.
    #[must_use]
    pub const fn is_tunnel(self) -> bool {
        matches!(self, NetworkType::Vxlan | NetworkType::Gre | NetworkType::Geneve)
    }

    /// Types which name the physical network they are attached to.
    #[must_use]
    pub const fn requires_physical_network(self) -> bool {
        matches!(self, NetworkType::Flat | NetworkType::Vlan)
    }

    /// Hierarchical types may be resolved into a lower level by any driver.
    #[must_use]
    pub const fn is_hierarchical(self) -> bool {
        matches!(self, NetworkType::Local)
    }

    /// Physical types are always the bottom of a binding.
    #[must_use]
    pub const fn is_physical(self) -> bool {
        self.requires_physical_network()
    }

    /// Legal segmentation ids for this type, if the type carries one.
    #[must_use]
    pub const fn segmentation_range(self) -> Option<RangeInclusive<u32>> {
        match self {
            NetworkType::Vlan => Some(1..=4094),
            NetworkType::Vxlan | NetworkType::Geneve => Some(1..=0x00FF_FFFF),
            NetworkType::Gre => Some(1..=u32::MAX),
            NetworkType::Flat | NetworkType::Local => None,
        }
    }
}

/// Reasons a set of segment attributes is not a legal segment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSegment {
    #[error("{0} segments require a physical network")]
    MissingPhysicalNetwork(NetworkType),
    #[error("{0} segments cannot name a physical network ('{1}')")]
    UnexpectedPhysicalNetwork(NetworkType, String),
    #[error("{0} segments require a segmentation id")]
    MissingSegmentationId(NetworkType),
    #[error("{0} segments do not carry a segmentation id (got {1})")]
    UnexpectedSegmentationId(NetworkType, u32),
    #[error("segmentation id {1} out of range {range:?} for {0}", range = .0.segmentation_range())]
    SegmentationIdOutOfRange(NetworkType, u32),
}

/// Partial segment attributes, as used when requesting a dynamic segment.
///
/// Unlike a [`Segment`], a spec for a vlan may omit the segmentation id; the segment registry
/// picks one.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[builder(build_fn(validate = "Self::validate", error = "InvalidSegmentSpec"))]
pub struct SegmentSpec {
    pub network_type: NetworkType,
    #[builder(setter(into, strip_option), default)]
    #[serde(default)]
    pub physical_network: Option<String>,
    #[builder(setter(strip_option), default)]
    #[serde(default)]
    pub segmentation_id: Option<u32>,
}

/// Errors building a [`SegmentSpec`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSegmentSpec {
    #[error("missing field: {0}")]
    Uninitialized(&'static str),
    #[error(transparent)]
    Invalid(#[from] InvalidSegment),
}

impl From<derive_builder::UninitializedFieldError> for InvalidSegmentSpec {
    fn from(value: derive_builder::UninitializedFieldError) -> Self {
        InvalidSegmentSpec::Uninitialized(value.field_name())
    }
}

impl SegmentSpecBuilder {
    fn validate(&self) -> Result<(), InvalidSegmentSpec> {
        let Some(network_type) = self.network_type else {
            return Ok(());
        };
        check_physical_network(
            network_type,
            self.physical_network.as_ref().and_then(|p| p.as_deref()),
        )?;
        if let Some(Some(id)) = self.segmentation_id {
            check_segmentation_id(network_type, Some(id), false)?;
        }
        Ok(())
    }
}

impl SegmentSpec {
    #[must_use]
    pub fn new(network_type: NetworkType) -> Self {
        Self {
            network_type,
            physical_network: None,
            segmentation_id: None,
        }
    }

    /// True if `segment` has every attribute this spec pins down.
    #[must_use]
    pub fn matches(&self, segment: &Segment) -> bool {
        self.network_type == segment.network_type()
            && (self.physical_network.is_none()
                || self.physical_network.as_deref() == segment.physical_network())
            && (self.segmentation_id.is_none() || self.segmentation_id == segment.segmentation_id())
    }
}

fn check_physical_network(
    network_type: NetworkType,
    physical_network: Option<&str>,
) -> Result<(), InvalidSegment> {
    match (network_type.requires_physical_network(), physical_network) {
        (true, None) => Err(InvalidSegment::MissingPhysicalNetwork(network_type)),
        (false, Some(physnet)) => Err(InvalidSegment::UnexpectedPhysicalNetwork(
            network_type,
            physnet.to_string(),
        )),
        _ => Ok(()),
    }
}

fn check_segmentation_id(
    network_type: NetworkType,
    segmentation_id: Option<u32>,
    required: bool,
) -> Result<(), InvalidSegment> {
    match (network_type.segmentation_range(), segmentation_id) {
        (None, None) => Ok(()),
        (None, Some(id)) => Err(InvalidSegment::UnexpectedSegmentationId(network_type, id)),
        (Some(_), None) if required => Err(InvalidSegment::MissingSegmentationId(network_type)),
        (Some(_), None) => Ok(()),
        (Some(range), Some(id)) if range.contains(&id) => Ok(()),
        (Some(_), Some(id)) => Err(InvalidSegment::SegmentationIdOutOfRange(network_type, id)),
    }
}

/// One encapsulation layer of a network.
///
/// Segments are immutable once created: the attributes are only reachable through accessors and
/// every constructor validates them against the network type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSegment", into = "RawSegment")]
pub struct Segment {
    id: Id<Segment>,
    network_type: NetworkType,
    physical_network: Option<String>,
    segmentation_id: Option<u32>,
    dynamic: bool,
}

#[derive(Serialize, Deserialize)]
struct RawSegment {
    id: Id<Segment>,
    network_type: NetworkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    physical_network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    segmentation_id: Option<u32>,
    #[serde(default)]
    dynamic: bool,
}

impl TryFrom<RawSegment> for Segment {
    type Error = InvalidSegment;

    fn try_from(raw: RawSegment) -> Result<Self, Self::Error> {
        let spec = SegmentSpec {
            network_type: raw.network_type,
            physical_network: raw.physical_network,
            segmentation_id: raw.segmentation_id,
        };
        Segment::from_spec(raw.id, spec, raw.dynamic)
    }
}

impl From<Segment> for RawSegment {
    fn from(segment: Segment) -> Self {
        RawSegment {
            id: segment.id,
            network_type: segment.network_type,
            physical_network: segment.physical_network,
            segmentation_id: segment.segmentation_id,
            dynamic: segment.dynamic,
        }
    }
}

impl Segment {
    /// Materialize a segment from a fully specified set of attributes.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSegment`] if the physical network or segmentation id do not fit the
    /// network type.
    pub fn from_spec(id: Id<Segment>, spec: SegmentSpec, dynamic: bool) -> Result<Self, InvalidSegment> {
        check_physical_network(spec.network_type, spec.physical_network.as_deref())?;
        check_segmentation_id(spec.network_type, spec.segmentation_id, true)?;
        Ok(Segment {
            id,
            network_type: spec.network_type,
            physical_network: spec.physical_network,
            segmentation_id: spec.segmentation_id,
            dynamic,
        })
    }

    pub fn flat(id: Id<Segment>, physical_network: impl Into<String>) -> Result<Self, InvalidSegment> {
        let spec = SegmentSpec {
            physical_network: Some(physical_network.into()),
            ..SegmentSpec::new(NetworkType::Flat)
        };
        Self::from_spec(id, spec, false)
    }

    pub fn vlan(
        id: Id<Segment>,
        physical_network: impl Into<String>,
        vid: u32,
    ) -> Result<Self, InvalidSegment> {
        let spec = SegmentSpec {
            network_type: NetworkType::Vlan,
            physical_network: Some(physical_network.into()),
            segmentation_id: Some(vid),
        };
        Self::from_spec(id, spec, false)
    }

    /// A vxlan, gre or geneve segment.
    pub fn tunnel(
        id: Id<Segment>,
        network_type: NetworkType,
        segmentation_id: u32,
    ) -> Result<Self, InvalidSegment> {
        let spec = SegmentSpec {
            segmentation_id: Some(segmentation_id),
            ..SegmentSpec::new(network_type)
        };
        Self::from_spec(id, spec, false)
    }

    #[must_use]
    pub fn local(id: Id<Segment>) -> Self {
        Segment {
            id,
            network_type: NetworkType::Local,
            physical_network: None,
            segmentation_id: None,
            dynamic: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> Id<Segment> {
        self.id
    }

    #[must_use]
    pub fn network_type(&self) -> NetworkType {
        self.network_type
    }

    #[must_use]
    pub fn physical_network(&self) -> Option<&str> {
        self.physical_network.as_deref()
    }

    #[must_use]
    pub fn segmentation_id(&self) -> Option<u32> {
        self.segmentation_id
    }

    /// True if the segment was allocated while binding a port rather than declared on the
    /// network.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    #[must_use]
    pub fn spec(&self) -> SegmentSpec {
        SegmentSpec {
            network_type: self.network_type,
            physical_network: self.physical_network.clone(),
            segmentation_id: self.segmentation_id,
        }
    }

    /// Can `next` sit directly below `self` in a binding?
    ///
    /// Physical segments (flat, vlan) are always the bottom of a binding. Hierarchical and tunnel
    /// segments may be followed by one lower level, which must be a different, non-hierarchical
    /// segment. For tunnel types this is only reachable through an explicit continuation by the
    /// driver that claimed the tunnel segment.
    #[must_use]
    pub fn may_precede(&self, next: &Segment) -> bool {
        !self.network_type.is_physical()
            && !next.network_type.is_hierarchical()
            && self.id != next.id
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.network_type)?;
        if let Some(physnet) = &self.physical_network {
            write!(f, ":{physnet}")?;
        }
        if let Some(id) = self.segmentation_id {
            write!(f, ":{id}")?;
        }
        write!(f, " ({})", self.id)
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::segment::{NetworkType, Segment, SegmentSpec};
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for NetworkType {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            Some(match driver.produce::<u8>()? % 6 {
                0 => NetworkType::Flat,
                1 => NetworkType::Vlan,
                2 => NetworkType::Vxlan,
                3 => NetworkType::Gre,
                4 => NetworkType::Geneve,
                _ => NetworkType::Local,
            })
        }
    }

    /// Generates only legal segments.
    impl TypeGenerator for Segment {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let network_type: NetworkType = driver.produce()?;
            let physical_network = network_type
                .requires_physical_network()
                .then(|| format!("physnet{}", driver.produce::<u8>().unwrap_or_default() % 4));
            let segmentation_id = match network_type.segmentation_range() {
                None => None,
                Some(range) => {
                    let span = u64::from(*range.end()) - u64::from(*range.start()) + 1;
                    let offset = u64::from(driver.produce::<u32>()?) % span;
                    u32::try_from(u64::from(*range.start()) + offset).ok()
                }
            };
            let spec = SegmentSpec {
                network_type,
                physical_network,
                segmentation_id,
            };
            Segment::from_spec(driver.produce()?, spec, driver.produce()?).ok()
        }
    }
}
