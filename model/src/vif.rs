// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Virtual interface types and details reported by a binding.

use crate::BindingLevel;
use ordermap::OrderMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Details key: the backend applies security group filtering itself.
pub const CAP_PORT_FILTER: &str = "port_filter";
/// Details key: hybrid plugging through a linux bridge.
pub const OVS_HYBRID_PLUG: &str = "ovs_hybrid_plug";
/// Details key: datapath type of the switch the port is plugged into.
pub const VIF_DETAILS_DATAPATH_TYPE: &str = "datapath_type";
/// Details key: name of the bridge the port is plugged into.
pub const VIF_DETAILS_BRIDGE_NAME: &str = "bridge_name";
/// Details key: `index=driver` pairs of the drivers that bound each level.
pub const VIF_DETAILS_BOUND_DRIVERS: &str = "bound_drivers";

/// The kind of virtual interface a binding produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum VifType {
    #[default]
    Unbound,
    BindingFailed,
    /// Bound on every host at once (distributed router ports).
    Distributed,
    Ovs,
    Bridge,
    /// Backend specific value.
    Other(String),
}

impl VifType {
    /// True for every value except unbound and binding failed.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        !matches!(self, VifType::Unbound | VifType::BindingFailed)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            VifType::Unbound => "unbound",
            VifType::BindingFailed => "binding_failed",
            VifType::Distributed => "distributed",
            VifType::Ovs => "ovs",
            VifType::Bridge => "bridge",
            VifType::Other(other) => other,
        }
    }
}

impl From<&str> for VifType {
    fn from(value: &str) -> Self {
        match value {
            "unbound" => VifType::Unbound,
            "binding_failed" => VifType::BindingFailed,
            "distributed" => VifType::Distributed,
            "ovs" => VifType::Ovs,
            "bridge" => VifType::Bridge,
            other => VifType::Other(other.to_string()),
        }
    }
}

impl From<String> for VifType {
    fn from(value: String) -> Self {
        VifType::from(value.as_str())
    }
}

impl From<VifType> for String {
    fn from(value: VifType) -> Self {
        value.as_str().to_string()
    }
}

impl Display for VifType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single capability value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum VifValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for VifValue {
    fn from(value: bool) -> Self {
        VifValue::Bool(value)
    }
}

impl From<i64> for VifValue {
    fn from(value: i64) -> Self {
        VifValue::Int(value)
    }
}

impl From<&str> for VifValue {
    fn from(value: &str) -> Self {
        VifValue::Str(value.to_string())
    }
}

impl From<String> for VifValue {
    fn from(value: String) -> Self {
        VifValue::Str(value)
    }
}

impl Display for VifValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VifValue::Bool(b) => write!(f, "{b}"),
            VifValue::Int(i) => write!(f, "{i}"),
            VifValue::Str(s) => f.write_str(s),
        }
    }
}

/// Capability flags of a bound interface, keyed by capability name.
pub type VifDetails = OrderMap<String, VifValue>;

/// Build [`VifDetails`] from `(key, value)` pairs.
pub fn details<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> VifDetails
where
    K: Into<String>,
    V: Into<VifValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Render the drivers of `levels` as the value of [`VIF_DETAILS_BOUND_DRIVERS`].
///
/// The level to driver mapping is flattened into one string of `index=driver` pairs, in level
/// order and separated by commas, as in `0=tor,1=openvswitch`.
#[must_use]
pub fn bound_drivers(levels: &[BindingLevel]) -> VifValue {
    let rendered: Vec<String> = levels
        .iter()
        .map(|l| format!("{}={}", l.level, l.driver))
        .collect();
    VifValue::Str(rendered.join(","))
}
