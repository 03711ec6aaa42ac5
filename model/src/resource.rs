// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Networks, subnets and ports, as read from the external record provider.

use crate::{Id, Segment};
use ipnet::IpNet;
use ordermap::OrderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;

/// Device owner of distributed router interfaces.
pub const DEVICE_OWNER_DVR_INTERFACE: &str = "network:router_interface_distributed";
/// Device owner of compute instance ports (prefix).
pub const DEVICE_OWNER_COMPUTE_PREFIX: &str = "compute:";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Network {
    pub id: Id<Network>,
    pub name: String,
    /// Static segments, in the order they are offered to the drivers.
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Network {
    #[must_use]
    pub fn new(name: impl Into<String>, segments: Vec<Segment>) -> Self {
        let name = name.into();
        Self {
            id: Id::new_static(&name),
            name,
            segments,
        }
    }

    #[must_use]
    pub fn segment(&self, id: Id<Segment>) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id() == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subnet {
    pub id: Id<Subnet>,
    pub network_id: Id<Network>,
    pub cidr: IpNet,
    #[serde(default)]
    pub gateway_ip: Option<IpAddr>,
}

impl Subnet {
    #[must_use]
    pub fn new(network: &Network, cidr: IpNet) -> Self {
        Self {
            id: Id::new(),
            network_id: network.id,
            cidr,
            gateway_ip: cidr.hosts().next(),
        }
    }
}

/// Operational status of a port.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PortStatus {
    Active,
    #[default]
    Down,
    Build,
    Error,
}

/// The kind of virtual NIC requested for a port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum VnicType {
    #[default]
    Normal,
    Direct,
    Macvtap,
    Baremetal,
    DirectPhysical,
    VirtioForwarder,
    SmartNic,
    RemoteManaged,
    /// Backend specific value.
    #[strum(default)]
    #[serde(untagged)]
    Other(String),
}

impl Display for VnicType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VnicType::Normal => "normal",
            VnicType::Direct => "direct",
            VnicType::Macvtap => "macvtap",
            VnicType::Baremetal => "baremetal",
            VnicType::DirectPhysical => "direct-physical",
            VnicType::VirtioForwarder => "virtio-forwarder",
            VnicType::SmartNic => "smart-nic",
            VnicType::RemoteManaged => "remote-managed",
            VnicType::Other(name) => name,
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Port {
    pub id: Id<Port>,
    pub network_id: Id<Network>,
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub status: PortStatus,
    #[serde(default)]
    pub vnic_type: VnicType,
    #[serde(default)]
    pub profile: OrderMap<String, String>,
    /// Per-port trust flag. `None` means the flag was never set, which is distinct from an
    /// explicit `false`.
    #[serde(default)]
    pub trusted: Option<bool>,
    /// API extensions the port makes use of. Only drivers supporting all of them bind it.
    #[serde(default)]
    pub extensions: BTreeSet<String>,
}

impl Port {
    #[must_use]
    pub fn new(network: &Network) -> Self {
        Self {
            id: Id::new(),
            network_id: network.id,
            device_owner: String::new(),
            status: PortStatus::Down,
            vnic_type: VnicType::Normal,
            profile: OrderMap::new(),
            trusted: None,
            extensions: BTreeSet::new(),
        }
    }

    /// Distributed router interfaces are bound on every host at once.
    #[must_use]
    pub fn is_distributed(&self) -> bool {
        self.device_owner == DEVICE_OWNER_DVR_INTERFACE
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn vnic_types() {
        assert_eq!(VnicType::from_str("direct-physical").unwrap(), VnicType::DirectPhysical);
        assert_eq!(
            VnicType::from_str("test_mechanism_driver_vnic_type").unwrap(),
            VnicType::Other("test_mechanism_driver_vnic_type".into())
        );
        let parsed: VnicType = serde_yaml_ng::from_str("vdpa").unwrap();
        assert_eq!(parsed, VnicType::Other("vdpa".into()));
        let parsed: VnicType = serde_yaml_ng::from_str("smart-nic").unwrap();
        assert_eq!(parsed, VnicType::SmartNic);
        assert_eq!(VnicType::VirtioForwarder.to_string(), "virtio-forwarder");
        assert_eq!(VnicType::Other("vdpa".into()).to_string(), "vdpa");
    }

    #[test]
    fn trusted_flag_defaults_to_unset() {
        let net = Network::new("net1", vec![]);
        let yaml = format!("id: {}\nnetwork_id: {}\n", Id::<Port>::new(), net.id);
        let port: Port = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(port.trusted, None);
        assert_eq!(port.status, PortStatus::Down);
        assert_eq!(port.vnic_type, VnicType::Normal);
        assert!(port.extensions.is_empty());
    }

    #[test]
    fn subnet_gateway_is_first_host() {
        let net = Network::new("net1", vec![]);
        let subnet = Subnet::new(&net, "10.0.0.0/24".parse().unwrap());
        assert_eq!(subnet.gateway_ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(subnet.network_id, net.id);
    }
}
