// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! L2 agents, as reported to the agent registry.

use crate::{Id, NetworkType, Segment};
use ordermap::OrderMap;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Datapath of an Open vSwitch based agent.
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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DatapathType {
    /// Kernel datapath.
    #[default]
    System,
    /// Userspace (DPDK) datapath.
    Netdev,
}

/// The configuration an agent reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Physical network name to bridge name.
    pub bridge_mappings: OrderMap<String, String>,
    pub tunnel_types: Vec<NetworkType>,
    pub integration_bridge: String,
    pub datapath_type: DatapathType,
    pub local_ip: Option<IpAddr>,
}

impl AgentConfig {
    /// Can an agent with this configuration carry traffic for `segment`?
    #[must_use]
    pub fn reaches(&self, segment: &Segment) -> bool {
        let network_type = segment.network_type();
        match network_type {
            NetworkType::Local => true,
            NetworkType::Flat | NetworkType::Vlan => segment
                .physical_network()
                .is_some_and(|physnet| self.bridge_mappings.contains_key(physnet)),
            NetworkType::Vxlan | NetworkType::Gre | NetworkType::Geneve => {
                self.tunnel_types.contains(&network_type)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Agent {
    pub id: Id<Agent>,
    pub host: String,
    pub agent_type: String,
    #[serde(default = "alive_by_default")]
    pub alive: bool,
    #[serde(default)]
    pub configurations: AgentConfig,
}

fn alive_by_default() -> bool {
    true
}

impl Agent {
    #[must_use]
    pub fn new(host: impl Into<String>, agent_type: impl Into<String>, configurations: AgentConfig) -> Self {
        let host = host.into();
        let agent_type = agent_type.into();
        Self {
            id: Id::new_static(format!("{agent_type}@{host}")),
            host,
            agent_type,
            alive: true,
            configurations,
        }
    }
}
