// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Drivers that bind ports through an L2 agent running on the host.

use model::vif::{self, CAP_PORT_FILTER, OVS_HYBRID_PLUG, VIF_DETAILS_BRIDGE_NAME, VIF_DETAILS_DATAPATH_TYPE};
use model::{Agent, DatapathType, Segment, VifDetails, VifType, VnicType};
use std::collections::BTreeSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collaborators::AgentRegistry;
use crate::context::PortContext;
use crate::driver::MechanismDriver;
use crate::errors::DriverError;

pub const AGENT_TYPE_OVS: &str = "Open vSwitch agent";

/// What an [`AgentMechanismDriver`] needs to know about one kind of agent.
pub trait AgentBackend: Send + Sync {
    fn agent_type(&self) -> &str;

    fn vif_type(&self, agent: &Agent, segment: &Segment) -> VifType;

    fn vif_details(&self, agent: &Agent, segment: &Segment) -> VifDetails;

    /// Can `agent` carry traffic for `segment`?
    fn check_segment_for_agent(&self, segment: &Segment, agent: &Agent) -> bool {
        agent.configurations.reaches(segment)
    }

    fn supported_vnic_types(&self) -> Vec<VnicType> {
        vec![VnicType::Normal]
    }

    fn resource_provider_uuid5_namespace(&self) -> Option<Uuid> {
        None
    }
}

/// Binds the first segment a live agent of the backend's type on the host can reach.
#[derive(Debug, Clone)]
pub struct AgentMechanismDriver<B> {
    name: String,
    backend: B,
}

impl<B: AgentBackend> AgentMechanismDriver<B> {
    #[must_use]
    pub fn new(name: impl Into<String>, backend: B) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn reaches_any(&self, agent: &Agent, segments: &[Segment]) -> bool {
        segments
            .iter()
            .any(|s| self.backend.check_segment_for_agent(s, agent))
    }
}

impl<B: AgentBackend> MechanismDriver for AgentMechanismDriver<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind_port(&self, ctx: &mut PortContext) -> Result<(), DriverError> {
        let segments = ctx.segments_to_bind().to_vec();
        for agent in ctx.host_agents(Some(self.backend.agent_type())) {
            if !agent.alive {
                warn!(
                    "Not binding port {} to dead agent {} on host {}",
                    ctx.current().id,
                    agent.id,
                    agent.host
                );
                continue;
            }
            let Some(segment) = segments
                .iter()
                .find(|s| self.backend.check_segment_for_agent(s, &agent))
            else {
                debug!("Agent {} on {} reaches none of {} segments", agent.id, agent.host, segments.len());
                continue;
            };
            ctx.set_binding(
                Some(segment.id()),
                self.backend.vif_type(&agent, segment),
                self.backend.vif_details(&agent, segment),
                None,
            )?;
            return Ok(());
        }
        Ok(())
    }

    fn filter_hosts_with_segment_access(
        &self,
        _ctx: &PortContext,
        segments: &[Segment],
        candidate_hosts: &BTreeSet<String>,
        agents: &dyn AgentRegistry,
    ) -> BTreeSet<String> {
        candidate_hosts
            .iter()
            .filter(|host| {
                let live: Vec<Agent> = agents
                    .agents(host, Some(self.backend.agent_type()))
                    .into_iter()
                    .filter(|a| a.alive)
                    .collect();
                !live.is_empty() && !live.iter().any(|a| self.reaches_any(a, segments))
            })
            .cloned()
            .collect()
    }

    fn supported_vnic_types(&self) -> Vec<VnicType> {
        self.backend.supported_vnic_types()
    }

    fn resource_provider_uuid5_namespace(&self) -> Option<Uuid> {
        self.backend.resource_provider_uuid5_namespace()
    }
}

/// Open vSwitch agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OvsBackend {
    /// Plug through a linux bridge so iptables can filter the port.
    pub hybrid_plug: bool,
    /// The agent's firewall filters the port.
    pub port_filter: bool,
}

impl Default for OvsBackend {
    fn default() -> Self {
        Self {
            hybrid_plug: false,
            port_filter: true,
        }
    }
}

impl OvsBackend {
    pub const RESOURCE_PROVIDER_NAMESPACE: Uuid =
        Uuid::from_u128(0x87ee_7d5c_73bb_11e8_9008_c4d9_87b2_a692);
}

impl AgentBackend for OvsBackend {
    fn agent_type(&self) -> &str {
        AGENT_TYPE_OVS
    }

    fn vif_type(&self, agent: &Agent, _segment: &Segment) -> VifType {
        match agent.configurations.datapath_type {
            DatapathType::System => VifType::Ovs,
            DatapathType::Netdev => VifType::Other("vhostuser".to_string()),
        }
    }

    fn vif_details(&self, agent: &Agent, _segment: &Segment) -> VifDetails {
        let config = &agent.configurations;
        let userspace = config.datapath_type == DatapathType::Netdev;
        let mut details = vif::details([
            (CAP_PORT_FILTER, self.port_filter),
            (OVS_HYBRID_PLUG, self.hybrid_plug && !userspace),
        ]);
        details.insert(
            VIF_DETAILS_DATAPATH_TYPE.to_string(),
            config.datapath_type.to_string().into(),
        );
        if !config.integration_bridge.is_empty() {
            details.insert(
                VIF_DETAILS_BRIDGE_NAME.to_string(),
                config.integration_bridge.clone().into(),
            );
        }
        details
    }

    fn supported_vnic_types(&self) -> Vec<VnicType> {
        vec![VnicType::Normal, VnicType::Direct, VnicType::SmartNic]
    }

    fn resource_provider_uuid5_namespace(&self) -> Option<Uuid> {
        Some(Self::RESOURCE_PROVIDER_NAMESPACE)
    }
}
