// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! YAML scenarios: a topology, a driver chain and a list of requests to run against it.

use binding::drivers::{
    AGENT_TYPE_OVS, AgentMechanismDriver, HierarchicalDriver, OvsBackend, StaticVifDriver,
};
use binding::memory::{MemoryAgentRegistry, MemoryBindingStore, MemorySegmentRegistry};
use binding::{
    BindingConfig, BindingError, BindingOrchestrator, ConfigError, DriverRegistry,
    MechanismDriver, OvsAgentConfig, PortContext,
};
use model::{
    Agent, Id, InvalidSegment, Network, NetworkType, Port, PortStatus, Segment, SegmentSpec,
    VifDetails, VifType, VnicType,
};
use ordermap::OrderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Invalid scenario: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("Unknown network '{0}'")]
    UnknownNetwork(String),
    #[error("Unknown port '{0}'")]
    UnknownPort(String),
    #[error("Duplicate name '{0}'")]
    DuplicateName(String),
    #[error("Bad segment range {0}")]
    BadRange(String),
    #[error("Invalid segment in network '{0}': {1}")]
    Segment(String, InvalidSegment),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Binding(#[from] BindingError),
}

fn yes() -> bool {
    true
}

fn default_agent_type() -> String {
    AGENT_TYPE_OVS.to_string()
}

/// Pool of segmentation ids the dynamic segment registry draws from.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentRange {
    pub network_type: NetworkType,
    #[serde(default)]
    pub physical_network: Option<String>,
    pub min: u32,
    pub max: u32,
}

/// A mechanism driver of the chain and its options.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum DriverSpec {
    Openvswitch {
        name: String,
        #[serde(default)]
        hybrid_plug: bool,
        #[serde(default = "yes")]
        port_filter: bool,
    },
    Hierarchical {
        name: String,
        physical_network: String,
        upper_types: Vec<NetworkType>,
    },
    Static {
        name: String,
        vif_type: VifType,
        network_types: Vec<NetworkType>,
        #[serde(default)]
        vif_details: VifDetails,
        #[serde(default)]
        vnic_types: Vec<VnicType>,
        #[serde(default)]
        status: Option<PortStatus>,
        #[serde(default)]
        distributed_only: bool,
        #[serde(default)]
        extensions: Option<BTreeSet<String>>,
    },
}

impl DriverSpec {
    pub fn build(&self) -> Result<Box<dyn MechanismDriver>, ConfigError> {
        let driver: Box<dyn MechanismDriver> = match self {
            DriverSpec::Openvswitch {
                name,
                hybrid_plug,
                port_filter,
            } => Box::new(AgentMechanismDriver::new(
                name.clone(),
                OvsBackend {
                    hybrid_plug: *hybrid_plug,
                    port_filter: *port_filter,
                },
            )),
            DriverSpec::Hierarchical {
                name,
                physical_network,
                upper_types,
            } => Box::new(HierarchicalDriver::new(
                name.clone(),
                physical_network.clone(),
                upper_types.iter().copied(),
            )?),
            DriverSpec::Static {
                name,
                vif_type,
                network_types,
                vif_details,
                vnic_types,
                status,
                distributed_only,
                extensions,
            } => {
                let mut driver =
                    StaticVifDriver::new(name.clone(), vif_type.clone(), network_types.iter().copied())
                        .with_details(vif_details.clone());
                if !vnic_types.is_empty() {
                    driver = driver.with_vnic_types(vnic_types.clone());
                }
                if let Some(status) = status {
                    driver = driver.with_status(*status);
                }
                if *distributed_only {
                    driver = driver.distributed_only();
                }
                if let Some(extensions) = extensions {
                    driver = driver.with_extensions(extensions.iter().cloned());
                }
                Box::new(driver)
            }
        };
        Ok(driver)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    pub name: String,
    /// Static segments, offered to the drivers in this order.
    pub segments: Vec<SegmentSpec>,
}

impl NetworkSpec {
    fn build(&self) -> Result<Network, ScenarioError> {
        let segments = self
            .segments
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let id = Id::new_static(format!("{}/{index}", self.name));
                Segment::from_spec(id, spec.clone(), false)
                    .map_err(|e| ScenarioError::Segment(self.name.clone(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Network::new(self.name.clone(), segments))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub host: String,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    #[serde(default = "yes")]
    pub alive: bool,
    #[serde(default)]
    pub ovs: OvsAgentConfig,
}

impl AgentSpec {
    fn build(&self) -> Result<Agent, ConfigError> {
        let mut agent = Agent::new(
            self.host.clone(),
            self.agent_type.clone(),
            self.ovs.to_agent_config()?,
        );
        agent.alive = self.alive;
        Ok(agent)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortSpec {
    pub name: String,
    pub network: String,
    #[serde(default)]
    pub vnic_type: VnicType,
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub extensions: BTreeSet<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Request {
    Bind { port: String, host: String },
    Unbind { port: String },
    Delete { port: String },
    /// Mark the agents of a host alive or dead.
    AgentAlive { host: String, alive: bool },
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Bind { port, host } => write!(f, "bind {port} on {host}"),
            Request::Unbind { port } => write!(f, "unbind {port}"),
            Request::Delete { port } => write!(f, "delete {port}"),
            Request::AgentAlive { host, alive } => write!(f, "agents of {host} alive={alive}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub binding: BindingConfig,
    #[serde(default)]
    pub segment_ranges: Vec<SegmentRange>,
    pub drivers: Vec<DriverSpec>,
    pub networks: Vec<NetworkSpec>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub requests: Vec<Request>,
}

/// What a request did, as printed by the tool.
#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vif_type: Option<VifType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vif_details: Option<VifDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Report {
    fn new(request: &Request) -> Self {
        Self {
            request: request.to_string(),
            ..Self::default()
        }
    }

    fn with_context(mut self, ctx: &PortContext) -> Self {
        self.state = Some(ctx.state().to_string());
        self.vif_type = Some(ctx.vif_type().clone());
        if !ctx.vif_details().is_empty() {
            self.vif_details = Some(ctx.vif_details().clone());
        }
        self.levels = ctx.binding_levels().iter().map(ToString::to_string).collect();
        self
    }

    fn with_error(mut self, error: &BindingError) -> Self {
        self.error = Some(if error.is_internal() {
            format!("internal error: {error}")
        } else {
            error.to_string()
        });
        self
    }
}

fn index_by_name<T>(
    items: impl IntoIterator<Item = (String, T)>,
) -> Result<OrderMap<String, T>, ScenarioError> {
    let mut map = OrderMap::new();
    for (name, item) in items {
        if map.contains_key(&name) {
            return Err(ScenarioError::DuplicateName(name));
        }
        map.insert(name, item);
    }
    Ok(map)
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    fn segment_registry(&self) -> Result<MemorySegmentRegistry, ScenarioError> {
        let mut registry = MemorySegmentRegistry::default();
        for range in &self.segment_ranges {
            let bad = || {
                ScenarioError::BadRange(format!(
                    "{}:{}:{}:{}",
                    range.network_type,
                    range.physical_network.as_deref().unwrap_or_default(),
                    range.min,
                    range.max
                ))
            };
            if range.min > range.max {
                return Err(bad());
            }
            registry = match (range.network_type, range.physical_network.as_deref()) {
                (NetworkType::Vlan, Some(physnet)) => {
                    registry.with_vlan_range(physnet, range.min..=range.max)
                }
                (network_type, None) if network_type.is_tunnel() => {
                    registry.with_tunnel_range(network_type, range.min..=range.max)
                }
                _ => return Err(bad()),
            };
        }
        Ok(registry)
    }

    /// Build the topology and the orchestrator the requests run against.
    pub fn runner(&self) -> Result<Runner, ScenarioError> {
        let segments = Arc::new(self.segment_registry()?);
        let networks = index_by_name(
            self.networks
                .iter()
                .map(|spec| Ok((spec.name.clone(), spec.build()?)))
                .collect::<Result<Vec<_>, ScenarioError>>()?,
        )?;
        for network in networks.values() {
            segments.reserve_static(network);
        }

        let agents = Arc::new(MemoryAgentRegistry::new(
            self.agents
                .iter()
                .map(AgentSpec::build)
                .collect::<Result<Vec<_>, _>>()?,
        ));

        let mut ports = Vec::with_capacity(self.ports.len());
        for spec in &self.ports {
            let network = networks
                .get(&spec.network)
                .ok_or_else(|| ScenarioError::UnknownNetwork(spec.network.clone()))?;
            let mut port = Port::new(network);
            port.id = Id::new_static(&spec.name);
            port.vnic_type = spec.vnic_type.clone();
            port.device_owner.clone_from(&spec.device_owner);
            port.extensions.clone_from(&spec.extensions);
            ports.push((spec.name.clone(), port));
        }
        let ports = index_by_name(ports)?;

        let available = self
            .drivers
            .iter()
            .map(DriverSpec::build)
            .collect::<Result<Vec<_>, _>>()?;
        let mut config = self.binding.clone();
        if config.mechanism_drivers.is_empty() {
            config.mechanism_drivers = available.iter().map(|d| d.name().to_string()).collect();
        }
        config.validate()?;
        let registry = DriverRegistry::from_config(&config, available)?;

        let orchestrator = BindingOrchestrator::new(
            config,
            registry,
            segments,
            agents.clone(),
            Arc::new(MemoryBindingStore::new()),
        );
        info!(
            "Scenario loaded: {} networks, {} ports, drivers {:?}",
            networks.len(),
            ports.len(),
            orchestrator.registry().names()
        );
        Ok(Runner {
            orchestrator,
            agents,
            networks,
            ports,
        })
    }
}

/// A loaded scenario, ready to run requests.
pub struct Runner {
    orchestrator: BindingOrchestrator,
    agents: Arc<MemoryAgentRegistry>,
    networks: OrderMap<String, Network>,
    ports: OrderMap<String, Port>,
}

impl Runner {
    fn port(&self, name: &str) -> Result<(&Port, &Network), ScenarioError> {
        let port = self
            .ports
            .get(name)
            .ok_or_else(|| ScenarioError::UnknownPort(name.to_string()))?;
        let network = self
            .networks
            .values()
            .find(|n| n.id == port.network_id)
            .ok_or_else(|| ScenarioError::UnknownNetwork(port.network_id.to_string()))?;
        Ok((port, network))
    }

    /// Run `request`. Binding errors are part of the report; only requests naming unknown
    /// ports fail.
    pub fn apply(&self, request: &Request) -> Result<Report, ScenarioError> {
        debug!("Running request: {request}");
        let report = Report::new(request);
        let report = match request {
            Request::Bind { port, host } => {
                let (port, network) = self.port(port)?;
                match self.orchestrator.bind(port, network, host) {
                    Ok(ctx) => report.with_context(&ctx),
                    Err(e) => report.with_error(&e),
                }
            }
            Request::Unbind { port } => {
                let (port, network) = self.port(port)?;
                match self.orchestrator.unbind(port, network) {
                    Ok(Some(ctx)) => report.with_context(&ctx),
                    Ok(None) => Report {
                        note: Some("not bound".to_string()),
                        ..report
                    },
                    Err(e) => report.with_error(&e),
                }
            }
            Request::Delete { port } => {
                let (port, network) = self.port(port)?;
                match self.orchestrator.delete_port(port, network) {
                    Ok(()) => Report {
                        note: Some("deleted".to_string()),
                        ..report
                    },
                    Err(e) => report.with_error(&e),
                }
            }
            Request::AgentAlive { host, alive } => {
                let changed = self
                    .agents
                    .set_alive(host, AGENT_TYPE_OVS, *alive);
                Report {
                    note: Some(format!("{changed} agents changed")),
                    ..report
                }
            }
        };
        Ok(report)
    }
}
