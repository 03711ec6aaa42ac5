// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration of the binding engine and of the Open vSwitch agent option set.

use derive_builder::Builder;
use model::{AgentConfig, DatapathType, NetworkType};
use ordermap::OrderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::str::FromStr;

use crate::errors::ConfigError;

pub const DEFAULT_MAX_BINDING_LEVELS: u8 = 10;

fn default_max_binding_levels() -> u8 {
    DEFAULT_MAX_BINDING_LEVELS
}

/// Settings of a [`BindingOrchestrator`](crate::orchestrator::BindingOrchestrator).
#[derive(Builder, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigError"))]
#[serde(deny_unknown_fields)]
pub struct BindingConfig {
    /// Names of the mechanism drivers to load, in priority order.
    #[builder(default)]
    #[serde(default)]
    pub mechanism_drivers: Vec<String>,
    /// Upper bound on the depth of a hierarchical binding.
    #[builder(default = "DEFAULT_MAX_BINDING_LEVELS")]
    #[serde(default = "default_max_binding_levels")]
    pub max_binding_levels: u8,
}

impl BindingConfigBuilder {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_binding_levels == Some(0) {
            return Err(ConfigError::NoBindingLevels);
        }
        if let Some(names) = &self.mechanism_drivers {
            check_unique_drivers(names)?;
        }
        Ok(())
    }
}

fn check_unique_drivers(names: &[String]) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::DuplicateDriver(name.clone()));
        }
    }
    Ok(())
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            mechanism_drivers: Vec::new(),
            max_binding_levels: DEFAULT_MAX_BINDING_LEVELS,
        }
    }
}

impl BindingConfig {
    /// Check a deserialized configuration, which bypasses the builder.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_binding_levels == 0 {
            return Err(ConfigError::NoBindingLevels);
        }
        check_unique_drivers(&self.mechanism_drivers)
    }
}

/// Parse `key:value` strings into a map.
///
/// Whitespace around keys and values is ignored, as are empty entries. Keys must be unique, and so
/// must values when `unique_values` is set.
pub fn parse_mappings<S: AsRef<str>>(
    entries: &[S],
    unique_values: bool,
) -> Result<OrderMap<String, String>, ConfigError> {
    let mut mappings = OrderMap::new();
    for entry in entries.iter().map(|e| e.as_ref().trim()) {
        if entry.is_empty() {
            continue;
        }
        let Some((key, value)) = entry.split_once(':') else {
            return Err(ConfigError::BadMapping(entry.to_string()));
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() || value.contains(':') {
            return Err(ConfigError::BadMapping(entry.to_string()));
        }
        if mappings.contains_key(key) {
            return Err(ConfigError::DuplicateKey(key.to_string()));
        }
        if unique_values && mappings.values().any(|v| v == value) {
            return Err(ConfigError::DuplicateValue(value.to_string()));
        }
        mappings.insert(key.to_string(), value.to_string());
    }
    Ok(mappings)
}

/// Options of an Open vSwitch agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OvsAgentConfig {
    pub integration_bridge: String,
    pub tunnel_bridge: String,
    /// Tunnel endpoint address; required when tunnel types are set.
    pub local_ip: Option<IpAddr>,
    /// `physnet:bridge` pairs.
    pub bridge_mappings: Vec<String>,
    pub tunnel_types: Vec<String>,
    pub datapath_type: DatapathType,
    /// Seconds between OpenFlow inactivity probes; zero disables them.
    pub of_inactivity_probe: u32,
}

impl Default for OvsAgentConfig {
    fn default() -> Self {
        Self {
            integration_bridge: "br-int".to_string(),
            tunnel_bridge: "br-tun".to_string(),
            local_ip: None,
            bridge_mappings: Vec::new(),
            tunnel_types: Vec::new(),
            datapath_type: DatapathType::System,
            of_inactivity_probe: 10,
        }
    }
}

impl OvsAgentConfig {
    #[must_use]
    pub fn enable_tunneling(&self) -> bool {
        !self.tunnel_types.is_empty()
    }

    pub fn parsed_bridge_mappings(&self) -> Result<OrderMap<String, String>, ConfigError> {
        parse_mappings(&self.bridge_mappings, true)
    }

    pub fn parsed_tunnel_types(&self) -> Result<Vec<NetworkType>, ConfigError> {
        self.tunnel_types
            .iter()
            .map(|t| {
                NetworkType::from_str(t.trim())
                    .ok()
                    .filter(|nt| nt.is_tunnel())
                    .ok_or_else(|| ConfigError::NotATunnelType(t.clone()))
            })
            .collect()
    }

    /// Validate the options into the configuration the agent reports.
    pub fn to_agent_config(&self) -> Result<AgentConfig, ConfigError> {
        let tunnel_types = self.parsed_tunnel_types()?;
        if !tunnel_types.is_empty() && self.local_ip.is_none() {
            return Err(ConfigError::MissingLocalIp);
        }
        Ok(AgentConfig {
            bridge_mappings: self.parsed_bridge_mappings()?,
            tunnel_types,
            integration_bridge: self.integration_bridge.clone(),
            datapath_type: self.datapath_type,
            local_ip: self.local_ip,
        })
    }
}
