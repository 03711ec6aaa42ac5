// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A top-of-rack style driver: it resolves an upper segment into a vlan of its physical
//! network and lets the rest of the chain bind that vlan.

use model::{NetworkType, SegmentSpec, VnicType};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::context::PortContext;
use crate::driver::MechanismDriver;
use crate::errors::{BindingError, ConfigError, DriverError};

#[derive(Debug, Clone)]
pub struct HierarchicalDriver {
    name: String,
    upper_types: BTreeSet<NetworkType>,
    physical_network: String,
    vnic_types: Vec<VnicType>,
}

impl HierarchicalDriver {
    /// A driver continuing segments of `upper_types` with vlans of `physical_network`.
    ///
    /// Flat and vlan segments are always the bottom of a binding and cannot be upper types.
    pub fn new(
        name: impl Into<String>,
        physical_network: impl Into<String>,
        upper_types: impl IntoIterator<Item = NetworkType>,
    ) -> Result<Self, ConfigError> {
        let upper_types: BTreeSet<NetworkType> = upper_types.into_iter().collect();
        if let Some(physical) = upper_types.iter().find(|t| t.is_physical()) {
            return Err(ConfigError::NotAnUpperType(physical.to_string()));
        }
        Ok(Self {
            name: name.into(),
            upper_types,
            physical_network: physical_network.into(),
            vnic_types: vec![VnicType::Normal],
        })
    }

    #[must_use]
    pub fn with_vnic_types(mut self, vnic_types: Vec<VnicType>) -> Self {
        self.vnic_types = vnic_types;
        self
    }
}

impl MechanismDriver for HierarchicalDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind_port(&self, ctx: &mut PortContext) -> Result<(), DriverError> {
        let Some(upper) = ctx
            .segments_to_bind()
            .iter()
            .find(|s| self.upper_types.contains(&s.network_type()))
            .cloned()
        else {
            return Ok(());
        };
        let spec = SegmentSpec {
            physical_network: Some(self.physical_network.clone()),
            ..SegmentSpec::new(NetworkType::Vlan)
        };
        let lower = match ctx.allocate_dynamic_segment(&spec) {
            Ok(lower) => lower,
            Err(BindingError::Segment(e)) => {
                warn!("Cannot continue {upper} on {}: {e}", self.physical_network);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Continuing {upper} with {lower} for port {}", ctx.current().id);
        ctx.continue_binding(upper.id(), vec![lower])?;
        Ok(())
    }

    fn supported_vnic_types(&self) -> Vec<VnicType> {
        self.vnic_types.clone()
    }
}
