// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Drivers whose binding does not depend on anything running on the host.

use model::{NetworkType, PortStatus, VifDetails, VifType, VnicType};
use std::collections::BTreeSet;

use crate::context::PortContext;
use crate::driver::MechanismDriver;
use crate::errors::DriverError;

/// Binds the first segment of one of its network types, with a fixed VIF type and details.
#[derive(Debug, Clone)]
pub struct StaticVifDriver {
    name: String,
    network_types: BTreeSet<NetworkType>,
    vif_type: VifType,
    vif_details: VifDetails,
    vnic_types: Vec<VnicType>,
    status: Option<PortStatus>,
    distributed_only: bool,
    /// `None` supports every extension.
    extensions: Option<BTreeSet<String>>,
}

impl StaticVifDriver {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        vif_type: VifType,
        network_types: impl IntoIterator<Item = NetworkType>,
    ) -> Self {
        Self {
            name: name.into(),
            network_types: network_types.into_iter().collect(),
            vif_type,
            vif_details: VifDetails::new(),
            vnic_types: vec![VnicType::Normal],
            status: None,
            distributed_only: false,
            extensions: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, vif_details: VifDetails) -> Self {
        self.vif_details = vif_details;
        self
    }

    #[must_use]
    pub fn with_vnic_types(mut self, vnic_types: Vec<VnicType>) -> Self {
        self.vnic_types = vnic_types;
        self
    }

    /// Report `status` for the ports this driver binds.
    #[must_use]
    pub fn with_status(mut self, status: PortStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict the API extensions this driver supports to `extensions`.
    #[must_use]
    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = String>) -> Self {
        self.extensions = Some(extensions.into_iter().collect());
        self
    }

    /// Only bind distributed router interfaces.
    #[must_use]
    pub fn distributed_only(mut self) -> Self {
        self.distributed_only = true;
        self
    }
}

impl MechanismDriver for StaticVifDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind_port(&self, ctx: &mut PortContext) -> Result<(), DriverError> {
        if self.distributed_only && !ctx.current().is_distributed() {
            return Ok(());
        }
        let Some(segment) = ctx
            .segments_to_bind()
            .iter()
            .find(|s| self.network_types.contains(&s.network_type()))
            .map(model::Segment::id)
        else {
            return Ok(());
        };
        ctx.set_binding(
            Some(segment),
            self.vif_type.clone(),
            self.vif_details.clone(),
            self.status,
        )?;
        Ok(())
    }

    fn supported_vnic_types(&self) -> Vec<VnicType> {
        self.vnic_types.clone()
    }

    fn supported_extensions(&self, requested: &BTreeSet<String>) -> BTreeSet<String> {
        match &self.extensions {
            Some(extensions) => requested.intersection(extensions).cloned().collect(),
            None => requested.clone(),
        }
    }
}
