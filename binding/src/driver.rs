// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The mechanism driver contract.

use model::{Segment, VnicType};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::collaborators::AgentRegistry;
use crate::context::{NetworkContext, PortContext, SubnetContext};
use crate::errors::DriverError;

/// A backend that can plug ports into some kind of network segment.
///
/// Every hook but [`MechanismDriver::name`] and [`MechanismDriver::bind_port`] does nothing by
/// default. Precommit hooks run before the binding is persisted and may abort it by returning an
/// error; postcommit hooks run after and their errors are only reported.
#[allow(unused_variables)]
pub trait MechanismDriver: Send + Sync {
    /// Unique name of the driver, used for registration and in binding levels.
    fn name(&self) -> &str;

    /// Called once when the driver is registered.
    fn initialize(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn create_network_precommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn create_network_postcommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn update_network_precommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn update_network_postcommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn delete_network_precommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn delete_network_postcommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Ok(())
    }

    fn create_subnet_precommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn create_subnet_postcommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn update_subnet_precommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn update_subnet_postcommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn delete_subnet_precommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn delete_subnet_postcommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Ok(())
    }

    fn create_port_precommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn create_port_postcommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn update_port_precommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn update_port_postcommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn delete_port_precommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        Ok(())
    }
    fn delete_port_postcommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        Ok(())
    }

    /// Try to bind the level offered in `ctx`.
    ///
    /// A driver that can handle one of [`PortContext::segments_to_bind`] calls
    /// [`PortContext::set_binding`] or [`PortContext::continue_binding`] exactly once. Returning
    /// `Ok(())` without calling either declines the level. Returning an error aborts the whole
    /// attempt.
    fn bind_port(&self, ctx: &mut PortContext) -> Result<(), DriverError>;

    /// The subset of `candidate_hosts` this driver knows cannot reach any of `segments`.
    ///
    /// A driver without an opinion on a host leaves it out.
    fn filter_hosts_with_segment_access(
        &self,
        ctx: &PortContext,
        segments: &[Segment],
        candidate_hosts: &BTreeSet<String>,
        agents: &dyn AgentRegistry,
    ) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn supported_vnic_types(&self) -> Vec<VnicType> {
        vec![VnicType::Normal]
    }

    /// The subset of `requested` API extensions this driver supports.
    fn supported_extensions(&self, requested: &BTreeSet<String>) -> BTreeSet<String> {
        requested.clone()
    }

    /// Namespace for deriving ids of the resource providers this driver reports.
    fn resource_provider_uuid5_namespace(&self) -> Option<Uuid> {
        None
    }
}
