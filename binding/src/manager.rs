// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Dispatch of resource lifecycle events to every registered driver.

use strum::Display;
use tracing::{debug, error};

use crate::context::{NetworkContext, PortContext, SubnetContext};
use crate::driver::MechanismDriver;
use crate::errors::{BindingError, DriverError};
use crate::registry::DriverRegistry;

/// The lifecycle event being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// A postcommit hook that failed. The change it reports on is already persisted.
#[derive(Debug)]
pub struct PostcommitFailure {
    pub driver: String,
    pub error: DriverError,
}

/// Calls the lifecycle hooks of the drivers of a [`DriverRegistry`], in registration order.
#[derive(Debug, Clone, Copy)]
pub struct MechanismManager<'r> {
    registry: &'r DriverRegistry,
}

impl<'r> MechanismManager<'r> {
    #[must_use]
    pub fn new(registry: &'r DriverRegistry) -> Self {
        Self { registry }
    }

    fn precommit<C>(
        &self,
        resource: &str,
        op: Operation,
        ctx: &C,
        hook: impl Fn(&dyn MechanismDriver, &C) -> Result<(), DriverError>,
    ) -> Result<(), BindingError> {
        for driver in self.registry.drivers() {
            debug!("Calling {op}_{resource}_precommit of '{}'", driver.name());
            hook(driver, ctx).map_err(|source| {
                error!("{op}_{resource}_precommit of '{}' failed: {source}", driver.name());
                BindingError::DriverFault {
                    driver: driver.name().to_string(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    fn postcommit<C>(
        &self,
        resource: &str,
        op: Operation,
        ctx: &C,
        hook: impl Fn(&dyn MechanismDriver, &C) -> Result<(), DriverError>,
    ) -> Vec<PostcommitFailure> {
        let mut failures = Vec::new();
        for driver in self.registry.drivers() {
            debug!("Calling {op}_{resource}_postcommit of '{}'", driver.name());
            if let Err(e) = hook(driver, ctx) {
                error!("{op}_{resource}_postcommit of '{}' failed: {e}", driver.name());
                failures.push(PostcommitFailure {
                    driver: driver.name().to_string(),
                    error: e,
                });
            }
        }
        failures
    }

    pub fn network_precommit(&self, op: Operation, ctx: &NetworkContext) -> Result<(), BindingError> {
        ctx.check(op)?;
        self.precommit("network", op, ctx, |d, c| match op {
            Operation::Create => d.create_network_precommit(c),
            Operation::Update => d.update_network_precommit(c),
            Operation::Delete => d.delete_network_precommit(c),
        })
    }

    pub fn network_postcommit(
        &self,
        op: Operation,
        ctx: &NetworkContext,
    ) -> Result<Vec<PostcommitFailure>, BindingError> {
        ctx.check(op)?;
        Ok(self.postcommit("network", op, ctx, |d, c| match op {
            Operation::Create => d.create_network_postcommit(c),
            Operation::Update => d.update_network_postcommit(c),
            Operation::Delete => d.delete_network_postcommit(c),
        }))
    }

    pub fn subnet_precommit(&self, op: Operation, ctx: &SubnetContext) -> Result<(), BindingError> {
        ctx.check(op)?;
        self.precommit("subnet", op, ctx, |d, c| match op {
            Operation::Create => d.create_subnet_precommit(c),
            Operation::Update => d.update_subnet_precommit(c),
            Operation::Delete => d.delete_subnet_precommit(c),
        })
    }

    pub fn subnet_postcommit(
        &self,
        op: Operation,
        ctx: &SubnetContext,
    ) -> Result<Vec<PostcommitFailure>, BindingError> {
        ctx.check(op)?;
        Ok(self.postcommit("subnet", op, ctx, |d, c| match op {
            Operation::Create => d.create_subnet_postcommit(c),
            Operation::Update => d.update_subnet_postcommit(c),
            Operation::Delete => d.delete_subnet_postcommit(c),
        }))
    }

    pub fn port_precommit(&self, op: Operation, ctx: &PortContext) -> Result<(), BindingError> {
        ctx.check(op)?;
        self.precommit("port", op, ctx, |d, c| match op {
            Operation::Create => d.create_port_precommit(c),
            Operation::Update => d.update_port_precommit(c),
            Operation::Delete => d.delete_port_precommit(c),
        })
    }

    pub fn port_postcommit(
        &self,
        op: Operation,
        ctx: &PortContext,
    ) -> Result<Vec<PostcommitFailure>, BindingError> {
        ctx.check(op)?;
        Ok(self.postcommit("port", op, ctx, |d, c| match op {
            Operation::Create => d.create_port_postcommit(c),
            Operation::Update => d.update_port_postcommit(c),
            Operation::Delete => d.delete_port_postcommit(c),
        }))
    }
}
