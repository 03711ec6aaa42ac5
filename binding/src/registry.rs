// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ordered registry of mechanism drivers.

use model::Port;
use ordermap::OrderMap;
use std::fmt::{Debug, Formatter};
use tracing::{debug, info};

use crate::config::BindingConfig;
use crate::driver::MechanismDriver;
use crate::errors::{BindingError, ConfigError};

/// Mechanism drivers in registration order.
///
/// Registration order is the only priority between drivers: when several are willing to bind
/// a level, the one registered first wins.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: OrderMap<String, Box<dyn MechanismDriver>>,
}

impl Debug for DriverRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.drivers.keys()).finish()
    }
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize `driver` and append it to the chain.
    pub fn register(
        &mut self,
        mut driver: Box<dyn MechanismDriver>,
    ) -> Result<&mut Self, BindingError> {
        let name = driver.name().to_string();
        if self.drivers.contains_key(&name) {
            return Err(ConfigError::DuplicateDriver(name).into());
        }
        driver
            .initialize()
            .map_err(|source| BindingError::DriverFault {
                driver: name.clone(),
                source,
            })?;
        info!("Registered mechanism driver '{name}' at position {}", self.drivers.len());
        self.drivers.insert(name, driver);
        Ok(self)
    }

    /// Builder-style [`DriverRegistry::register`].
    pub fn with(mut self, driver: impl MechanismDriver + 'static) -> Result<Self, BindingError> {
        self.register(Box::new(driver))?;
        Ok(self)
    }

    /// Register the drivers named in `config`, in the configured order, picking them from
    /// `available`.
    pub fn from_config(
        config: &BindingConfig,
        available: impl IntoIterator<Item = Box<dyn MechanismDriver>>,
    ) -> Result<Self, BindingError> {
        let mut available: OrderMap<String, Box<dyn MechanismDriver>> = available
            .into_iter()
            .map(|d| (d.name().to_string(), d))
            .collect();
        let mut registry = Self::new();
        for name in &config.mechanism_drivers {
            let Some(driver) = available.remove(name) else {
                return Err(ConfigError::UnknownDriver(name.clone()).into());
            };
            registry.register(driver)?;
        }
        for name in available.keys() {
            debug!("Mechanism driver '{name}' is available but not configured");
        }
        Ok(registry)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn MechanismDriver> {
        self.drivers.get(name).map(|d| &**d)
    }

    pub fn drivers(&self) -> impl Iterator<Item = &dyn MechanismDriver> {
        self.drivers.values().map(|d| &**d)
    }

    /// Drivers offered `port`: they plug its VNIC type and support every API extension it uses.
    #[must_use]
    pub fn offered(&self, port: &Port) -> Vec<&dyn MechanismDriver> {
        self.drivers()
            .filter(|d| d.supported_vnic_types().contains(&port.vnic_type))
            .filter(|d| {
                let supported = d.supported_extensions(&port.extensions);
                let missing = port.extensions.difference(&supported).next();
                if let Some(extension) = missing {
                    debug!(
                        "Mechanism driver '{}' does not support extension {extension} of port {}",
                        d.name(),
                        port.id
                    );
                }
                missing.is_none()
            })
            .collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

}
