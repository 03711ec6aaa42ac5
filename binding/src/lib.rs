// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Port binding negotiation.
//!
//! Binding a port means finding, for the host the port lives on, a chain of network segments
//! and the mechanism drivers that can plug the port into them. The [`BindingOrchestrator`]
//! offers the segments of the port's network to an ordered [`DriverRegistry`] of
//! [`MechanismDriver`]s. Each driver may bind a segment, continue the binding onto a lower
//! segment, or decline. The resulting [`PortContext`] is either bound, with one binding level
//! per layer, or failed.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod collaborators;
pub mod config;
pub mod context;
pub mod driver;
pub mod drivers;
pub mod errors;
pub mod manager;
pub mod memory;
pub mod orchestrator;
pub mod registry;

pub use collaborators::{AgentRegistry, BindingRecord, BindingStore, SegmentRegistry};
pub use config::{BindingConfig, BindingConfigBuilder, OvsAgentConfig};
pub use context::{BindingState, NetworkContext, PortContext, SubnetContext};
pub use driver::MechanismDriver;
pub use errors::{BindingError, ConfigError, DriverError, SegmentError, StoreError, Violation};
pub use manager::{MechanismManager, Operation, PostcommitFailure};
pub use orchestrator::BindingOrchestrator;
pub use registry::DriverRegistry;

use tracectl::trace_target;
trace_target!("binding", LevelFilter::INFO, &["binding"]);
