// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Records exchanged between the port binding engine and its collaborators: networks and their
//! segments, ports, agents, and the binding levels produced by a negotiation.

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

pub mod agent;
pub mod binding;
pub mod id;
pub mod resource;
pub mod segment;
pub mod vif;

pub use agent::{Agent, AgentConfig, DatapathType};
pub use binding::{BindingLevel, InvalidBindingLevels, validate_levels};
pub use id::Id;
pub use resource::{Network, Port, PortStatus, Subnet, VnicType};
pub use segment::{
    InvalidSegment, InvalidSegmentSpec, NetworkType, Segment, SegmentSpec, SegmentSpecBuilder,
};
pub use vif::{VifDetails, VifType, VifValue};
