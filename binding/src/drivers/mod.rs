// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mechanism drivers shipped with the engine.

pub mod agent;
pub mod hierarchical;
pub mod software;

pub use agent::{AGENT_TYPE_OVS, AgentBackend, AgentMechanismDriver, OvsBackend};
pub use hierarchical::HierarchicalDriver;
pub use software::StaticVifDriver;
