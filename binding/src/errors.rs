// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of the binding engine.
//!
//! Declining to bind a port is not an error, and neither is a negotiation that ends in
//! `binding_failed`: both are reported through the terminal state of the
//! [`PortContext`](crate::context::PortContext). The types here cover driver faults, broken
//! invariants and collaborator failures.

use model::{Id, InvalidBindingLevels, InvalidSegment, Network, NetworkType, Port, Segment};
use thiserror::Error;

/// Contract violations detected while negotiating a binding or dispatching lifecycle hooks.
///
/// These are programming errors in a driver or a caller and are never silently accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("binding mutated outside of bind_port")]
    NotBinding,
    #[error("driver '{driver}' acted twice on level {level}")]
    AlreadyActed { driver: String, level: u8 },
    #[error("segment {0} is not a candidate at this level")]
    UnknownSegment(Id<Segment>),
    #[error("set_binding without a segment must report binding_failed")]
    MissingSegment,
    #[error("set_binding cannot report '{0}' for a bound segment")]
    NotABoundVifType(String),
    #[error("continue_binding requires at least one next segment")]
    EmptyContinuation,
    #[error("segment {lower} cannot be bound below {upper}")]
    IllegalNextHop { upper: String, lower: String },
    #[error("segment {0} offered twice in one binding attempt")]
    SegmentRevisited(Id<Segment>),
    #[error("binding exceeds {0} levels")]
    TooManyLevels(u8),
    #[error("update context without an original")]
    MissingOriginal,
    #[error("create/delete context with an original")]
    UnexpectedOriginal,
    #[error("original {original} does not match current {current}")]
    IdMismatch { current: String, original: String },
    #[error(transparent)]
    Levels(#[from] InvalidBindingLevels),
}

/// Errors raised by a mechanism driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0}")]
    Fault(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Binding(Box<BindingError>),
}

impl From<BindingError> for DriverError {
    fn from(value: BindingError) -> Self {
        DriverError::Binding(Box::new(value))
    }
}

/// Errors of the segment registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("no {0} segmentation range configured for physical network {1:?}")]
    NoRange(NetworkType, Option<String>),
    #[error("all {0} segmentation ids of physical network {1:?} are in use")]
    Exhausted(NetworkType, Option<String>),
    #[error("{0} segmentation id {1} is already in use")]
    InUse(NetworkType, u32),
    #[error(transparent)]
    Invalid(#[from] InvalidSegment),
}

/// Errors of the binding store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("binding of port {port} changed concurrently (expected revision {expected}, found {found})")]
    Conflict {
        port: Id<Port>,
        expected: u64,
        found: u64,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors of the configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid mapping '{0}': expected key:value")]
    BadMapping(String),
    #[error("key '{0}' appears in more than one mapping")]
    DuplicateKey(String),
    #[error("value '{0}' appears in more than one mapping")]
    DuplicateValue(String),
    #[error("'{0}' is not a tunnel type")]
    NotATunnelType(String),
    #[error("'{0}' segments cannot be continued")]
    NotAnUpperType(String),
    #[error("tunnel types are configured but local_ip is not set")]
    MissingLocalIp,
    #[error("unknown mechanism driver '{0}'")]
    UnknownDriver(String),
    #[error("mechanism driver '{0}' registered twice")]
    DuplicateDriver(String),
    #[error("max_binding_levels must be at least 1")]
    NoBindingLevels,
    #[error("missing configuration field: {0}")]
    MissingField(&'static str),
}

impl From<derive_builder::UninitializedFieldError> for ConfigError {
    fn from(value: derive_builder::UninitializedFieldError) -> Self {
        ConfigError::MissingField(value.field_name())
    }
}

/// The reasons a binding attempt can be aborted.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("mechanism driver '{driver}' failed: {source}")]
    DriverFault {
        driver: String,
        #[source]
        source: DriverError,
    },
    #[error("invariant violation: {0}")]
    InvariantViolation(#[from] Violation),
    #[error("port {port} does not belong to network {network}")]
    NetworkMismatch { port: Id<Port>, network: Id<Network> },
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BindingError {
    /// Faults that need investigation, as opposed to conditions a caller may retry or correct.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BindingError::DriverFault { .. } | BindingError::InvariantViolation(_)
        )
    }

    /// True if a fresh attempt may succeed without any change to the environment.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BindingError::Store(StoreError::Conflict { .. } | StoreError::Unavailable(_))
                | BindingError::DriverFault {
                    source: DriverError::Unavailable(_),
                    ..
                }
        )
    }
}
