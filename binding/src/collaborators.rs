// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interfaces to the systems the binding engine consumes: the segment registry, the agent
//! registry and the binding store.

use model::{
    Agent, BindingLevel, Id, Network, Port, PortStatus, Segment, SegmentSpec, VifDetails, VifType,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

use crate::errors::{SegmentError, StoreError};

/// Source of dynamic segments.
///
/// Static segments are carried by the [`Network`] itself.
pub trait SegmentRegistry: Send + Sync {
    /// The dynamic segments currently allocated on `network`.
    fn dynamic_segments(&self, network: Id<Network>) -> Result<Vec<Segment>, SegmentError>;

    /// Return a dynamic segment of `network` matching `spec`, allocating one if none exists.
    ///
    /// Every successful call takes a hold on the returned segment for the caller. A held segment
    /// is never released; the hold is dropped with [`SegmentRegistry::unhold_dynamic_segment`].
    fn allocate_dynamic_segment(
        &self,
        network: Id<Network>,
        spec: &SegmentSpec,
    ) -> Result<Segment, SegmentError>;

    /// Drop one hold taken by [`SegmentRegistry::allocate_dynamic_segment`].
    fn unhold_dynamic_segment(&self, network: Id<Network>, segment: Id<Segment>);

    /// Give back a dynamic segment unless it is held or `in_use` reports a stored binding on it.
    /// Both checks and the release are atomic with respect to allocations. Returns whether the
    /// segment was released. Releasing a segment that is not allocated is not an error.
    fn release_dynamic_segment(
        &self,
        network: Id<Network>,
        segment: Id<Segment>,
        in_use: &dyn Fn(Id<Segment>) -> bool,
    ) -> Result<bool, SegmentError>;
}

/// Source of agent liveness and configuration.
pub trait AgentRegistry: Send + Sync {
    /// Agents on `host`, optionally restricted to one agent type.
    fn agents(&self, host: &str, agent_type: Option<&str>) -> Vec<Agent>;

    /// Every host with at least one agent.
    fn hosts(&self) -> BTreeSet<String>;
}

/// What gets persisted for a bound (or failed) port.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BindingRecord {
    pub port_id: Id<Port>,
    pub network_id: Id<Network>,
    pub host: String,
    pub vif_type: VifType,
    pub vif_details: VifDetails,
    pub status: PortStatus,
    pub levels: Vec<BindingLevel>,
    /// Revision of the stored record. Zero for a record that was never committed.
    #[serde(default)]
    pub revision: u64,
}

impl BindingRecord {
    /// True if any level of this binding uses `segment`.
    #[must_use]
    pub fn uses(&self, segment: Id<Segment>) -> bool {
        self.levels.iter().any(|l| l.segment.id() == segment)
    }
}

/// Persistence for binding records, with optimistic concurrency control.
pub trait BindingStore: Send + Sync {
    fn load(&self, port: Id<Port>) -> Result<Option<BindingRecord>, StoreError>;

    /// Persist `record` if the stored revision still equals `expected_revision` (zero when no
    /// record is stored). Returns the new revision.
    fn commit(&self, record: BindingRecord, expected_revision: u64) -> Result<u64, StoreError>;

    /// Delete the record of `port` if its revision equals `expected_revision`.
    fn remove(
        &self,
        port: Id<Port>,
        expected_revision: u64,
    ) -> Result<Option<BindingRecord>, StoreError>;

    /// Number of stored bindings with a level on `segment`.
    fn references(&self, segment: Id<Segment>) -> Result<usize, StoreError>;
}

/// True if a binding stored in `store` has a level on `segment`. A store error counts as a use.
pub(crate) fn stored_binding_uses(store: &dyn BindingStore, segment: Id<Segment>) -> bool {
    store.references(segment).map_or_else(
        |e| {
            warn!("Keeping dynamic segment {segment}: {e}");
            true
        },
        |count| count > 0,
    )
}
