// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory implementations of the collaborator interfaces.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use model::{Agent, Id, Network, NetworkType, Port, Segment, SegmentSpec};
use ordermap::OrderMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use tracing::{debug, info};

use crate::collaborators::{AgentRegistry, BindingRecord, BindingStore, SegmentRegistry};
use crate::errors::{SegmentError, StoreError};

type PoolKey = (NetworkType, Option<String>);

#[derive(Debug, Default)]
struct Allocations {
    dynamic: OrderMap<Id<Network>, Vec<Segment>>,
    used: BTreeSet<(NetworkType, Option<String>, u32)>,
    holds: BTreeMap<Id<Segment>, usize>,
}

impl Allocations {
    fn hold(&mut self, segment: &Segment) {
        *self.holds.entry(segment.id()).or_default() += 1;
    }
}

/// Segment registry allocating segmentation ids from configured ranges.
///
/// Vlan ranges are per physical network, tunnel ranges per network type.
#[derive(Debug, Default)]
pub struct MemorySegmentRegistry {
    ranges: OrderMap<PoolKey, RangeInclusive<u32>>,
    state: Mutex<Allocations>,
}

impl MemorySegmentRegistry {
    #[must_use]
    pub fn with_vlan_range(mut self, physical_network: &str, range: RangeInclusive<u32>) -> Self {
        self.ranges
            .insert((NetworkType::Vlan, Some(physical_network.to_string())), range);
        self
    }

    #[must_use]
    pub fn with_tunnel_range(mut self, network_type: NetworkType, range: RangeInclusive<u32>) -> Self {
        self.ranges.insert((network_type, None), range);
        self
    }

    fn pool_key(network_type: NetworkType, physical_network: Option<&str>) -> PoolKey {
        if network_type == NetworkType::Vlan {
            (network_type, physical_network.map(str::to_string))
        } else {
            (network_type, None)
        }
    }

    /// Mark the segmentation ids of the static segments of `network` as taken.
    pub fn reserve_static(&self, network: &Network) {
        let mut state = self.state.lock();
        for segment in &network.segments {
            if let Some(id) = segment.segmentation_id() {
                let (network_type, physnet) =
                    Self::pool_key(segment.network_type(), segment.physical_network());
                state.used.insert((network_type, physnet, id));
            }
        }
    }
}

impl SegmentRegistry for MemorySegmentRegistry {
    fn dynamic_segments(&self, network: Id<Network>) -> Result<Vec<Segment>, SegmentError> {
        Ok(self
            .state
            .lock()
            .dynamic
            .get(&network)
            .cloned()
            .unwrap_or_default())
    }

    fn allocate_dynamic_segment(
        &self,
        network: Id<Network>,
        spec: &SegmentSpec,
    ) -> Result<Segment, SegmentError> {
        let mut state = self.state.lock();
        if let Some(existing) = state
            .dynamic
            .get(&network)
            .and_then(|segments| segments.iter().find(|s| spec.matches(s)))
        {
            debug!("Reusing dynamic segment {existing} of network {network}");
            let existing = existing.clone();
            state.hold(&existing);
            return Ok(existing);
        }

        let (network_type, physnet) =
            Self::pool_key(spec.network_type, spec.physical_network.as_deref());
        let segmentation_id = match spec.segmentation_id {
            Some(id) if state.used.contains(&(network_type, physnet.clone(), id)) => {
                return Err(SegmentError::InUse(network_type, id));
            }
            Some(id) => Some(id),
            None if network_type.segmentation_range().is_none() => None,
            None => {
                let key = (network_type, physnet.clone());
                let range = self
                    .ranges
                    .get(&key)
                    .ok_or_else(|| SegmentError::NoRange(network_type, physnet.clone()))?;
                let free = range
                    .clone()
                    .find(|id| !state.used.contains(&(network_type, physnet.clone(), *id)))
                    .ok_or_else(|| SegmentError::Exhausted(network_type, physnet.clone()))?;
                Some(free)
            }
        };

        let resolved = SegmentSpec {
            segmentation_id,
            ..spec.clone()
        };
        let segment = Segment::from_spec(Id::new(), resolved, true)?;
        if let Some(id) = segmentation_id {
            state.used.insert((network_type, physnet, id));
        }
        state.dynamic.entry(network).or_default().push(segment.clone());
        state.hold(&segment);
        info!("Allocated dynamic segment {segment} on network {network}");
        Ok(segment)
    }

    fn unhold_dynamic_segment(&self, network: Id<Network>, segment: Id<Segment>) {
        let mut state = self.state.lock();
        if let Some(count) = state.holds.get_mut(&segment) {
            *count -= 1;
            if *count == 0 {
                state.holds.remove(&segment);
            }
        } else {
            debug!("Dynamic segment {segment} of network {network} is not held");
        }
    }

    fn release_dynamic_segment(
        &self,
        network: Id<Network>,
        segment: Id<Segment>,
        in_use: &dyn Fn(Id<Segment>) -> bool,
    ) -> Result<bool, SegmentError> {
        let mut state = self.state.lock();
        if let Some(holders) = state.holds.get(&segment) {
            debug!("Keeping dynamic segment {segment} of network {network}: {holders} holders");
            return Ok(false);
        }
        let Some(segments) = state.dynamic.get_mut(&network) else {
            return Ok(false);
        };
        let Some(position) = segments.iter().position(|s| s.id() == segment) else {
            return Ok(false);
        };
        if in_use(segment) {
            return Ok(false);
        }
        let released = segments.remove(position);
        if let Some(id) = released.segmentation_id() {
            let (network_type, physnet) =
                Self::pool_key(released.network_type(), released.physical_network());
            state.used.remove(&(network_type, physnet, id));
        }
        info!("Released dynamic segment {released} of network {network}");
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct MemoryAgentRegistry {
    agents: RwLock<Vec<Agent>>,
}

impl MemoryAgentRegistry {
    #[must_use]
    pub fn new(agents: impl IntoIterator<Item = Agent>) -> Self {
        Self {
            agents: RwLock::new(agents.into_iter().collect()),
        }
    }

    /// Add `agent`, replacing any agent with the same id.
    pub fn add(&self, agent: Agent) {
        let mut agents = self.agents.write();
        agents.retain(|a| a.id != agent.id);
        agents.push(agent);
    }

    /// Mark the agents of `agent_type` on `host` alive or dead. Returns how many changed.
    pub fn set_alive(&self, host: &str, agent_type: &str, alive: bool) -> usize {
        let mut changed = 0;
        for agent in self
            .agents
            .write()
            .iter_mut()
            .filter(|a| a.host == host && a.agent_type == agent_type && a.alive != alive)
        {
            agent.alive = alive;
            changed += 1;
        }
        changed
    }
}

impl AgentRegistry for MemoryAgentRegistry {
    fn agents(&self, host: &str, agent_type: Option<&str>) -> Vec<Agent> {
        self.agents
            .read()
            .iter()
            .filter(|a| a.host == host && agent_type.is_none_or(|t| a.agent_type == t))
            .cloned()
            .collect()
    }

    fn hosts(&self) -> BTreeSet<String> {
        self.agents.read().iter().map(|a| a.host.clone()).collect()
    }
}

/// Binding store keeping records in a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryBindingStore {
    records: DashMap<Id<Port>, BindingRecord>,
}

impl MemoryBindingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl BindingStore for MemoryBindingStore {
    fn load(&self, port: Id<Port>) -> Result<Option<BindingRecord>, StoreError> {
        Ok(self.records.get(&port).map(|r| r.value().clone()))
    }

    fn commit(&self, record: BindingRecord, expected_revision: u64) -> Result<u64, StoreError> {
        let port = record.port_id;
        let found = match self.records.entry(port) {
            Entry::Occupied(mut entry) if entry.get().revision == expected_revision => {
                let revision = expected_revision + 1;
                entry.insert(BindingRecord { revision, ..record });
                return Ok(revision);
            }
            Entry::Vacant(entry) if expected_revision == 0 => {
                entry.insert(BindingRecord {
                    revision: 1,
                    ..record
                });
                return Ok(1);
            }
            Entry::Occupied(entry) => entry.get().revision,
            Entry::Vacant(_) => 0,
        };
        Err(StoreError::Conflict {
            port,
            expected: expected_revision,
            found,
        })
    }

    fn remove(
        &self,
        port: Id<Port>,
        expected_revision: u64,
    ) -> Result<Option<BindingRecord>, StoreError> {
        match self.records.entry(port) {
            Entry::Occupied(entry) if entry.get().revision == expected_revision => {
                Ok(Some(entry.remove()))
            }
            Entry::Occupied(entry) => Err(StoreError::Conflict {
                port,
                expected: expected_revision,
                found: entry.get().revision,
            }),
            Entry::Vacant(_) if expected_revision == 0 => Ok(None),
            Entry::Vacant(_) => Err(StoreError::Conflict {
                port,
                expected: expected_revision,
                found: 0,
            }),
        }
    }

    fn references(&self, segment: Id<Segment>) -> Result<usize, StoreError> {
        Ok(self.records.iter().filter(|r| r.uses(segment)).count())
    }
}
