// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Contexts handed to mechanism drivers.
//!
//! A [`PortContext`] carries one binding attempt: the port, its network, the target host, the
//! candidate segments for the level being bound and the levels bound so far. Drivers receive it
//! by `&mut` in [`MechanismDriver::bind_port`](crate::driver::MechanismDriver::bind_port) and
//! record their decision with [`PortContext::set_binding`] or
//! [`PortContext::continue_binding`]. The decision is applied by the orchestrator once the
//! driver returns.

use model::{
    Agent, BindingLevel, Id, Network, Port, PortStatus, Segment, SegmentSpec, Subnet, VifDetails,
    VifType, validate_levels,
};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use strum::{Display, EnumIs};

use crate::collaborators::{
    AgentRegistry, BindingRecord, BindingStore, SegmentRegistry, stored_binding_uses,
};
use crate::errors::{BindingError, Violation};
use crate::manager::Operation;

fn check_original(
    op: Operation,
    current: String,
    original: Option<String>,
) -> Result<(), Violation> {
    match (op, original) {
        (Operation::Update, None) => Err(Violation::MissingOriginal),
        (Operation::Update, Some(original)) if original != current => {
            Err(Violation::IdMismatch { current, original })
        }
        (Operation::Create | Operation::Delete, Some(_)) => Err(Violation::UnexpectedOriginal),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct NetworkContext {
    current: Network,
    original: Option<Network>,
}

impl NetworkContext {
    #[must_use]
    pub fn new(current: Network) -> Self {
        Self {
            current,
            original: None,
        }
    }

    #[must_use]
    pub fn with_original(mut self, original: Network) -> Self {
        self.original = Some(original);
        self
    }

    #[must_use]
    pub fn current(&self) -> &Network {
        &self.current
    }

    #[must_use]
    pub fn original(&self) -> Option<&Network> {
        self.original.as_ref()
    }

    /// The static segments of the network.
    #[must_use]
    pub fn network_segments(&self) -> &[Segment] {
        &self.current.segments
    }

    pub(crate) fn check(&self, op: Operation) -> Result<(), Violation> {
        check_original(
            op,
            self.current.id.to_string(),
            self.original.as_ref().map(|n| n.id.to_string()),
        )
    }
}

#[derive(Debug, Clone)]
pub struct SubnetContext {
    current: Subnet,
    original: Option<Subnet>,
    network: NetworkContext,
}

impl SubnetContext {
    #[must_use]
    pub fn new(current: Subnet, network: NetworkContext) -> Self {
        Self {
            current,
            original: None,
            network,
        }
    }

    #[must_use]
    pub fn with_original(mut self, original: Subnet) -> Self {
        self.original = Some(original);
        self
    }

    #[must_use]
    pub fn current(&self) -> &Subnet {
        &self.current
    }

    #[must_use]
    pub fn original(&self) -> Option<&Subnet> {
        self.original.as_ref()
    }

    #[must_use]
    pub fn network(&self) -> &NetworkContext {
        &self.network
    }

    pub(crate) fn check(&self, op: Operation) -> Result<(), Violation> {
        if self.current.network_id != self.network.current.id {
            return Err(Violation::IdMismatch {
                current: self.network.current.id.to_string(),
                original: self.current.network_id.to_string(),
            });
        }
        check_original(
            op,
            self.current.id.to_string(),
            self.original.as_ref().map(|s| s.id.to_string()),
        )
    }
}

/// Where a port binding stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIs)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BindingState {
    Unbound,
    /// Upper levels recorded through continuations, no terminal level yet.
    PartiallyBound,
    Bound,
    BindingFailed,
}

/// A decision recorded by the driver being consulted.
#[derive(Debug, Clone)]
pub(crate) enum Action {
    Bind {
        segment: Option<Segment>,
        vif_type: VifType,
        vif_details: VifDetails,
        status: Option<PortStatus>,
    },
    Continue {
        segment: Segment,
        next: Vec<Segment>,
    },
}

/// State that only exists while a driver is inside `bind_port`.
struct Negotiation {
    driver: String,
    level: u8,
    segments: Arc<dyn SegmentRegistry>,
    agents: Arc<dyn AgentRegistry>,
    store: Arc<dyn BindingStore>,
    action: Option<Action>,
    violation: Option<Violation>,
}

impl Debug for Negotiation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiation")
            .field("driver", &self.driver)
            .field("level", &self.level)
            .field("action", &self.action)
            .field("violation", &self.violation)
            .finish_non_exhaustive()
    }
}

/// Outcome of one `bind_port` call.
pub(crate) struct Offer {
    pub(crate) action: Option<Action>,
    pub(crate) violation: Option<Violation>,
}

#[derive(Debug)]
pub struct PortContext {
    current: Port,
    original: Option<Port>,
    network: NetworkContext,
    host: String,
    original_host: Option<String>,
    vif_type: VifType,
    original_vif_type: Option<VifType>,
    vif_details: VifDetails,
    original_vif_details: Option<VifDetails>,
    status: PortStatus,
    original_status: Option<PortStatus>,
    segments_to_bind: Vec<Segment>,
    binding_levels: Vec<BindingLevel>,
    original_binding_levels: Vec<BindingLevel>,
    allocated: Vec<Segment>,
    negotiation: Option<Negotiation>,
}

impl PortContext {
    /// A fresh, unbound context for binding `port` on `host`.
    #[must_use]
    pub fn new(port: Port, network: NetworkContext, host: impl Into<String>) -> Self {
        Self {
            status: port.status,
            current: port,
            original: None,
            network,
            host: host.into(),
            original_host: None,
            vif_type: VifType::Unbound,
            original_vif_type: None,
            vif_details: VifDetails::new(),
            original_vif_details: None,
            original_status: None,
            segments_to_bind: Vec::new(),
            binding_levels: Vec::new(),
            original_binding_levels: Vec::new(),
            allocated: Vec::new(),
            negotiation: None,
        }
    }

    /// Record `previous` as the binding this context replaces.
    #[must_use]
    pub fn with_original(mut self, previous: &BindingRecord) -> Self {
        let mut original = self.current.clone();
        original.status = previous.status;
        self.original = Some(original);
        self.original_host = Some(previous.host.clone());
        self.original_vif_type = Some(previous.vif_type.clone());
        self.original_vif_details = Some(previous.vif_details.clone());
        self.original_status = Some(previous.status);
        self.original_binding_levels.clone_from(&previous.levels);
        self
    }

    /// A context whose current binding is `record`, as seen when deleting a port.
    #[must_use]
    pub fn from_record(port: Port, network: NetworkContext, record: &BindingRecord) -> Self {
        let mut ctx = Self::new(port, network, record.host.clone());
        ctx.vif_type = record.vif_type.clone();
        ctx.vif_details = record.vif_details.clone();
        ctx.status = record.status;
        ctx.binding_levels.clone_from(&record.levels);
        ctx
    }

    #[must_use]
    pub fn current(&self) -> &Port {
        &self.current
    }

    #[must_use]
    pub fn original(&self) -> Option<&Port> {
        self.original.as_ref()
    }

    #[must_use]
    pub fn network(&self) -> &NetworkContext {
        &self.network
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn original_host(&self) -> Option<&str> {
        self.original_host.as_deref()
    }

    #[must_use]
    pub fn vif_type(&self) -> &VifType {
        &self.vif_type
    }

    #[must_use]
    pub fn original_vif_type(&self) -> Option<&VifType> {
        self.original_vif_type.as_ref()
    }

    #[must_use]
    pub fn vif_details(&self) -> &VifDetails {
        &self.vif_details
    }

    #[must_use]
    pub fn original_vif_details(&self) -> Option<&VifDetails> {
        self.original_vif_details.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> PortStatus {
        self.status
    }

    #[must_use]
    pub fn original_status(&self) -> Option<PortStatus> {
        self.original_status
    }

    /// Candidate segments for the level currently being bound.
    #[must_use]
    pub fn segments_to_bind(&self) -> &[Segment] {
        &self.segments_to_bind
    }

    #[must_use]
    pub fn binding_levels(&self) -> &[BindingLevel] {
        &self.binding_levels
    }

    #[must_use]
    pub fn original_binding_levels(&self) -> &[BindingLevel] {
        &self.original_binding_levels
    }

    #[must_use]
    pub fn top_bound_segment(&self) -> Option<&Segment> {
        self.binding_levels.first().map(|l| &l.segment)
    }

    #[must_use]
    pub fn bottom_bound_segment(&self) -> Option<&Segment> {
        self.binding_levels.last().map(|l| &l.segment)
    }

    #[must_use]
    pub fn original_top_bound_segment(&self) -> Option<&Segment> {
        self.original_binding_levels.first().map(|l| &l.segment)
    }

    #[must_use]
    pub fn original_bottom_bound_segment(&self) -> Option<&Segment> {
        self.original_binding_levels.last().map(|l| &l.segment)
    }

    #[must_use]
    pub fn state(&self) -> BindingState {
        match &self.vif_type {
            VifType::BindingFailed => BindingState::BindingFailed,
            vif_type if vif_type.is_bound() => BindingState::Bound,
            _ if !self.binding_levels.is_empty() => BindingState::PartiallyBound,
            _ => BindingState::Unbound,
        }
    }

    /// The level offered to the driver currently inside `bind_port`.
    #[must_use]
    pub fn level(&self) -> Option<u8> {
        self.negotiation.as_ref().map(|n| n.level)
    }

    /// Agents on the target host, optionally of one type. Empty outside `bind_port`.
    #[must_use]
    pub fn host_agents(&self, agent_type: Option<&str>) -> Vec<Agent> {
        self.negotiation
            .as_ref()
            .map(|n| n.agents.agents(&self.host, agent_type))
            .unwrap_or_default()
    }

    /// Dynamic segments obtained through [`PortContext::allocate_dynamic_segment`] in this
    /// attempt. The attempt holds each of them in the segment registry until it ends.
    #[must_use]
    pub fn allocated_segments(&self) -> &[Segment] {
        &self.allocated
    }

    fn candidate(&self, segment_id: Id<Segment>) -> Result<&Segment, Violation> {
        self.segments_to_bind
            .iter()
            .find(|s| s.id() == segment_id)
            .ok_or(Violation::UnknownSegment(segment_id))
    }

    fn record(&mut self, action: Result<Action, Violation>) -> Result<(), BindingError> {
        let Some(negotiation) = self.negotiation.as_mut() else {
            return Err(Violation::NotBinding.into());
        };
        let violation = match action {
            Ok(_) if negotiation.action.is_some() => Violation::AlreadyActed {
                driver: negotiation.driver.clone(),
                level: negotiation.level,
            },
            Ok(action) => {
                negotiation.action = Some(action);
                return Ok(());
            }
            Err(violation) => violation,
        };
        negotiation.violation.get_or_insert_with(|| violation.clone());
        Err(violation.into())
    }

    /// Bind the current level to `segment_id`, completing the binding.
    ///
    /// Passing no segment with [`VifType::BindingFailed`] ends the negotiation for this host
    /// without consulting further drivers. `status` of `None` leaves the port status unchanged.
    pub fn set_binding(
        &mut self,
        segment_id: Option<Id<Segment>>,
        vif_type: VifType,
        vif_details: VifDetails,
        status: Option<PortStatus>,
    ) -> Result<(), BindingError> {
        let action = match segment_id {
            None if vif_type == VifType::BindingFailed => Ok(None),
            None => Err(Violation::MissingSegment),
            Some(_) if !vif_type.is_bound() => {
                Err(Violation::NotABoundVifType(vif_type.to_string()))
            }
            Some(id) => self.candidate(id).map(|s| Some(s.clone())),
        }
        .map(|segment| Action::Bind {
            segment,
            vif_type,
            vif_details,
            status,
        });
        self.record(action)
    }

    /// Claim `segment_id` for the current level and offer `next_segments` to the driver chain
    /// for the level below.
    pub fn continue_binding(
        &mut self,
        segment_id: Id<Segment>,
        next_segments: Vec<Segment>,
    ) -> Result<(), BindingError> {
        let action = self.candidate(segment_id).and_then(|segment| {
            if next_segments.is_empty() {
                return Err(Violation::EmptyContinuation);
            }
            if let Some(next) = next_segments.iter().find(|n| !segment.may_precede(n)) {
                return Err(Violation::IllegalNextHop {
                    upper: segment.to_string(),
                    lower: next.to_string(),
                });
            }
            Ok(Action::Continue {
                segment: segment.clone(),
                next: next_segments,
            })
        });
        self.record(action)
    }

    /// Find or allocate a dynamic segment of the port's network matching `spec`.
    pub fn allocate_dynamic_segment(&mut self, spec: &SegmentSpec) -> Result<Segment, BindingError> {
        let Some(negotiation) = self.negotiation.as_ref() else {
            return Err(Violation::NotBinding.into());
        };
        let network = self.network.current.id;
        let segment = negotiation.segments.allocate_dynamic_segment(network, spec)?;
        if self.allocated.iter().any(|s| s.id() == segment.id()) {
            // one hold per attempt
            negotiation.segments.unhold_dynamic_segment(network, segment.id());
        } else {
            self.allocated.push(segment.clone());
        }
        Ok(segment)
    }

    /// Release a dynamic segment obtained in this attempt that the driver no longer needs.
    ///
    /// The segment stays allocated while a stored binding or another attempt still uses it.
    pub fn release_dynamic_segment(&mut self, segment_id: Id<Segment>) -> Result<(), BindingError> {
        let Some(negotiation) = self.negotiation.as_ref() else {
            return Err(Violation::NotBinding.into());
        };
        let network = self.network.current.id;
        if let Some(position) = self.allocated.iter().position(|s| s.id() == segment_id) {
            self.allocated.remove(position);
            negotiation.segments.unhold_dynamic_segment(network, segment_id);
        }
        let store = &*negotiation.store;
        negotiation
            .segments
            .release_dynamic_segment(network, segment_id, &|s: Id<Segment>| {
                stored_binding_uses(store, s)
            })?;
        Ok(())
    }

    pub(crate) fn begin(
        &mut self,
        driver: &str,
        level: u8,
        segments: Arc<dyn SegmentRegistry>,
        agents: Arc<dyn AgentRegistry>,
        store: Arc<dyn BindingStore>,
    ) {
        self.negotiation = Some(Negotiation {
            driver: driver.to_string(),
            level,
            segments,
            agents,
            store,
            action: None,
            violation: None,
        });
    }

    pub(crate) fn end(&mut self) -> Offer {
        match self.negotiation.take() {
            Some(n) => Offer {
                action: n.action,
                violation: n.violation,
            },
            None => Offer {
                action: None,
                violation: None,
            },
        }
    }

    /// Drop any previous result and offer `candidates` at level 0.
    pub(crate) fn restart(&mut self, candidates: Vec<Segment>) {
        self.vif_type = VifType::Unbound;
        self.vif_details.clear();
        self.binding_levels.clear();
        self.segments_to_bind = candidates;
    }

    pub(crate) fn push_level(&mut self, level: BindingLevel) -> Result<(), Violation> {
        if let Some(upper) = self.binding_levels.last()
            && !upper.segment.may_precede(&level.segment)
        {
            return Err(Violation::IllegalNextHop {
                upper: upper.segment.to_string(),
                lower: level.segment.to_string(),
            });
        }
        self.binding_levels.push(level);
        Ok(())
    }

    pub(crate) fn descend(&mut self, next: Vec<Segment>) {
        self.segments_to_bind = next;
    }

    pub(crate) fn complete(
        &mut self,
        vif_type: VifType,
        vif_details: VifDetails,
        status: Option<PortStatus>,
    ) {
        self.vif_type = vif_type;
        self.vif_details = vif_details;
        if let Some(status) = status {
            self.status = status;
        }
        self.segments_to_bind.clear();
    }

    pub(crate) fn fail(&mut self) {
        self.vif_type = VifType::BindingFailed;
        self.vif_details.clear();
        self.binding_levels.clear();
        self.segments_to_bind.clear();
    }

    pub(crate) fn check(&self, op: Operation) -> Result<(), Violation> {
        check_original(
            op,
            self.current.id.to_string(),
            self.original.as_ref().map(|p| p.id.to_string()),
        )?;
        validate_levels(&self.binding_levels)?;
        Ok(())
    }

    pub(crate) fn to_record(&self, revision: u64) -> BindingRecord {
        BindingRecord {
            port_id: self.current.id,
            network_id: self.network.current.id,
            host: self.host.clone(),
            vif_type: self.vif_type.clone(),
            vif_details: self.vif_details.clone(),
            status: self.status,
            levels: self.binding_levels.clone(),
            revision,
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::{MemoryAgentRegistry, MemoryBindingStore, MemorySegmentRegistry};
    use model::{NetworkType, vif};

    fn network() -> Network {
        Network::new(
            "net1",
            vec![
                Segment::local(Id::new_static("local")),
                Segment::vlan(Id::new_static("vlan"), "physnet1", 100).unwrap(),
            ],
        )
    }

    fn negotiating(level: u8) -> PortContext {
        let net = network();
        let mut ctx = PortContext::new(Port::new(&net), NetworkContext::new(net.clone()), "host1");
        ctx.restart(net.segments.clone());
        let segments = Arc::new(MemorySegmentRegistry::default().with_vlan_range("physnet1", 10..=11));
        ctx.begin(
            "drv",
            level,
            segments,
            Arc::new(MemoryAgentRegistry::default()),
            Arc::new(MemoryBindingStore::new()),
        );
        ctx
    }

    #[test]
    fn mutations_need_an_active_offer() {
        let net = network();
        let mut ctx = PortContext::new(Port::new(&net), NetworkContext::new(net.clone()), "host1");
        let err = ctx
            .set_binding(Some(net.segments[0].id()), VifType::Ovs, VifDetails::new(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            BindingError::InvariantViolation(Violation::NotBinding)
        ));
        assert!(
            ctx.allocate_dynamic_segment(&SegmentSpec::new(NetworkType::Vlan))
                .is_err()
        );
        assert_eq!(ctx.state(), BindingState::Unbound);
    }

    #[test]
    fn second_action_is_a_violation() {
        let mut ctx = negotiating(0);
        let local = ctx.segments_to_bind()[0].id();
        ctx.set_binding(Some(local), VifType::Ovs, VifDetails::new(), None)
            .unwrap();
        let err = ctx
            .set_binding(Some(local), VifType::Ovs, VifDetails::new(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            BindingError::InvariantViolation(Violation::AlreadyActed { level: 0, .. })
        ));
        let offer = ctx.end();
        assert!(offer.action.is_some());
        assert!(matches!(
            offer.violation,
            Some(Violation::AlreadyActed { .. })
        ));
    }

    #[test]
    fn set_binding_argument_checks() {
        let mut ctx = negotiating(0);
        assert!(matches!(
            ctx.set_binding(None, VifType::Ovs, VifDetails::new(), None),
            Err(BindingError::InvariantViolation(Violation::MissingSegment))
        ));

        let mut ctx = negotiating(0);
        let local = ctx.segments_to_bind()[0].id();
        assert!(matches!(
            ctx.set_binding(Some(local), VifType::Unbound, VifDetails::new(), None),
            Err(BindingError::InvariantViolation(
                Violation::NotABoundVifType(_)
            ))
        ));

        let mut ctx = negotiating(0);
        let stranger = Id::new();
        assert!(matches!(
            ctx.set_binding(Some(stranger), VifType::Ovs, VifDetails::new(), None),
            Err(BindingError::InvariantViolation(Violation::UnknownSegment(id))) if id == stranger
        ));

        let mut ctx = negotiating(0);
        ctx.set_binding(None, VifType::BindingFailed, VifDetails::new(), None)
            .unwrap();
        assert!(ctx.end().violation.is_none());
    }

    #[test]
    fn continuation_checks() {
        let mut ctx = negotiating(0);
        let local = ctx.segments_to_bind()[0].clone();
        let vlan = ctx.segments_to_bind()[1].clone();

        assert!(matches!(
            ctx.continue_binding(local.id(), vec![]),
            Err(BindingError::InvariantViolation(Violation::EmptyContinuation))
        ));

        let mut ctx = negotiating(0);
        assert!(matches!(
            ctx.continue_binding(vlan.id(), vec![local.clone()]),
            Err(BindingError::InvariantViolation(Violation::IllegalNextHop { .. }))
        ));

        let mut ctx = negotiating(0);
        ctx.continue_binding(local.id(), vec![vlan]).unwrap();
        assert!(matches!(ctx.end().action, Some(Action::Continue { .. })));
    }

    #[test]
    fn allocation_is_tracked_once() {
        let mut ctx = negotiating(0);
        let spec = SegmentSpec {
            physical_network: Some("physnet1".into()),
            ..SegmentSpec::new(NetworkType::Vlan)
        };
        let a = ctx.allocate_dynamic_segment(&spec).unwrap();
        let b = ctx.allocate_dynamic_segment(&spec).unwrap();
        assert_eq!(a, b);
        assert!(a.is_dynamic());
        assert_eq!(ctx.allocated_segments().len(), 1);
        ctx.release_dynamic_segment(a.id()).unwrap();
        assert!(ctx.allocated_segments().is_empty());
    }

    #[test]
    fn derived_accessors_follow_levels() {
        let net = network();
        let mut ctx = PortContext::new(Port::new(&net), NetworkContext::new(net.clone()), "host1");
        assert!(ctx.top_bound_segment().is_none());
        ctx.push_level(BindingLevel::new(0, net.segments[0].clone(), "a"))
            .unwrap();
        assert_eq!(ctx.state(), BindingState::PartiallyBound);
        ctx.push_level(BindingLevel::new(1, net.segments[1].clone(), "b"))
            .unwrap();
        ctx.complete(VifType::Ovs, vif::details([("port_filter", true)]), None);
        assert_eq!(ctx.state(), BindingState::Bound);
        assert_eq!(ctx.top_bound_segment(), Some(&net.segments[0]));
        assert_eq!(ctx.bottom_bound_segment(), Some(&net.segments[1]));

        ctx.fail();
        assert_eq!(ctx.state(), BindingState::BindingFailed);
        assert!(ctx.binding_levels().is_empty());
        assert!(ctx.top_bound_segment().is_none());
        assert!(ctx.bottom_bound_segment().is_none());
    }

    #[test]
    fn original_comes_from_the_previous_record() {
        let net = network();
        let port = Port::new(&net);
        let previous = BindingRecord {
            port_id: port.id,
            network_id: net.id,
            host: "host-a".into(),
            vif_type: VifType::Ovs,
            vif_details: VifDetails::new(),
            status: PortStatus::Active,
            levels: vec![BindingLevel::new(0, net.segments[1].clone(), "ovs")],
            revision: 3,
        };
        let ctx = PortContext::new(port, NetworkContext::new(net.clone()), "host-b")
            .with_original(&previous);
        assert_eq!(ctx.original_host(), Some("host-a"));
        assert_eq!(ctx.original_vif_type(), Some(&VifType::Ovs));
        assert_eq!(ctx.original_bottom_bound_segment(), Some(&net.segments[1]));
        assert!(ctx.check(Operation::Update).is_ok());
        assert_eq!(
            ctx.check(Operation::Create),
            Err(Violation::UnexpectedOriginal)
        );
    }

    #[test]
    fn network_context_checks() {
        let net = network();
        let ctx = NetworkContext::new(net.clone());
        assert!(ctx.check(Operation::Create).is_ok());
        assert_eq!(ctx.check(Operation::Update), Err(Violation::MissingOriginal));
        let other = Network::new("net2", vec![]);
        let ctx = NetworkContext::new(net).with_original(other);
        assert!(matches!(
            ctx.check(Operation::Update),
            Err(Violation::IdMismatch { .. })
        ));
    }
}
