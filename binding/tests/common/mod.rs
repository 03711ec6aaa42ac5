// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Shared fixtures for the binding integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use model::vif::{self, CAP_PORT_FILTER};
use model::{
    BindingLevel, Id, Network, NetworkType, Port, PortStatus, Segment, SegmentSpec, VifDetails,
    VifType, VnicType,
};
use parking_lot::Mutex;
use portbind_binding::memory::{MemoryAgentRegistry, MemoryBindingStore, MemorySegmentRegistry};
use portbind_binding::{
    BindingConfig, BindingOrchestrator, BindingState, DriverError, DriverRegistry,
    MechanismDriver, NetworkContext, PortContext, SubnetContext,
};
use std::collections::HashSet;
use std::sync::Arc;

pub const PHYSNET: &str = "physnet1";

pub fn vlan_network() -> Network {
    Network::new(
        "vlan-net",
        vec![Segment::vlan(Id::new_static("vlan-net/0"), PHYSNET, 1234).unwrap()],
    )
}

pub fn local_network() -> Network {
    Network::new("local-net", vec![Segment::local(Id::new_static("local-net/0"))])
}

pub struct Fixture {
    pub orchestrator: BindingOrchestrator,
    pub store: Arc<MemoryBindingStore>,
    pub segments: Arc<MemorySegmentRegistry>,
    pub agents: Arc<MemoryAgentRegistry>,
}

impl Fixture {
    pub fn new(registry: DriverRegistry) -> Self {
        Self::with_config(BindingConfig::default(), registry)
    }

    pub fn with_config(config: BindingConfig, registry: DriverRegistry) -> Self {
        let segments = Arc::new(
            MemorySegmentRegistry::default()
                .with_vlan_range(PHYSNET, 100..=199)
                .with_tunnel_range(NetworkType::Vxlan, 1000..=1999),
        );
        let agents = Arc::new(MemoryAgentRegistry::default());
        let store = Arc::new(MemoryBindingStore::new());
        let orchestrator = BindingOrchestrator::new(
            config,
            registry,
            segments.clone(),
            agents.clone(),
            store.clone(),
        );
        Self {
            orchestrator,
            store,
            segments,
            agents,
        }
    }

    pub fn with_driver(driver: impl MechanismDriver + 'static) -> Self {
        Self::new(DriverRegistry::new().with(driver).unwrap())
    }
}

/// Levels indexed from zero, with the derived top and bottom segments matching them.
pub fn assert_bound_levels(
    levels: &[BindingLevel],
    top: Option<&Segment>,
    bottom: Option<&Segment>,
) {
    assert!(!levels.is_empty(), "bound context without levels");
    for (index, level) in levels.iter().enumerate() {
        assert_eq!(usize::from(level.level), index);
    }
    assert_eq!(top, Some(&levels[0].segment));
    assert_eq!(bottom, levels.last().map(|l| &l.segment));
}

pub fn assert_unbound_levels(
    levels: &[BindingLevel],
    top: Option<&Segment>,
    bottom: Option<&Segment>,
) {
    assert!(levels.is_empty(), "unbound context with levels {levels:?}");
    assert!(top.is_none());
    assert!(bottom.is_none());
}

pub fn assert_bound(ctx: &PortContext) {
    assert_eq!(ctx.state(), BindingState::Bound);
    assert!(ctx.vif_type().is_bound());
    assert_bound_levels(
        ctx.binding_levels(),
        ctx.top_bound_segment(),
        ctx.bottom_bound_segment(),
    );
}

pub fn assert_failed(ctx: &PortContext) {
    assert_eq!(ctx.state(), BindingState::BindingFailed);
    assert_eq!(ctx.vif_type(), &VifType::BindingFailed);
    assert_unbound_levels(
        ctx.binding_levels(),
        ctx.top_bound_segment(),
        ctx.bottom_bound_segment(),
    );
}

/// Driver whose behaviour depends on the name of the host, checking the contexts it is given on
/// every hook.
///
/// - `host-ovs-no_filter`: binds the first candidate as `ovs`, without port filtering.
/// - `host-bridge-filter`: binds as `bridge`, with port filtering.
/// - `host-ovs-filter-active`: binds as `ovs` and reports the port active.
/// - `host-hierarchical`: continues a local segment with a dynamic vlan, then binds the vlan.
/// - `host-fail`: reports that the port cannot be bound.
///
/// Other hosts are declined.
#[derive(Clone)]
pub struct TestMechanismDriver {
    name: String,
    bound: Arc<Mutex<HashSet<(Id<Port>, String)>>>,
    journal: Arc<Mutex<Vec<String>>>,
    failing: Option<&'static str>,
    vnic_types: Vec<VnicType>,
}

impl Default for TestMechanismDriver {
    fn default() -> Self {
        Self::new("test")
    }
}

impl TestMechanismDriver {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bound: Arc::default(),
            journal: Arc::default(),
            failing: None,
            vnic_types: vec![
                VnicType::Normal,
                VnicType::Direct,
                VnicType::Other("test_mechanism_driver_vnic_type".into()),
            ],
        }
    }

    /// Make `hook` return an error.
    pub fn failing(mut self, hook: &'static str) -> Self {
        self.failing = Some(hook);
        self
    }

    pub fn with_vnic_types(mut self, vnic_types: Vec<VnicType>) -> Self {
        self.vnic_types = vnic_types;
        self
    }

    pub fn journal(&self) -> Arc<Mutex<Vec<String>>> {
        self.journal.clone()
    }

    pub fn is_bound(&self, port: Id<Port>, host: &str) -> bool {
        self.bound.lock().contains(&(port, host.to_string()))
    }

    fn hook(&self, hook: &'static str) -> Result<(), DriverError> {
        self.journal.lock().push(hook.to_string());
        if self.failing == Some(hook) {
            return Err(DriverError::Fault(format!("{hook} rigged to fail")));
        }
        Ok(())
    }

    fn owns(&self, levels: &[BindingLevel]) -> bool {
        levels.iter().any(|l| l.driver == self.name)
    }

    fn check_network_context(ctx: &NetworkContext, original_expected: bool) {
        assert_eq!(ctx.original().is_some(), original_expected);
        if let Some(original) = ctx.original() {
            assert_eq!(original.id, ctx.current().id);
        }
    }

    fn check_subnet_context(ctx: &SubnetContext, original_expected: bool) {
        assert_eq!(ctx.original().is_some(), original_expected);
        if let Some(original) = ctx.original() {
            assert_eq!(original.id, ctx.current().id);
        }
        assert_eq!(ctx.current().network_id, ctx.network().current().id);
        Self::check_network_context(ctx.network(), false);
    }

    fn check_port_info(vif_type: &VifType) {
        assert!(
            matches!(
                vif_type,
                VifType::Unbound
                    | VifType::BindingFailed
                    | VifType::Distributed
                    | VifType::Ovs
                    | VifType::Bridge
            ),
            "unexpected vif type {vif_type}"
        );
    }

    /// `original_expected` of `None` skips the checks of the original binding.
    fn check_port_context(&self, ctx: &PortContext, original_expected: Option<bool>) {
        Self::check_port_info(ctx.vif_type());
        let key = (ctx.current().id, ctx.host().to_string());
        match ctx.state() {
            BindingState::Bound => {
                assert_bound_levels(
                    ctx.binding_levels(),
                    ctx.top_bound_segment(),
                    ctx.bottom_bound_segment(),
                );
                if self.owns(ctx.binding_levels()) {
                    assert!(self.bound.lock().contains(&key), "{key:?} not bound");
                }
            }
            BindingState::PartiallyBound => {
                assert_bound_levels(
                    ctx.binding_levels(),
                    ctx.top_bound_segment(),
                    ctx.bottom_bound_segment(),
                );
            }
            BindingState::Unbound | BindingState::BindingFailed => {
                assert_unbound_levels(
                    ctx.binding_levels(),
                    ctx.top_bound_segment(),
                    ctx.bottom_bound_segment(),
                );
                if original_expected.is_some() {
                    assert!(!self.bound.lock().contains(&key), "{key:?} still bound");
                }
            }
        }

        match original_expected {
            Some(true) => {
                let original = ctx.original().unwrap();
                assert_eq!(original.id, ctx.current().id);
                Self::check_port_info(ctx.original_vif_type().unwrap());
                if ctx.original_vif_type().unwrap().is_bound() {
                    assert_bound_levels(
                        ctx.original_binding_levels(),
                        ctx.original_top_bound_segment(),
                        ctx.original_bottom_bound_segment(),
                    );
                } else {
                    assert_unbound_levels(
                        ctx.original_binding_levels(),
                        ctx.original_top_bound_segment(),
                        ctx.original_bottom_bound_segment(),
                    );
                }
            }
            Some(false) => {
                assert!(ctx.original().is_none());
                assert!(ctx.original_host().is_none());
                assert!(ctx.original_vif_type().is_none());
                assert!(ctx.original_vif_details().is_none());
                assert!(ctx.original_status().is_none());
                assert_unbound_levels(
                    ctx.original_binding_levels(),
                    ctx.original_top_bound_segment(),
                    ctx.original_bottom_bound_segment(),
                );
            }
            None => {}
        }
        Self::check_network_context(ctx.network(), false);
    }

    fn mark_bound(&self, ctx: &PortContext) {
        self.bound
            .lock()
            .insert((ctx.current().id, ctx.host().to_string()));
    }
}

impl MechanismDriver for TestMechanismDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<(), DriverError> {
        self.hook("initialize")
    }

    fn create_network_precommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Self::check_network_context(ctx, false);
        self.hook("create_network_precommit")
    }
    fn create_network_postcommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Self::check_network_context(ctx, false);
        self.hook("create_network_postcommit")
    }
    fn update_network_precommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Self::check_network_context(ctx, true);
        self.hook("update_network_precommit")
    }
    fn update_network_postcommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Self::check_network_context(ctx, true);
        self.hook("update_network_postcommit")
    }
    fn delete_network_precommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Self::check_network_context(ctx, false);
        self.hook("delete_network_precommit")
    }
    fn delete_network_postcommit(&self, ctx: &NetworkContext) -> Result<(), DriverError> {
        Self::check_network_context(ctx, false);
        self.hook("delete_network_postcommit")
    }

    fn create_subnet_precommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Self::check_subnet_context(ctx, false);
        self.hook("create_subnet_precommit")
    }
    fn create_subnet_postcommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Self::check_subnet_context(ctx, false);
        self.hook("create_subnet_postcommit")
    }
    fn update_subnet_precommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Self::check_subnet_context(ctx, true);
        self.hook("update_subnet_precommit")
    }
    fn update_subnet_postcommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Self::check_subnet_context(ctx, true);
        self.hook("update_subnet_postcommit")
    }
    fn delete_subnet_precommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Self::check_subnet_context(ctx, false);
        self.hook("delete_subnet_precommit")
    }
    fn delete_subnet_postcommit(&self, ctx: &SubnetContext) -> Result<(), DriverError> {
        Self::check_subnet_context(ctx, false);
        self.hook("delete_subnet_postcommit")
    }

    fn create_port_precommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        self.check_port_context(ctx, Some(false));
        self.hook("create_port_precommit")
    }
    fn create_port_postcommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        self.check_port_context(ctx, Some(false));
        self.hook("create_port_postcommit")
    }
    fn update_port_precommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        let unbinding = ctx.original_top_bound_segment().is_some() && ctx.top_bound_segment().is_none();
        if (unbinding || ctx.host() == "host-fail") && self.owns(ctx.original_binding_levels()) {
            let original = ctx.original().unwrap();
            let host = ctx.original_host().unwrap_or_default().to_string();
            self.bound.lock().remove(&(original.id, host));
        }
        self.check_port_context(ctx, Some(true));
        self.hook("update_port_precommit")
    }
    fn update_port_postcommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        self.check_port_context(ctx, Some(true));
        self.hook("update_port_postcommit")
    }
    fn delete_port_precommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        self.check_port_context(ctx, Some(false));
        self.hook("delete_port_precommit")
    }
    fn delete_port_postcommit(&self, ctx: &PortContext) -> Result<(), DriverError> {
        self.check_port_context(ctx, Some(false));
        self.hook("delete_port_postcommit")
    }

    fn bind_port(&self, ctx: &mut PortContext) -> Result<(), DriverError> {
        self.check_port_context(ctx, None);
        self.hook("bind_port")?;

        let segment = ctx.segments_to_bind()[0].clone();
        let host = ctx.host().to_string();
        match host.as_str() {
            "host-ovs-no_filter" => {
                ctx.set_binding(
                    Some(segment.id()),
                    VifType::Ovs,
                    vif::details([(CAP_PORT_FILTER, false)]),
                    None,
                )?;
                self.mark_bound(ctx);
            }
            "host-bridge-filter" => {
                ctx.set_binding(
                    Some(segment.id()),
                    VifType::Bridge,
                    vif::details([(CAP_PORT_FILTER, true)]),
                    None,
                )?;
                self.mark_bound(ctx);
            }
            "host-ovs-filter-active" => {
                ctx.set_binding(
                    Some(segment.id()),
                    VifType::Ovs,
                    vif::details([(CAP_PORT_FILTER, true)]),
                    Some(PortStatus::Active),
                )?;
                self.mark_bound(ctx);
            }
            "host-hierarchical" => match segment.network_type() {
                NetworkType::Local => {
                    let spec = SegmentSpec {
                        physical_network: Some(PHYSNET.to_string()),
                        ..SegmentSpec::new(NetworkType::Vlan)
                    };
                    let next = ctx.allocate_dynamic_segment(&spec)?;
                    ctx.continue_binding(segment.id(), vec![next])?;
                }
                NetworkType::Vlan => {
                    ctx.set_binding(
                        Some(segment.id()),
                        VifType::Ovs,
                        vif::details([(CAP_PORT_FILTER, false)]),
                        None,
                    )?;
                    self.mark_bound(ctx);
                }
                _ => {}
            },
            "host-fail" => {
                ctx.set_binding(
                    None,
                    VifType::BindingFailed,
                    vif::details([(CAP_PORT_FILTER, false)]),
                    None,
                )?;
            }
            _ => {}
        }
        Ok(())
    }

    fn supported_vnic_types(&self) -> Vec<VnicType> {
        self.vnic_types.clone()
    }
}

/// A driver that accepts every level it is offered with a fixed VIF type, and counts its offers.
pub struct Greedy {
    pub name: &'static str,
    pub offers: Arc<Mutex<usize>>,
}

impl Greedy {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            offers: Arc::default(),
        }
    }
}

impl MechanismDriver for Greedy {
    fn name(&self) -> &str {
        self.name
    }

    fn bind_port(&self, ctx: &mut PortContext) -> Result<(), DriverError> {
        *self.offers.lock() += 1;
        let segment = ctx.segments_to_bind()[0].id();
        ctx.set_binding(Some(segment), VifType::Other(self.name.to_string()), VifDetails::new(), None)?;
        Ok(())
    }
}
