// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(clippy::unwrap_used)]

mod common;

use common::{
    Fixture, PHYSNET, TestMechanismDriver, assert_bound, local_network, vlan_network,
};
use model::{Id, Network, NetworkType, Port, Segment, SegmentSpec, Subnet, VifDetails, VifType};
use portbind_binding::{
    BindingError, BindingState, BindingStore, DriverError, MechanismDriver, NetworkContext,
    Operation, PortContext, SegmentRegistry, StoreError, SubnetContext, Violation,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Barrier};
use tracing_test::traced_test;

fn journal_of(driver: &TestMechanismDriver) -> Vec<String> {
    driver.journal().lock().clone()
}

#[test]
fn bind_runs_hooks_in_order() {
    let driver = TestMechanismDriver::default();
    let fixture = Fixture::with_driver(driver.clone());
    let net = vlan_network();
    let port = Port::new(&net);

    fixture
        .orchestrator
        .bind(&port, &net, "host-ovs-no_filter")
        .unwrap();
    fixture
        .orchestrator
        .bind(&port, &net, "host-ovs-no_filter")
        .unwrap();
    assert_eq!(
        journal_of(&driver),
        vec![
            "initialize",
            "bind_port",
            "create_port_precommit",
            "create_port_postcommit",
            "bind_port",
            "update_port_precommit",
            "update_port_postcommit",
        ]
    );
}

#[test]
fn precommit_failure_leaves_nothing_behind() {
    let fixture = Fixture::with_driver(TestMechanismDriver::default().failing("create_port_precommit"));
    let net = local_network();
    let port = Port::new(&net);

    let err = fixture
        .orchestrator
        .bind(&port, &net, "host-hierarchical")
        .unwrap_err();
    assert!(matches!(err, BindingError::DriverFault { ref driver, .. } if driver == "test"));
    assert!(fixture.store.load(port.id).unwrap().is_none());
    assert!(fixture.segments.dynamic_segments(net.id).unwrap().is_empty());
}

#[test]
#[traced_test]
fn postcommit_failure_keeps_the_binding() {
    let fixture = Fixture::with_driver(TestMechanismDriver::default().failing("create_port_postcommit"));
    let net = vlan_network();
    let port = Port::new(&net);

    let ctx = fixture
        .orchestrator
        .bind(&port, &net, "host-ovs-no_filter")
        .unwrap();
    assert_bound(&ctx);
    assert_eq!(fixture.store.load(port.id).unwrap().unwrap().vif_type, VifType::Ovs);
    assert!(logs_contain("1 failed postcommit hooks"));
}

#[test]
fn unbind_clears_the_binding() {
    let driver = TestMechanismDriver::default();
    let fixture = Fixture::with_driver(driver.clone());
    let net = local_network();
    let port = Port::new(&net);

    let bound = fixture
        .orchestrator
        .bind(&port, &net, "host-hierarchical")
        .unwrap();
    assert_eq!(fixture.segments.dynamic_segments(net.id).unwrap().len(), 1);

    let ctx = fixture.orchestrator.unbind(&port, &net).unwrap().unwrap();
    assert_eq!(ctx.state(), BindingState::Unbound);
    assert_eq!(ctx.host(), "");
    assert_eq!(ctx.original_host(), Some("host-hierarchical"));
    assert_eq!(ctx.original_binding_levels(), bound.binding_levels());
    assert!(!driver.is_bound(port.id, "host-hierarchical"));
    assert!(fixture.store.is_empty());
    assert!(fixture.segments.dynamic_segments(net.id).unwrap().is_empty());

    assert!(fixture.orchestrator.unbind(&port, &net).unwrap().is_none());
}

#[test]
fn dynamic_segments_are_shared_until_the_last_binding_goes() {
    let fixture = Fixture::with_driver(TestMechanismDriver::default());
    let net = local_network();
    let (a, b) = (Port::new(&net), Port::new(&net));

    let first = fixture
        .orchestrator
        .bind(&a, &net, "host-hierarchical")
        .unwrap();
    let second = fixture
        .orchestrator
        .bind(&b, &net, "host-hierarchical")
        .unwrap();
    assert_eq!(first.bottom_bound_segment(), second.bottom_bound_segment());

    fixture.orchestrator.unbind(&a, &net).unwrap();
    assert_eq!(fixture.segments.dynamic_segments(net.id).unwrap().len(), 1);
    fixture.orchestrator.unbind(&b, &net).unwrap();
    assert!(fixture.segments.dynamic_segments(net.id).unwrap().is_empty());
}

#[test]
fn delete_port_runs_delete_hooks() {
    let driver = TestMechanismDriver::default();
    let fixture = Fixture::with_driver(driver.clone());
    let net = local_network();
    let port = Port::new(&net);

    fixture
        .orchestrator
        .bind(&port, &net, "host-hierarchical")
        .unwrap();
    fixture.orchestrator.delete_port(&port, &net).unwrap();
    let journal = journal_of(&driver);
    assert_eq!(
        &journal[journal.len() - 2..],
        ["delete_port_precommit", "delete_port_postcommit"]
    );
    assert!(fixture.store.is_empty());
    assert!(fixture.segments.dynamic_segments(net.id).unwrap().is_empty());

    // a port that was never bound can be deleted too
    fixture
        .orchestrator
        .delete_port(&Port::new(&net), &net)
        .unwrap();
}

#[test]
fn network_and_subnet_hooks() {
    let driver = TestMechanismDriver::default();
    let fixture = Fixture::with_driver(driver.clone().failing("create_network_postcommit"));
    let manager = fixture.orchestrator.manager();
    let net = vlan_network();

    let ctx = NetworkContext::new(net.clone());
    manager.network_precommit(Operation::Create, &ctx).unwrap();
    let failures = manager.network_postcommit(Operation::Create, &ctx).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].driver, "test");

    assert!(matches!(
        manager.network_precommit(Operation::Update, &ctx),
        Err(BindingError::InvariantViolation(Violation::MissingOriginal))
    ));
    let updated = NetworkContext::new(net.clone()).with_original(net.clone());
    manager.network_precommit(Operation::Update, &updated).unwrap();

    let subnet = Subnet::new(&net, "10.0.0.0/24".parse().unwrap());
    let ctx = SubnetContext::new(subnet.clone(), NetworkContext::new(net.clone()));
    manager.subnet_precommit(Operation::Create, &ctx).unwrap();
    assert!(manager.subnet_postcommit(Operation::Delete, &ctx).unwrap().is_empty());

    let elsewhere = SubnetContext::new(subnet, NetworkContext::new(Network::new("other", vec![])));
    assert!(matches!(
        manager.subnet_precommit(Operation::Create, &elsewhere),
        Err(BindingError::InvariantViolation(Violation::IdMismatch { .. }))
    ));

    let journal = journal_of(&driver);
    assert_eq!(
        journal,
        vec![
            "initialize",
            "create_network_precommit",
            "create_network_postcommit",
            "update_network_precommit",
            "create_subnet_precommit",
            "delete_subnet_postcommit",
        ]
    );
}

/// Waits for a second binding attempt before acting.
struct Rendezvous {
    barrier: Arc<Barrier>,
}

impl MechanismDriver for Rendezvous {
    fn name(&self) -> &str {
        "rendezvous"
    }

    fn bind_port(&self, ctx: &mut PortContext) -> Result<(), DriverError> {
        self.barrier.wait();
        let segment = ctx.segments_to_bind()[0].id();
        ctx.set_binding(Some(segment), VifType::Ovs, VifDetails::new(), None)?;
        Ok(())
    }
}

#[test]
fn concurrent_attempts_conflict() {
    let fixture = Fixture::with_driver(Rendezvous {
        barrier: Arc::new(Barrier::new(2)),
    });
    let net = vlan_network();
    let port = Port::new(&net);

    let results: Vec<Result<PortContext, BindingError>> = std::thread::scope(|s| {
        let attempts: Vec<_> = ["host1", "host2"]
            .into_iter()
            .map(|host| {
                let (fixture, net, port) = (&fixture, &net, &port);
                s.spawn(move || fixture.orchestrator.bind(port, net, host))
            })
            .collect();
        attempts.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let (won, lost): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    assert_eq!(won.len(), 1);
    let err = lost.into_iter().next().unwrap().unwrap_err();
    assert!(err.is_retriable());
    assert!(matches!(
        err,
        BindingError::Store(StoreError::Conflict {
            expected: 0,
            found: 1,
            ..
        })
    ));

    let winner = won.into_iter().next().unwrap().unwrap();
    let record = fixture.store.load(port.id).unwrap().unwrap();
    assert_eq!(record.host, winner.host());
    assert_eq!(record.revision, 1);
}

/// Continues local segments into a dynamic vlan and binds the vlan. On `paused_host` it waits at
/// the vlan level until released.
struct Paused {
    paused_host: &'static str,
    reached: Arc<Barrier>,
    resume: Arc<Barrier>,
}

impl MechanismDriver for Paused {
    fn name(&self) -> &str {
        "paused"
    }

    fn bind_port(&self, ctx: &mut PortContext) -> Result<(), DriverError> {
        let segment = ctx.segments_to_bind()[0].clone();
        if segment.network_type() == NetworkType::Local {
            let spec = SegmentSpec {
                physical_network: Some(PHYSNET.to_string()),
                ..SegmentSpec::new(NetworkType::Vlan)
            };
            let next = ctx.allocate_dynamic_segment(&spec)?;
            ctx.continue_binding(segment.id(), vec![next])?;
            return Ok(());
        }
        if ctx.host() == self.paused_host {
            self.reached.wait();
            self.resume.wait();
        }
        ctx.set_binding(Some(segment.id()), VifType::Ovs, VifDetails::new(), None)?;
        Ok(())
    }
}

#[test]
fn unbind_keeps_segment_held_by_an_attempt() {
    let reached = Arc::new(Barrier::new(2));
    let resume = Arc::new(Barrier::new(2));
    let fixture = Fixture::with_driver(Paused {
        paused_host: "host-paused",
        reached: reached.clone(),
        resume: resume.clone(),
    });
    let net = local_network();
    let (a, b) = (Port::new(&net), Port::new(&net));

    let first = fixture.orchestrator.bind(&a, &net, "host1").unwrap();
    let shared = first.bottom_bound_segment().unwrap().clone();
    assert!(shared.is_dynamic());

    let (during, second) = std::thread::scope(|s| {
        let attempt = s.spawn(|| fixture.orchestrator.bind(&b, &net, "host-paused"));
        reached.wait();
        fixture.orchestrator.unbind(&a, &net).unwrap();
        let during = fixture.segments.dynamic_segments(net.id).unwrap();
        resume.wait();
        (during, attempt.join().unwrap().unwrap())
    });
    assert_eq!(during, vec![shared.clone()]);
    assert_bound(&second);
    assert_eq!(second.bottom_bound_segment(), Some(&shared));
    assert_eq!(fixture.segments.dynamic_segments(net.id).unwrap(), vec![shared.clone()]);

    // the vlan stays with its network while the binding uses it
    let other = Network::new("other-net", vec![Segment::local(Id::new_static("other-net/0"))]);
    let third = fixture
        .orchestrator
        .bind(&Port::new(&other), &other, "host1")
        .unwrap();
    assert_ne!(
        third.bottom_bound_segment().unwrap().segmentation_id(),
        shared.segmentation_id()
    );

    fixture.orchestrator.unbind(&b, &net).unwrap();
    assert!(fixture.segments.dynamic_segments(net.id).unwrap().is_empty());
}
