// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Drives the negotiation of port bindings over the mechanism driver chain.
//!
//! A binding attempt filters the chain (VNIC type, host vetoes), then offers the candidate
//! segments level by level. At each level the first driver that acts wins. A driver that
//! continues the binding supplies the candidates for the next level, which are offered to the
//! same filtered chain. The attempt ends when a driver binds a segment, when a driver reports
//! failure, or when no driver acts, in which case the port is `binding_failed`. The outcome then
//! goes through the precommit hooks, the binding store and the postcommit hooks.

use model::vif::{self, VIF_DETAILS_BOUND_DRIVERS};
use model::{BindingLevel, Id, Network, Port, Segment};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::collaborators::{
    AgentRegistry, BindingRecord, BindingStore, SegmentRegistry, stored_binding_uses,
};
use crate::config::BindingConfig;
use crate::context::{Action, NetworkContext, PortContext};
use crate::driver::MechanismDriver;
use crate::errors::{BindingError, Violation};
use crate::manager::{MechanismManager, Operation};
use crate::registry::DriverRegistry;

fn render_levels(levels: &[BindingLevel]) -> String {
    levels
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct BindingOrchestrator {
    config: BindingConfig,
    registry: DriverRegistry,
    segments: Arc<dyn SegmentRegistry>,
    agents: Arc<dyn AgentRegistry>,
    store: Arc<dyn BindingStore>,
}

impl BindingOrchestrator {
    #[must_use]
    pub fn new(
        config: BindingConfig,
        registry: DriverRegistry,
        segments: Arc<dyn SegmentRegistry>,
        agents: Arc<dyn AgentRegistry>,
        store: Arc<dyn BindingStore>,
    ) -> Self {
        Self {
            config,
            registry,
            segments,
            agents,
            store,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Lifecycle dispatch over the drivers of this orchestrator.
    #[must_use]
    pub fn manager(&self) -> MechanismManager<'_> {
        MechanismManager::new(&self.registry)
    }

    fn check_membership(port: &Port, network: &Network) -> Result<(), BindingError> {
        if port.network_id == network.id {
            Ok(())
        } else {
            Err(BindingError::NetworkMismatch {
                port: port.id,
                network: network.id,
            })
        }
    }

    /// Bind `port` on `host`, replacing any stored binding.
    ///
    /// Returns the context of the attempt, which is either bound or `binding_failed`. Errors mean
    /// the attempt was aborted and the stored binding is unchanged.
    #[instrument(level = "debug", skip_all, fields(port = %port.id, host = %host))]
    pub fn bind(&self, port: &Port, network: &Network, host: &str) -> Result<PortContext, BindingError> {
        Self::check_membership(port, network)?;
        let previous = self.store.load(port.id)?;
        let expected = previous.as_ref().map_or(0, |r| r.revision);
        let mut ctx = PortContext::new(port.clone(), NetworkContext::new(network.clone()), host);
        let op = match &previous {
            Some(previous) => {
                ctx = ctx.with_original(previous);
                Operation::Update
            }
            None => Operation::Create,
        };

        let outcome = self
            .negotiate(&mut ctx)
            .and_then(|()| self.manager().port_precommit(op, &ctx))
            .and_then(|()| {
                self.store
                    .commit(ctx.to_record(expected), expected)
                    .map_err(BindingError::from)
            });
        self.release_unused(&ctx, previous.as_ref());
        let revision = outcome?;

        let failures = self.manager().port_postcommit(op, &ctx)?;
        if !failures.is_empty() {
            warn!(
                "Binding of port {} committed at revision {revision} with {} failed postcommit hooks",
                port.id,
                failures.len()
            );
        }
        info!(
            "Port {} on host {host}: {} [{}]",
            port.id,
            ctx.state(),
            render_levels(ctx.binding_levels())
        );
        Ok(ctx)
    }

    /// Remove the binding of `port`. Returns the context of the removal, or `None` if the port
    /// was not bound.
    #[instrument(level = "debug", skip_all, fields(port = %port.id))]
    pub fn unbind(&self, port: &Port, network: &Network) -> Result<Option<PortContext>, BindingError> {
        Self::check_membership(port, network)?;
        let Some(previous) = self.store.load(port.id)? else {
            debug!("Port {} has no binding", port.id);
            return Ok(None);
        };
        let ctx = PortContext::new(port.clone(), NetworkContext::new(network.clone()), "")
            .with_original(&previous);
        self.manager().port_precommit(Operation::Update, &ctx)?;
        self.store.remove(port.id, previous.revision)?;
        self.release_unused(&ctx, Some(&previous));
        self.manager().port_postcommit(Operation::Update, &ctx)?;
        info!("Unbound port {} from host {}", port.id, previous.host);
        Ok(Some(ctx))
    }

    /// Run the delete hooks for `port` and drop its binding.
    #[instrument(level = "debug", skip_all, fields(port = %port.id))]
    pub fn delete_port(&self, port: &Port, network: &Network) -> Result<(), BindingError> {
        Self::check_membership(port, network)?;
        let previous = self.store.load(port.id)?;
        let net = NetworkContext::new(network.clone());
        let ctx = match &previous {
            Some(record) => PortContext::from_record(port.clone(), net, record),
            None => PortContext::new(port.clone(), net, ""),
        };
        self.manager().port_precommit(Operation::Delete, &ctx)?;
        if let Some(record) = &previous {
            self.store.remove(port.id, record.revision)?;
            self.release_unused(&ctx, Some(record));
        }
        self.manager().port_postcommit(Operation::Delete, &ctx)?;
        info!("Deleted port {}", port.id);
        Ok(())
    }

    /// Drop the holds of the attempt of `ctx`, then give back the dynamic segments it touched
    /// that no stored binding and no other attempt uses.
    fn release_unused(&self, ctx: &PortContext, previous: Option<&BindingRecord>) {
        let network = ctx.network().current().id;
        for segment in ctx.allocated_segments() {
            self.segments.unhold_dynamic_segment(network, segment.id());
        }
        let in_use = |segment: Id<Segment>| stored_binding_uses(&*self.store, segment);
        let mut seen: BTreeSet<Id<Segment>> = BTreeSet::new();
        let touched = ctx
            .allocated_segments()
            .iter()
            .chain(previous.into_iter().flat_map(|r| r.levels.iter().map(|l| &l.segment)))
            .filter(|s| s.is_dynamic() && seen.insert(s.id()));
        for segment in touched {
            if let Err(e) = self
                .segments
                .release_dynamic_segment(network, segment.id(), &in_use)
            {
                warn!("Failed to release dynamic segment {segment}: {e}");
            }
        }
    }

    /// Negotiate a binding for the host of `ctx`. Leaves `ctx` bound or failed.
    fn negotiate(&self, ctx: &mut PortContext) -> Result<(), BindingError> {
        let port = ctx.current().id;
        let host = ctx.host().to_string();
        let chain = self.registry.offered(ctx.current());
        if chain.is_empty() {
            warn!(
                "No mechanism driver supports vnic type {} and extensions [{}] of port {port}",
                ctx.current().vnic_type,
                ctx.current()
                    .extensions
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let candidates = ctx.network().network_segments().to_vec();
        ctx.restart(candidates);
        if ctx.segments_to_bind().is_empty() {
            warn!(
                "Failed to bind port {port} on host {host}: network {} has no segments",
                ctx.network().current().id
            );
            ctx.fail();
            return Ok(());
        }
        let mut visited: HashSet<Id<Segment>> =
            ctx.segments_to_bind().iter().map(Segment::id).collect();

        loop {
            let level = u8::try_from(ctx.binding_levels().len())
                .ok()
                .filter(|level| *level < self.config.max_binding_levels)
                .ok_or(Violation::TooManyLevels(self.config.max_binding_levels))?;

            let eligible = self.eligible(ctx, &chain);
            let Some((driver, action)) = self.offer(ctx, &eligible, level)? else {
                warn!(
                    "Failed to bind port {port} on host {host} at level {level}: no driver accepted [{}]",
                    render_segments(ctx.segments_to_bind())
                );
                ctx.fail();
                return Ok(());
            };

            match action {
                Action::Bind { segment: None, .. } => {
                    warn!("Driver '{driver}' reports port {port} cannot be bound on host {host}");
                    ctx.fail();
                    return Ok(());
                }
                Action::Bind {
                    segment: Some(segment),
                    vif_type,
                    mut vif_details,
                    status,
                } => {
                    ctx.push_level(BindingLevel::new(level, segment, driver))?;
                    vif_details.insert(
                        VIF_DETAILS_BOUND_DRIVERS.to_string(),
                        vif::bound_drivers(ctx.binding_levels()),
                    );
                    ctx.complete(vif_type, vif_details, status);
                    return Ok(());
                }
                Action::Continue { segment, next } => {
                    if let Some(again) = next.iter().find(|s| visited.contains(&s.id())) {
                        return Err(Violation::SegmentRevisited(again.id()).into());
                    }
                    visited.extend(next.iter().map(Segment::id));
                    debug!(
                        "Driver '{driver}' continues port {port} from {segment} to [{}]",
                        render_segments(&next)
                    );
                    ctx.push_level(BindingLevel::new(level, segment, driver))?;
                    ctx.descend(next);
                }
            }
        }
    }

    /// The drivers of `chain` that do not veto the host of `ctx` for the current candidates.
    fn eligible<'a>(
        &self,
        ctx: &PortContext,
        chain: &[&'a dyn MechanismDriver],
    ) -> Vec<&'a dyn MechanismDriver> {
        let mut hosts = self.agents.hosts();
        hosts.insert(ctx.host().to_string());
        chain
            .iter()
            .filter(|driver| {
                let vetoed = driver
                    .filter_hosts_with_segment_access(
                        ctx,
                        ctx.segments_to_bind(),
                        &hosts,
                        &*self.agents,
                    )
                    .contains(ctx.host());
                if vetoed {
                    warn!(
                        "Driver '{}' cannot reach [{}] from host {}",
                        driver.name(),
                        render_segments(ctx.segments_to_bind()),
                        ctx.host()
                    );
                }
                !vetoed
            })
            .copied()
            .collect()
    }

    /// Offer the current level to each driver of `chain` until one acts.
    fn offer(
        &self,
        ctx: &mut PortContext,
        chain: &[&dyn MechanismDriver],
        level: u8,
    ) -> Result<Option<(String, Action)>, BindingError> {
        for driver in chain {
            debug!(
                "Offering port {} on host {} at level {level} to '{}': [{}]",
                ctx.current().id,
                ctx.host(),
                driver.name(),
                render_segments(ctx.segments_to_bind())
            );
            ctx.begin(
                driver.name(),
                level,
                self.segments.clone(),
                self.agents.clone(),
                self.store.clone(),
            );
            let result = driver.bind_port(ctx);
            let offer = ctx.end();
            if let Some(violation) = offer.violation {
                error!("Driver '{}' broke the binding contract: {violation}", driver.name());
                return Err(violation.into());
            }
            result.map_err(|source| BindingError::DriverFault {
                driver: driver.name().to_string(),
                source,
            })?;
            if let Some(action) = offer.action {
                return Ok(Some((driver.name().to_string(), action)));
            }
        }
        Ok(None)
    }
}
