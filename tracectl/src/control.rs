// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.

use ordermap::OrderMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, Registry, prelude::*, reload};

use crate::LevelFilter;
use crate::targets::LOG_TARGETS;
use crate::trace_target;

trace_target!("tracectl", LevelFilter::INFO, &[]);

/// Reasons a tracing configuration string may be rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TraceConfigError {
    #[error("Invalid syntax '{0}': expected tag=level")]
    Syntax(String),
    #[error("Invalid level '{0}' for tag '{1}'")]
    Level(String, String),
    #[error("Unknown tag '{0}'")]
    UnknownTag(String),
}

/// The runtime configuration of a single target.
#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub target: &'static str,
    pub name: &'static str,
    pub level: LevelFilter,
    pub tags: Vec<&'static str>,
}

#[derive(Debug)]
struct TargetDb {
    default: LevelFilter,
    targets: OrderMap<&'static str, TargetCfg>,
    tags: OrderMap<&'static str, BTreeSet<&'static str>>,
}

impl TargetDb {
    fn load(default: LevelFilter) -> Self {
        let mut db = Self {
            default,
            targets: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for decl in LOG_TARGETS {
            let mut tags = decl.tags.to_vec();
            // every target can be addressed by its own name
            if !tags.contains(&decl.name) {
                tags.push(decl.name);
            }
            for tag in &tags {
                db.tags.entry(*tag).or_default().insert(decl.target);
            }
            let cfg = TargetCfg {
                target: decl.target,
                name: decl.name,
                level: decl.level,
                tags,
            };
            if db.targets.insert(decl.target, cfg).is_some() {
                warn!("Tracing target {} declared more than once", decl.target);
            }
        }
        db
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::new(self.default.to_string());
        for cfg in self.targets.values() {
            match format!("{}={}", cfg.target, cfg.level).parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => warn!("Skipping tracing target {}: {e}", cfg.target),
            }
        }
        filter
    }

    fn set_tag_level(&mut self, tag: &str, level: LevelFilter) -> Result<usize, TraceConfigError> {
        let Some(members) = self.tags.get(tag) else {
            return Err(TraceConfigError::UnknownTag(tag.to_string()));
        };
        let mut changed = 0;
        for target in members {
            if let Some(cfg) = self.targets.get_mut(target)
                && cfg.level != level
            {
                cfg.level = level;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

impl Display for TargetDb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "default level: {}", self.default)?;
        for cfg in self.targets.values() {
            writeln!(
                f,
                "  {:<24} {:<40} {:<6} [{}]",
                cfg.name,
                cfg.target,
                cfg.level,
                cfg.tags.join(",")
            )?;
        }
        Ok(())
    }
}

/// Handle to the process-wide tracing configuration.
#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetDb>,
    reload: reload::Handle<EnvFilter, Registry>,
}

static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get the process-wide [`TracingControl`], installing the subscriber on first use.
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACING_CTL.get_or_init(TracingControl::new)
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetDb::load(LevelFilter::INFO);
        let (filter, reload) = reload::Layer::new(db.env_filter());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_level(true);

        // a test harness may already own the global subscriber
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .with(ErrorLayer::default())
            .try_init()
        {
            warn!("Tracing subscriber not installed: {e}");
        }
        Self {
            db: Mutex::new(db),
            reload,
        }
    }

    fn apply(&self, db: &TargetDb) {
        if let Err(e) = self.reload.reload(db.env_filter()) {
            warn!("Failed to reload tracing filter: {e}");
        }
    }

    pub fn init() {
        get_trace_ctl();
    }

    pub fn default_level(&self) -> LevelFilter {
        self.db.lock().default
    }

    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.db.lock();
        if db.default != level {
            db.default = level;
            self.apply(&db);
            info!("Default log level set to {level}");
        }
    }

    pub fn set_level_all(&self, level: LevelFilter) {
        let mut db = self.db.lock();
        for cfg in db.targets.values_mut() {
            cfg.level = level;
        }
        self.apply(&db);
    }

    /// Set the level of every target carrying `tag`.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> Result<(), TraceConfigError> {
        let mut db = self.db.lock();
        let changed = db.set_tag_level(tag, level)?;
        if changed > 0 {
            self.apply(&db);
        }
        info!("Log level for tag '{tag}' set to {level} ({changed} targets changed)");
        Ok(())
    }

    /// Parse a comma-separated list of `tag=level` items.
    fn parse_spec(input: &str) -> Result<OrderMap<String, LevelFilter>, TraceConfigError> {
        let mut out = OrderMap::new();
        for item in input.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let Some((tag, level)) = item.split_once('=') else {
                return Err(TraceConfigError::Syntax(item.to_string()));
            };
            let (tag, level) = (tag.trim(), level.trim());
            let parsed = LevelFilter::from_str(level)
                .map_err(|_| TraceConfigError::Level(level.to_string(), tag.to_string()))?;
            out.insert(tag.to_string(), parsed);
        }
        Ok(out)
    }

    /// Apply a configuration such as `default=warn,all=info,binding=debug`.
    ///
    /// `default` sets the level of undeclared targets, `all` sets every declared target; other
    /// keys are tags and are applied last so they can override `all`.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceConfigError> {
        let spec = Self::parse_spec(input)?;
        if let Some(level) = spec.get("default") {
            self.set_default_level(*level);
        }
        if let Some(level) = spec.get("all") {
            self.set_level_all(*level);
        }
        for (tag, level) in spec.iter().filter(|(t, _)| !matches!(t.as_str(), "default" | "all")) {
            self.set_tag_level(tag, *level)?;
        }
        Ok(())
    }

    pub fn target(&self, target: &str) -> Option<TargetCfg> {
        self.db.lock().targets.get(target).cloned()
    }

    pub fn targets_by_tag(&self, tag: &str) -> Vec<TargetCfg> {
        let db = self.db.lock();
        db.tags
            .get(tag)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|t| db.targets.get(t).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn dump(&self) {
        info!("{}", self.db.lock());
    }

    pub fn as_config_string(&self) -> String {
        let db = self.db.lock();
        let mut out = format!("default={}", db.default);
        for cfg in db.targets.values() {
            out += &format!(",{}={}", cfg.name, cfg.level);
        }
        out
    }
}
