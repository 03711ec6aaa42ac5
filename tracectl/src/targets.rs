// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link-time registry of tracing targets.

use crate::LevelFilter;
use linkme::distributed_slice;

/// A tracing target as declared in source.
pub struct LogTarget {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
}

impl LogTarget {
    #[must_use]
    pub const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
        }
    }
}

#[distributed_slice]
pub static LOG_TARGETS: [LogTarget];

#[doc(hidden)]
#[macro_export]
macro_rules! log_target_deps {
    () => {
        use linkme::distributed_slice;
        use $crate::LevelFilter;
        use $crate::targets::{LOG_TARGETS, LogTarget};
    };
}

/// Declare a tracing target for the enclosing module, with a display name, a default level and a
/// set of tags.
///
/// Callers must depend on `linkme`.
#[macro_export]
macro_rules! trace_target {
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::log_target_deps;
            log_target_deps!();

            #[distributed_slice(LOG_TARGETS)]
            static LOG_TARGET: LogTarget = LogTarget::new(module_path!(), $name, $level, $tags);
        };
    };
}

/// Declare a tracing target whose target string is not a module path (e.g. a dependency's
/// target or an explicit `target:` used in log macros).
#[macro_export]
macro_rules! custom_target {
    ($target:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::log_target_deps;
            log_target_deps!();

            #[distributed_slice(LOG_TARGETS)]
            static LOG_TARGET: LogTarget = LogTarget::new($target, $target, $level, $tags);
        };
    };
}
