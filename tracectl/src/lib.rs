// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of the tracing targets declared across the binding engine.
//!
//! Crates declare their targets with [`trace_target!`] (named after the module that declares it)
//! or [`custom_target!`] (arbitrary target string). Declarations are collected at link time, so
//! the [`TracingControl`] knows every target before any of them has logged anything.

pub mod control;
pub mod targets;

pub use control::{TargetCfg, TraceConfigError, TracingControl, get_trace_ctl};
pub use tracing::level_filters::LevelFilter;
