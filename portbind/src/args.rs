// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

pub use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "portbind")]
#[command(version)]
#[command(about = "Negotiate port bindings over a chain of mechanism drivers", long_about = None)]
pub struct CmdArgs {
    #[arg(
        long,
        value_name = "FILE",
        required_unless_present_any = ["show_tracing_targets", "tracing_config_generate"],
        help = "YAML scenario describing networks, agents, drivers, ports and the requests to run"
    )]
    scenario: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = false,
        help = "Show configurable tracing targets and exit"
    )]
    show_tracing_targets: bool,

    #[arg(long, help = "Print the tracing configuration as a string and exit")]
    tracing_config_generate: bool,

    #[arg(
        long,
        value_name = "tracing configuration",
        help = "Tracing config string as comma-separated sequence of tag=level, with level one in [off,error,warn,info,debug,trace].
Passing default=level sets the default log-level.
Passing all=level allows setting the log-level of all targets to level.
E.g. default=error,all=info,binding=debug"
    )]
    tracing: Option<String>,
}

impl CmdArgs {
    pub fn scenario(&self) -> Option<&Path> {
        self.scenario.as_deref()
    }
    pub fn show_tracing_targets(&self) -> bool {
        self.show_tracing_targets
    }
    pub fn tracing_config_generate(&self) -> bool {
        self.tracing_config_generate
    }
    pub fn tracing(&self) -> Option<&str> {
        self.tracing.as_deref()
    }
}
