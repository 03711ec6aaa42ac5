// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(rustdoc::all)]
#![allow(rustdoc::missing_crate_level_docs)]

mod args;
mod scenario;

use crate::args::{CmdArgs, Parser};
use crate::scenario::Scenario;

use color_eyre::eyre::{Result, WrapErr, eyre};
use tracectl::{get_trace_ctl, trace_target};
use tracing::{info, level_filters::LevelFilter};

trace_target!("portbind", LevelFilter::INFO, &[]);

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = CmdArgs::parse();
    let tctl = get_trace_ctl();
    if let Some(tracing) = args.tracing() {
        tctl.setup_from_string(tracing)
            .wrap_err("Invalid tracing configuration")?;
    }
    if args.show_tracing_targets() {
        tctl.dump();
        return Ok(());
    }
    if args.tracing_config_generate() {
        println!("{}", tctl.as_config_string());
        return Ok(());
    }

    let path = args
        .scenario()
        .ok_or_else(|| eyre!("No scenario given"))?;
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let scenario = Scenario::from_yaml(&text)
        .wrap_err_with(|| format!("Failed to load {}", path.display()))?;
    let runner = scenario.runner()?;

    for request in &scenario.requests {
        let report = runner.apply(request)?;
        print!("{}", serde_yaml_ng::to_string(&[report])?);
    }
    info!("Ran {} requests", scenario.requests.len());
    Ok(())
}
