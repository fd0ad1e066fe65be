//! # Vigil Sim
//!
//! Headless runner for Vigil agents.
//!
//! Loads a TOML scenario (or the built-in arena), wires in-process
//! navigation, sight and target services into an `AiWorld`, runs it and
//! prints a summary of what every agent did.
//!
//! ```text
//! vigil-sim [SCENARIO.toml] [--json] [--write-default PATH]
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod scenario;

use anyhow::{bail, Result};
use config::SimConfig;
use scenario::Simulation;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Default)]
struct Args {
    scenario: Option<PathBuf>,
    json: bool,
    write_default: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--json" => args.json = true,
            "--write-default" => match it.next() {
                Some(path) => args.write_default = Some(PathBuf::from(path)),
                None => bail!("--write-default needs a path"),
            },
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            path => args.scenario = Some(PathBuf::from(path)),
        }
    }
    Ok(args)
}

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let args = parse_args()?;
    if let Some(path) = &args.write_default {
        SimConfig::default().save_to(path)?;
        return Ok(());
    }

    let config = match &args.scenario {
        Some(path) => SimConfig::load_from(path),
        None => SimConfig::load(),
    };
    info!("Running {} ticks", config.ticks);

    let summary = Simulation::new(config)?.run();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for (agent, tally) in &summary.agents {
            info!(
                "{agent}: final {:?}, died {:?}, strikes {}, phases {:?}, entered {:?}",
                tally.final_state, tally.died_at, tally.strikes, tally.phase_changes, tally.entered
            );
        }
        info!(
            "{} ticks, {} checks, {} rays, peak backlog {}",
            summary.ticks, summary.checks, summary.rays, summary.peak_backlog
        );
    }
    Ok(())
}
