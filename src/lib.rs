// src/lib.rs

pub mod batch;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod render;
pub mod supervisor;
pub mod types;
pub mod unit;

use std::io::IsTerminal;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::BatchExecutor;
use crate::cli::CliArgs;
use crate::config::{ConfigFile, config_root_dir, load_and_validate};
use crate::errors::ProcherdError;
use crate::render::TerminalSink;
use crate::supervisor::Supervisor;
use crate::types::RunMode;
use crate::unit::{UnitDescriptor, expand_companions};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and the `--only` filter
/// - the chosen strategy (supervised or batch)
/// - the terminal status sink
/// - Ctrl-C handling
///
/// Returns `false` when a batch run had failing units.
pub async fn run(args: CliArgs) -> Result<bool> {
    let cfg = load_and_validate(&args.config)?;
    let root = config_root_dir(&args.config);
    let units = select_units(cfg.units(&root), &args.only)?;
    let mode = args.mode.unwrap_or(cfg.mode());

    if args.dry_run {
        print_dry_run(&cfg, mode, &units);
        return Ok(true);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; shutting down");
            cancel.cancel();
        });
    }

    match mode {
        RunMode::Supervise => {
            let mut options = cfg.supervisor_options();
            let mut units = units;
            if args.no_restart {
                options.restart.enabled = false;
                units = units.into_iter().map(|u| u.restart_on_crash(false)).collect();
            }

            let live = !args.plain && std::io::stdout().is_terminal();
            let report = Supervisor::new(options)
                .run(units, &cancel, TerminalSink::stdout(live))
                .await?;
            info!(cancelled = report.cancelled(), "supervised run ended");
            Ok(true)
        }
        RunMode::Batch => {
            let report = BatchExecutor::new(cfg.batch_options())
                .run(units, &cancel, TerminalSink::stdout(false))
                .await?;
            Ok(report.all_succeeded())
        }
    }
}

/// Keep only the units named in `only` (all units if it is empty), in file
/// order. Unknown names are a configuration error.
fn select_units(units: Vec<UnitDescriptor>, only: &[String]) -> Result<Vec<UnitDescriptor>> {
    if only.is_empty() {
        return Ok(units);
    }
    for name in only {
        if !units.iter().any(|u| &u.name == name) {
            return Err(ProcherdError::ConfigError(format!(
                "--only refers to unknown unit '{name}'"
            ))
            .into());
        }
    }
    Ok(units
        .into_iter()
        .filter(|u| only.contains(&u.name))
        .collect())
}

/// Simple dry-run output: print the resolved units and run settings.
fn print_dry_run(cfg: &ConfigFile, mode: RunMode, units: &[UnitDescriptor]) {
    println!("procherd dry-run");
    println!("  mode = {mode}");
    println!("  config.restart_on_crash = {}", cfg.config.restart_on_crash);
    match cfg.config.max_retries {
        Some(max) => println!("  config.max_retries = {max}"),
        None => println!("  config.max_retries = unbounded"),
    }
    println!();

    let units = expand_companions(units.to_vec());
    println!("units ({}):", units.len());
    for unit in &units {
        println!("  - {}", unit.name);
        println!("      cmd: {}", unit.command_line());
        println!("      cwd: {}", unit.effective_dir().display());
        if let Some(marker) = &unit.readiness_marker {
            println!("      ready: {marker}");
        }
        if unit.one_shot {
            println!("      one_shot: true");
        }
        if unit.shell {
            println!("      shell: true");
        }
        if let Some(restart) = unit.restart_on_crash {
            println!("      restart_on_crash: {restart}");
        }
        let resolved = crate::unit::env::resolve_env(&unit.env, &unit.effective_dir());
        for (key, value) in resolved.iter() {
            println!("      env: {key}={value}");
        }
    }

    debug!("dry-run complete (no execution)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_filter_keeps_file_order() {
        let units = vec![
            UnitDescriptor::new("a", "x"),
            UnitDescriptor::new("b", "x"),
            UnitDescriptor::new("c", "x"),
        ];
        let picked = select_units(units, &["c".into(), "a".into()]).unwrap();
        let names: Vec<_> = picked.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn only_filter_rejects_unknown_names() {
        let units = vec![UnitDescriptor::new("a", "x")];
        assert!(select_units(units, &["zzz".into()]).is_err());
    }
}
