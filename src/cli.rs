// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::RunMode;

/// Command-line arguments for `procherd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procherd",
    version,
    about = "Start, watch and restart a set of local processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Procherd.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Procherd.toml")]
    pub config: PathBuf,

    /// Execution strategy: `supervise` (all at once, live table) or
    /// `batch` (one after another). Overrides `[config].mode`.
    #[arg(long, value_name = "MODE")]
    pub mode: Option<RunMode>,

    /// Run only these units (repeatable). Companions follow their primary.
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,

    /// Never restart crashed units, whatever the config says.
    #[arg(long)]
    pub no_restart: bool,

    /// Print status tables one after another instead of redrawing the screen.
    #[arg(long)]
    pub plain: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCHERD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the resolved units, but don't start anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
