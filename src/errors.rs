// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Per-unit failures (spawn errors, non-zero exits) are reported as data in
//! the run outcome, never through this type. `ProcherdError` only covers
//! configuration problems and contract violations on the orchestration API.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcherdError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate unit name: {0}")]
    DuplicateUnit(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcherdError>;
