// src/config/mod.rs

//! Configuration loading and validation for procherd.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate references and ranges (`validate.rs`).
//! - Turn the validated file into unit descriptors and strategy options.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{CompanionConfig, ConfigFile, ConfigSection, RawConfigFile, UnitConfig};
