// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::batch::BatchOptions;
use crate::engine::PumpLimits;
use crate::supervisor::{RestartPolicy, SupervisorOptions};
use crate::types::RunMode;
use crate::unit::{EnvVars, UnitDescriptor, resolve_dir};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// mode = "supervise"
/// restart_on_crash = true
///
/// [profile.dev]
/// APP_ENV = "Development"
///
/// [unit.api]
/// cmd = "dotnet"
/// args = "run --project Api.csproj"
/// cwd = "src/Company.Api"
/// profile = "dev"
/// ready = "Now listening on"
/// ```
///
/// Tables keep file order, so `[unit.*]` order is the batch order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Run-wide settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Named environment profiles from `[profile.<name>]`.
    #[serde(default)]
    pub profile: IndexMap<String, IndexMap<String, String>>,

    /// All units from `[unit.<name>]`, keyed by unit name.
    #[serde(default)]
    pub unit: IndexMap<String, UnitConfig>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub profile: IndexMap<String, IndexMap<String, String>>,
    pub unit: IndexMap<String, UnitConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    #[serde(default)]
    pub mode: RunMode,

    /// Status table refresh interval in supervised mode.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Run-wide crash restart default; units may override it.
    #[serde(default)]
    pub restart_on_crash: bool,

    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Absent means crashed units are retried forever.
    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default = "default_ready_cutoff_secs")]
    pub ready_cutoff_secs: u64,

    #[serde(default = "default_one_shot_cutoff_secs")]
    pub one_shot_cutoff_secs: u64,

    /// Batch mode: how long output is still collected after a unit exits.
    #[serde(default = "default_output_grace_ms")]
    pub output_grace_ms: u64,
}

fn default_tick_ms() -> u64 {
    crate::supervisor::DEFAULT_TICK.as_millis() as u64
}

fn default_restart_delay_ms() -> u64 {
    crate::supervisor::restart::DEFAULT_RESTART_DELAY.as_millis() as u64
}

fn default_ready_cutoff_secs() -> u64 {
    crate::engine::DEFAULT_LONG_RUNNING_CUTOFF.as_secs()
}

fn default_one_shot_cutoff_secs() -> u64 {
    crate::engine::DEFAULT_ONE_SHOT_CUTOFF.as_secs()
}

fn default_output_grace_ms() -> u64 {
    crate::batch::DEFAULT_OUTPUT_GRACE.as_millis() as u64
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            tick_ms: default_tick_ms(),
            restart_on_crash: false,
            restart_delay_ms: default_restart_delay_ms(),
            max_retries: None,
            ready_cutoff_secs: default_ready_cutoff_secs(),
            one_shot_cutoff_secs: default_one_shot_cutoff_secs(),
            output_grace_ms: default_output_grace_ms(),
        }
    }
}

/// `[unit.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitConfig {
    /// Executable (or the whole command line when `shell = true`).
    pub cmd: String,

    /// Argument string, split shell-style unless `shell = true`.
    #[serde(default)]
    pub args: String,

    /// Working directory, relative to the config file's directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Name of a `[profile.<name>]` whose variables are applied first.
    #[serde(default)]
    pub profile: Option<String>,

    /// Unit variables; override profile variables with the same key.
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Readiness marker: substring looked for in stdout lines.
    #[serde(default)]
    pub ready: Option<String>,

    #[serde(default)]
    pub one_shot: bool,

    /// Per-unit override of `[config].restart_on_crash`.
    #[serde(default)]
    pub restart_on_crash: Option<bool>,

    #[serde(default)]
    pub shell: bool,

    #[serde(default)]
    pub companion: Option<CompanionConfig>,
}

/// `[unit.<name>.companion]`: a one-shot unit started right after its
/// primary, e.g. a dependency install next to a dev server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanionConfig {
    /// Defaults to `companion`; the full name is `<primary>:<name>`.
    #[serde(default)]
    pub name: Option<String>,

    pub cmd: String,

    #[serde(default)]
    pub args: String,

    /// Defaults to the primary's working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: IndexMap<String, String>,

    #[serde(default)]
    pub ready: Option<String>,

    #[serde(default)]
    pub shell: bool,
}

pub const DEFAULT_COMPANION_NAME: &str = "companion";

impl CompanionConfig {
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_COMPANION_NAME)
    }
}

impl ConfigFile {
    /// Construct without validation. Prefer `ConfigFile::try_from`.
    pub fn new_unchecked(
        config: ConfigSection,
        profile: IndexMap<String, IndexMap<String, String>>,
        unit: IndexMap<String, UnitConfig>,
    ) -> Self {
        Self {
            config,
            profile,
            unit,
        }
    }

    /// Unit descriptors in file order, with relative directories resolved
    /// against `root` (normally the config file's directory).
    ///
    /// Companions stay attached; the strategies flatten them.
    pub fn units(&self, root: &Path) -> Vec<UnitDescriptor> {
        self.unit
            .iter()
            .map(|(name, cfg)| self.unit_descriptor(name, cfg, root))
            .collect()
    }

    fn unit_descriptor(&self, name: &str, cfg: &UnitConfig, root: &Path) -> UnitDescriptor {
        let dir = match &cfg.cwd {
            Some(cwd) => resolve_dir(root, cwd),
            None => root.to_path_buf(),
        };

        let mut env = EnvVars::new();
        if let Some(vars) = cfg.profile.as_ref().and_then(|p| self.profile.get(p)) {
            env.extend(vars);
        }
        env.extend(&cfg.env);

        let mut unit = UnitDescriptor::new(name, &cfg.cmd)
            .args(&cfg.args)
            .working_dir(dir.clone())
            .one_shot(cfg.one_shot)
            .shell(cfg.shell);
        unit.env = env;
        unit.readiness_marker = cfg.ready.clone();
        unit.restart_on_crash = cfg.restart_on_crash;

        if let Some(companion) = &cfg.companion {
            let mut c = UnitDescriptor::new(companion.effective_name(), &companion.cmd)
                .args(&companion.args)
                .shell(companion.shell);
            if let Some(cwd) = &companion.cwd {
                c = c.working_dir(resolve_dir(&dir, cwd));
            }
            c.env.extend(&companion.env);
            c.readiness_marker = companion.ready.clone();
            unit = unit.companion(c);
        }

        unit
    }

    pub fn mode(&self) -> RunMode {
        self.config.mode
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        let c = &self.config;
        SupervisorOptions {
            tick: Duration::from_millis(c.tick_ms),
            restart: RestartPolicy {
                enabled: c.restart_on_crash,
                delay: Duration::from_millis(c.restart_delay_ms),
                max_retries: c.max_retries,
            },
            limits: self.pump_limits(),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            output_grace: Duration::from_millis(self.config.output_grace_ms),
        }
    }

    fn pump_limits(&self) -> PumpLimits {
        PumpLimits {
            long_running: Duration::from_secs(self.config.ready_cutoff_secs),
            one_shot: Duration::from_secs(self.config.one_shot_cutoff_secs),
        }
    }
}
