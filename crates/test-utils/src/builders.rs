#![allow(dead_code)]

use procherd::config::{CompanionConfig, ConfigFile, ConfigSection, RawConfigFile, UnitConfig};
use procherd::types::RunMode;
use procherd::unit::UnitDescriptor;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                profile: Default::default(),
                unit: Default::default(),
            },
        }
    }

    pub fn with_unit(mut self, name: &str, unit: UnitConfig) -> Self {
        self.config.unit.insert(name.to_string(), unit);
        self
    }

    pub fn with_profile(mut self, name: &str, vars: &[(&str, &str)]) -> Self {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.config.profile.insert(name.to_string(), vars);
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.config.config.mode = mode;
        self
    }

    pub fn restart_on_crash(mut self, val: bool) -> Self {
        self.config.config.restart_on_crash = val;
        self
    }

    pub fn restart_delay_ms(mut self, ms: u64) -> Self {
        self.config.config.restart_delay_ms = ms;
        self
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.config.config.max_retries = Some(max);
        self
    }

    pub fn tick_ms(mut self, ms: u64) -> Self {
        self.config.config.tick_ms = ms;
        self
    }

    /// The raw file, for tests that exercise validation themselves.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `UnitConfig`.
pub struct UnitConfigBuilder {
    unit: UnitConfig,
}

impl UnitConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            unit: UnitConfig {
                cmd: cmd.to_string(),
                ..UnitConfig::default()
            },
        }
    }

    pub fn args(mut self, args: &str) -> Self {
        self.unit.args = args.to_string();
        self
    }

    pub fn cwd(mut self, dir: &str) -> Self {
        self.unit.cwd = Some(dir.into());
        self
    }

    pub fn profile(mut self, name: &str) -> Self {
        self.unit.profile = Some(name.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.unit.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn ready(mut self, marker: &str) -> Self {
        self.unit.ready = Some(marker.to_string());
        self
    }

    pub fn one_shot(mut self, val: bool) -> Self {
        self.unit.one_shot = val;
        self
    }

    pub fn restart_on_crash(mut self, val: bool) -> Self {
        self.unit.restart_on_crash = Some(val);
        self
    }

    pub fn shell(mut self, val: bool) -> Self {
        self.unit.shell = val;
        self
    }

    pub fn companion(mut self, cmd: &str, args: &str) -> Self {
        self.unit.companion = Some(CompanionConfig {
            cmd: cmd.to_string(),
            args: args.to_string(),
            ..CompanionConfig::default()
        });
        self
    }

    pub fn build(self) -> UnitConfig {
        self.unit
    }
}

/// A unit that runs `script` through `sh -c`.
pub fn sh_unit(name: &str, script: &str) -> UnitDescriptor {
    UnitDescriptor::new(name, script).shell(true)
}
