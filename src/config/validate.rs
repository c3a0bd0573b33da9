// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ProcherdError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProcherdError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.profile, raw.unit))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_units(cfg)?;
    validate_global_config(cfg)?;
    validate_units(cfg)?;
    validate_companion_names(cfg)?;
    Ok(())
}

fn ensure_has_units(cfg: &RawConfigFile) -> Result<()> {
    if cfg.unit.is_empty() {
        return Err(ProcherdError::ConfigError(
            "config must contain at least one [unit.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.tick_ms == 0 {
        return Err(ProcherdError::ConfigError(
            "[config].tick_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_units(cfg: &RawConfigFile) -> Result<()> {
    for (name, unit) in cfg.unit.iter() {
        if unit.cmd.trim().is_empty() {
            return Err(ProcherdError::ConfigError(format!(
                "unit '{name}' has an empty `cmd`"
            )));
        }
        if let Some(profile) = &unit.profile {
            if !cfg.profile.contains_key(profile) {
                return Err(ProcherdError::ConfigError(format!(
                    "unit '{name}' uses unknown profile '{profile}'"
                )));
            }
        }
        if unit.ready.as_deref().is_some_and(str::is_empty) {
            return Err(ProcherdError::ConfigError(format!(
                "unit '{name}' has an empty `ready` marker"
            )));
        }

        if let Some(companion) = &unit.companion {
            if companion.cmd.trim().is_empty() {
                return Err(ProcherdError::ConfigError(format!(
                    "companion of unit '{name}' has an empty `cmd`"
                )));
            }
            if companion.ready.as_deref().is_some_and(str::is_empty) {
                return Err(ProcherdError::ConfigError(format!(
                    "companion of unit '{name}' has an empty `ready` marker"
                )));
            }
        }
    }
    Ok(())
}

fn validate_companion_names(cfg: &RawConfigFile) -> Result<()> {
    for (name, unit) in cfg.unit.iter() {
        let Some(companion) = &unit.companion else {
            continue;
        };
        let full = format!("{name}:{}", companion.effective_name());
        if cfg.unit.contains_key(&full) {
            return Err(ProcherdError::ConfigError(format!(
                "companion '{full}' collides with a unit of the same name"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(text)?;
        ConfigFile::try_from(raw)
    }

    fn config_error(text: &str) -> String {
        match parse(text) {
            Err(ProcherdError::ConfigError(msg)) => msg,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_minimal_config() {
        let cfg = parse("[unit.a]\ncmd = \"echo\"\n").unwrap();
        assert_eq!(cfg.unit.len(), 1);
    }

    #[test]
    fn rejects_empty_unit_list() {
        assert!(config_error("[config]\ntick_ms = 100\n").contains("at least one"));
    }

    #[test]
    fn rejects_unknown_profile() {
        let msg = config_error("[unit.a]\ncmd = \"echo\"\nprofile = \"prod\"\n");
        assert!(msg.contains("unknown profile 'prod'"));
    }

    #[test]
    fn rejects_empty_marker_and_zero_tick() {
        assert!(config_error("[unit.a]\ncmd = \"x\"\nready = \"\"\n").contains("`ready`"));
        assert!(config_error("[config]\ntick_ms = 0\n[unit.a]\ncmd = \"x\"\n").contains("tick_ms"));
    }

    #[test]
    fn rejects_companion_name_collision() {
        let text = r#"
[unit.web]
cmd = "serve"

[unit.web.companion]
cmd = "npm"

[unit."web:companion"]
cmd = "other"
"#;
        assert!(config_error(text).contains("collides"));
    }
}
