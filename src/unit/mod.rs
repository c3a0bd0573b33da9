// src/unit/mod.rs

//! Static unit definitions.
//!
//! A [`UnitDescriptor`] says *what* to run: executable, arguments, working
//! directory, environment overrides and how to recognise readiness. It is
//! built once per run (usually from [`crate::config`]) and shared read-only
//! between the strategy that runs it and the controllers driving its
//! attempts.

pub mod env;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::errors::{ProcherdError, Result};

/// Canonical unit name type used throughout the engine.
pub type UnitName = String;

/// Ordered environment overrides for one unit.
///
/// Insertion order is kept; setting a key that already exists replaces its
/// value in place, so later entries win over earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: IndexMap<String, String>,
}

impl EnvVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Overlay `other` on top of `self`.
    pub fn extend_from(&mut self, other: &EnvVars) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = EnvVars::new();
        env.extend(iter);
        env
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for EnvVars {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

/// Immutable definition of one thing to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDescriptor {
    /// Logical name, unique within a run.
    pub name: UnitName,
    /// Executable path or name.
    pub command: String,
    /// Opaque argument string.
    pub args: String,
    /// Directory the process starts in. `None` inherits ours.
    pub working_dir: Option<PathBuf>,
    pub env: EnvVars,
    /// Substring that marks the unit ready (long-running) or done (one-shot).
    /// Without one, a unit is done when it exits with code 0.
    pub readiness_marker: Option<String>,
    /// Expected to terminate on its own, as opposed to a server process.
    pub one_shot: bool,
    /// Per-unit override of the run-wide restart flag.
    pub restart_on_crash: Option<bool>,
    /// Run `command args` through the platform shell instead of exec'ing
    /// `command` directly.
    pub shell: bool,
    /// Secondary one-shot unit launched alongside this one.
    pub companion: Option<Box<UnitDescriptor>>,
}

impl UnitDescriptor {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: String::new(),
            working_dir: None,
            env: EnvVars::new(),
            readiness_marker: None,
            one_shot: false,
            restart_on_crash: None,
            shell: false,
            companion: None,
        }
    }

    pub fn args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.set(key, value);
        self
    }

    pub fn readiness_marker(mut self, marker: impl Into<String>) -> Self {
        self.readiness_marker = Some(marker.into());
        self
    }

    pub fn one_shot(mut self, one_shot: bool) -> Self {
        self.one_shot = one_shot;
        self
    }

    pub fn restart_on_crash(mut self, restart: bool) -> Self {
        self.restart_on_crash = Some(restart);
        self
    }

    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn companion(mut self, companion: UnitDescriptor) -> Self {
        self.companion = Some(Box::new(companion));
        self
    }

    /// Directory used for `{app}` resolution and as the process cwd.
    pub fn effective_dir(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Command line as it would be typed, for logs and dry runs.
    pub fn command_line(&self) -> String {
        if self.args.trim().is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args)
        }
    }
}

/// Flatten companions into independent descriptors.
///
/// Each companion follows its primary, is forced to `one_shot`, and inherits
/// the primary's working directory and environment (its own entries win).
/// Its name becomes `<primary>:<companion>`.
pub fn expand_companions(units: Vec<UnitDescriptor>) -> Vec<UnitDescriptor> {
    let mut out = Vec::with_capacity(units.len());

    for mut unit in units {
        let companion = unit.companion.take();
        let primary_name = unit.name.clone();
        let primary_dir = unit.working_dir.clone();
        let primary_env = unit.env.clone();
        out.push(unit);

        if let Some(companion) = companion {
            let mut companion = *companion;
            companion.name = format!("{}:{}", primary_name, companion.name);
            companion.one_shot = true;
            if companion.working_dir.is_none() {
                companion.working_dir = primary_dir;
            }
            let mut env = primary_env;
            env.extend_from(&companion.env);
            companion.env = env;
            // Nested companions flatten the same way.
            out.extend(expand_companions(vec![companion]));
        }
    }

    out
}

/// Reject a unit list that uses the same name twice.
pub fn ensure_unique_names(units: &[UnitDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for unit in units {
        if !seen.insert(unit.name.as_str()) {
            return Err(ProcherdError::DuplicateUnit(unit.name.clone()));
        }
    }
    Ok(())
}

/// Resolve `dir` against `base` unless it is already absolute.
pub fn resolve_dir(base: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base.join(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_env_entries_override_earlier_ones() {
        let env: EnvVars = [("A", "1"), ("B", "2"), ("A", "3")].into_iter().collect();
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("A"), Some("3"));
        let keys: Vec<_> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn companions_are_flattened_after_their_primary() {
        let units = vec![
            UnitDescriptor::new("web", "dotnet")
                .working_dir("/srv/web")
                .env("MODE", "dev")
                .companion(
                    UnitDescriptor::new("libs", "npm")
                        .args("install")
                        .env("MODE", "ci"),
                ),
            UnitDescriptor::new("worker", "dotnet"),
        ];

        let flat = expand_companions(units);
        let names: Vec<_> = flat.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["web", "web:libs", "worker"]);

        let companion = &flat[1];
        assert!(companion.one_shot);
        assert_eq!(companion.working_dir, Some(PathBuf::from("/srv/web")));
        assert_eq!(companion.env.get("MODE"), Some("ci"));
        assert!(flat[0].companion.is_none());
    }

    #[test]
    fn duplicate_names_are_a_contract_violation() {
        let units = vec![
            UnitDescriptor::new("api", "a"),
            UnitDescriptor::new("api", "b"),
        ];
        let err = ensure_unique_names(&units).unwrap_err();
        assert!(matches!(err, ProcherdError::DuplicateUnit(name) if name == "api"));
    }
}
