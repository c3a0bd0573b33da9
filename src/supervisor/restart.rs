// src/supervisor/restart.rs

//! Crash-restart policy for supervised runs.

use std::time::Duration;

use crate::engine::{UnitSnapshot, UnitStatus};
use crate::unit::UnitDescriptor;

/// Default pause between a crash and the next attempt.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(3100);

/// When and how crashed units are started again.
///
/// A crash is a non-zero exit. Spawn failures, clean exits and processes
/// killed by cancellation are never restarted. With `max_retries = None` a
/// unit that keeps crashing is retried forever at a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Run-wide default; units may override it.
    pub enabled: bool,
    pub delay: Duration,
    pub max_retries: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: DEFAULT_RESTART_DELAY,
            max_retries: None,
        }
    }
}

impl RestartPolicy {
    pub fn enabled_for(&self, unit: &UnitDescriptor) -> bool {
        unit.restart_on_crash.unwrap_or(self.enabled)
    }

    /// Whether the attempt that just ended should be followed by another.
    pub fn should_restart(
        &self,
        unit: &UnitDescriptor,
        attempt: &UnitSnapshot,
        cancelled: bool,
    ) -> bool {
        if cancelled || attempt.killed || !self.enabled_for(unit) {
            return false;
        }
        if !matches!(attempt.status, UnitStatus::Exited(code) if code != 0) {
            return false;
        }
        self.max_retries
            .is_none_or(|max| attempt.retry_count < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InstanceEvent, InstanceState};
    use chrono::Local;

    fn ended(unit: &UnitDescriptor, retry: u32, code: i32) -> UnitSnapshot {
        let mut state = InstanceState::for_attempt(unit, retry);
        state.apply(InstanceEvent::Spawned {
            pid: Some(7),
            at: Local::now(),
        });
        state.apply(InstanceEvent::Exited(Some(code)));
        state.snapshot()
    }

    #[test]
    fn restarts_only_crashes_when_enabled() {
        let policy = RestartPolicy {
            enabled: true,
            ..RestartPolicy::default()
        };
        let unit = UnitDescriptor::new("api", "server");

        assert!(policy.should_restart(&unit, &ended(&unit, 0, 1), false));
        assert!(!policy.should_restart(&unit, &ended(&unit, 0, 0), false));
        assert!(!policy.should_restart(&unit, &ended(&unit, 0, 1), true));
    }

    #[test]
    fn unit_override_beats_run_default() {
        let policy = RestartPolicy::default();
        let unit = UnitDescriptor::new("api", "server").restart_on_crash(true);
        assert!(policy.should_restart(&unit, &ended(&unit, 0, 2), false));

        let opted_out = UnitDescriptor::new("api", "server").restart_on_crash(false);
        let enabled = RestartPolicy {
            enabled: true,
            ..RestartPolicy::default()
        };
        assert!(!enabled.should_restart(&opted_out, &ended(&opted_out, 0, 2), false));
    }

    #[test]
    fn unbounded_by_default_capped_when_configured() {
        let unit = UnitDescriptor::new("api", "server").restart_on_crash(true);
        let unbounded = RestartPolicy::default();
        assert!(unbounded.should_restart(&unit, &ended(&unit, 10_000, 1), false));

        let capped = RestartPolicy {
            max_retries: Some(2),
            ..RestartPolicy::default()
        };
        assert!(capped.should_restart(&unit, &ended(&unit, 1, 1), false));
        assert!(!capped.should_restart(&unit, &ended(&unit, 2, 1), false));
    }

    #[test]
    fn spawn_failures_are_not_retried() {
        let unit = UnitDescriptor::new("ghost", "/nope").restart_on_crash(true);
        let mut state = InstanceState::for_attempt(&unit, 0);
        state.apply(InstanceEvent::SpawnFailed("not found".into()));
        assert!(!RestartPolicy::default().should_restart(&unit, &state.snapshot(), false));
    }
}
