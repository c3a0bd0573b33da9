// src/engine/mod.rs

//! Orchestration engine vocabulary.
//!
//! This module holds the types shared by both execution strategies:
//! - [`UnitStatus`]: where an instance is in its lifecycle
//! - [`UnitSnapshot`]: an immutable copy of one instance's state, which is
//!   what renderers and run reports see
//! - [`UnitOutcome`]: the per-unit verdict of a supervised run
//! - [`PumpLimits`]: how long stdout is scanned for a readiness marker
//!
//! The pure per-instance state machine lives in [`state`]; the process IO
//! that feeds it lives in [`crate::exec::controller`].

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::unit::UnitName;

pub mod state;

pub use state::{Effect, InstanceEvent, InstanceState};

/// Sub-state of a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Running, readiness marker not seen yet.
    Building,
    /// Running, readiness marker seen.
    Ready,
}

/// Lifecycle status of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Batch mode: waiting for earlier units to finish.
    Queued,
    Starting,
    Running(Readiness),
    /// One-shot marker seen, or the process exited with code 0.
    Completed,
    /// Process exited with a non-zero code.
    Exited(i32),
    /// Waiting out the restart delay before the next attempt.
    Retrying,
    /// The executable could not be spawned.
    FailedToStart(String),
}

impl UnitStatus {
    /// Terminal for the attempt *and* the unit: no further transitions unless
    /// a restart is scheduled (which shows up as `Retrying`).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::Completed | UnitStatus::Exited(_) | UnitStatus::FailedToStart(_)
        )
    }

    /// Short label for tables and logs.
    pub fn label(&self) -> String {
        match self {
            UnitStatus::Queued => "queued".to_string(),
            UnitStatus::Starting => "starting".to_string(),
            UnitStatus::Running(Readiness::Building) => "building".to_string(),
            UnitStatus::Running(Readiness::Ready) => "ready".to_string(),
            UnitStatus::Completed => "completed".to_string(),
            UnitStatus::Exited(code) => format!("exited ({code})"),
            UnitStatus::Retrying => "retrying".to_string(),
            UnitStatus::FailedToStart(_) => "failed to start".to_string(),
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Immutable view of one instance at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSnapshot {
    pub name: UnitName,
    pub status: UnitStatus,
    pub last_output_line: Option<String>,
    /// Set only once the process has exited (or was killed).
    pub exit_code: Option<i32>,
    pub started_at: Option<DateTime<Local>>,
    pub retry_count: u32,
    pub queued_for_restart: bool,
    pub pid: Option<u32>,
    /// The process tree was force-killed by run cancellation.
    pub killed: bool,
    pub one_shot: bool,
}

/// Per-unit verdict of a supervised run, derived from its final snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Long-running unit that had signalled readiness when the run ended.
    Ready,
    /// One-shot marker seen or clean exit.
    Completed,
    /// Exited non-zero (after any retries the policy allowed).
    Failed(i32),
    /// The executable could not be spawned.
    SpawnFailed(String),
    /// Still starting or building when the run ended.
    Unresolved,
}

impl UnitOutcome {
    pub fn from_snapshot(snapshot: &UnitSnapshot) -> Self {
        match &snapshot.status {
            UnitStatus::Running(Readiness::Ready) => UnitOutcome::Ready,
            UnitStatus::Completed => UnitOutcome::Completed,
            UnitStatus::Exited(code) => UnitOutcome::Failed(*code),
            UnitStatus::FailedToStart(reason) => UnitOutcome::SpawnFailed(reason.clone()),
            UnitStatus::Queued
            | UnitStatus::Starting
            | UnitStatus::Running(Readiness::Building)
            | UnitStatus::Retrying => UnitOutcome::Unresolved,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Ready | UnitOutcome::Completed)
    }
}

/// Default stdout scan window for long-running units.
pub const DEFAULT_LONG_RUNNING_CUTOFF: Duration = Duration::from_secs(120);
/// Default stdout scan window for one-shot units.
pub const DEFAULT_ONE_SHOT_CUTOFF: Duration = Duration::from_secs(300);

/// Hard limits on how long an instance's stdout is scanned for its marker.
///
/// After the cutoff the instance keeps its last observed status; remaining
/// output is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpLimits {
    pub long_running: Duration,
    pub one_shot: Duration,
}

impl PumpLimits {
    pub fn cutoff_for(&self, one_shot: bool) -> Duration {
        if one_shot { self.one_shot } else { self.long_running }
    }
}

impl Default for PumpLimits {
    fn default() -> Self {
        Self {
            long_running: DEFAULT_LONG_RUNNING_CUTOFF,
            one_shot: DEFAULT_ONE_SHOT_CUTOFF,
        }
    }
}
