// src/engine/state.rs

//! Pure per-instance state machine.
//!
//! [`InstanceState`] consumes [`InstanceEvent`]s and returns an [`Effect`]
//! telling the IO shell whether to stop scanning stdout. It has no channels,
//! no Tokio types and performs no IO, so every transition can be unit tested
//! without spawning processes.
//!
//! Only the instance's own controller applies events, which makes it the
//! single writer; everyone else sees [`UnitSnapshot`] copies.
//!
//! ```text
//! Queued -> Starting -> Running(Building) -> Running(Ready) | Completed
//!              |              |                    |
//!              +--------------+--------------------+--> Completed | Exited(code)
//! Exited(code) -> Retrying -> (next attempt starts at Starting)
//! Starting -> FailedToStart
//! ```

use chrono::{DateTime, Local};

use crate::engine::{Readiness, UnitSnapshot, UnitStatus};
use crate::unit::{UnitDescriptor, UnitName};

/// Something that happened to the instance's process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    Spawned {
        pid: Option<u32>,
        at: DateTime<Local>,
    },
    SpawnFailed(String),
    /// One line of stdout.
    Line(String),
    /// The stdout scan window elapsed without a marker match.
    PumpCutoff,
    /// The process exited on its own. `None` means killed by a signal.
    Exited(Option<i32>),
    /// The process tree was force-killed by run cancellation.
    Killed(Option<i32>),
    RestartScheduled,
    /// The run was cancelled while waiting to restart.
    RestartAbandoned,
}

/// What the IO shell should do after an event was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Stop forwarding stdout lines for this instance.
    StopPump,
}

/// Mutable state of one attempt at running a unit.
#[derive(Debug, Clone)]
pub struct InstanceState {
    name: UnitName,
    one_shot: bool,
    marker: Option<String>,
    status: UnitStatus,
    last_output_line: Option<String>,
    exit_code: Option<i32>,
    started_at: Option<DateTime<Local>>,
    retry_count: u32,
    queued_for_restart: bool,
    pid: Option<u32>,
    killed: bool,
    pump_open: bool,
    status_before_retry: Option<UnitStatus>,
}

impl InstanceState {
    /// Fresh state for attempt number `retry_count` (0 for the first run).
    pub fn for_attempt(unit: &UnitDescriptor, retry_count: u32) -> Self {
        Self {
            name: unit.name.clone(),
            one_shot: unit.one_shot,
            marker: unit.readiness_marker.clone().filter(|m| !m.is_empty()),
            status: UnitStatus::Starting,
            last_output_line: None,
            exit_code: None,
            started_at: None,
            retry_count,
            queued_for_restart: false,
            pid: None,
            killed: false,
            pump_open: false,
            status_before_retry: None,
        }
    }

    /// State of a batch unit that has not started yet.
    pub fn queued(unit: &UnitDescriptor) -> Self {
        let mut state = Self::for_attempt(unit, 0);
        state.status = UnitStatus::Queued;
        state
    }

    pub fn status(&self) -> &UnitStatus {
        &self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn killed(&self) -> bool {
        self.killed
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether stdout lines should still be forwarded to [`Self::apply`].
    pub fn pump_open(&self) -> bool {
        self.pump_open
    }

    pub fn apply(&mut self, event: InstanceEvent) -> Effect {
        match event {
            InstanceEvent::Spawned { pid, at } => {
                self.status = UnitStatus::Starting;
                self.pid = pid;
                self.started_at = Some(at);
                self.pump_open = true;
                Effect::None
            }
            InstanceEvent::SpawnFailed(reason) => {
                self.status = UnitStatus::FailedToStart(reason);
                self.pump_open = false;
                Effect::StopPump
            }
            InstanceEvent::Line(line) => self.on_line(line),
            InstanceEvent::PumpCutoff => {
                if self.pump_open {
                    self.pump_open = false;
                    Effect::StopPump
                } else {
                    Effect::None
                }
            }
            InstanceEvent::Exited(code) => {
                let code = code.unwrap_or(-1);
                self.exit_code = Some(code);
                self.pump_open = false;
                self.status = if code == 0 {
                    UnitStatus::Completed
                } else {
                    UnitStatus::Exited(code)
                };
                Effect::StopPump
            }
            InstanceEvent::Killed(code) => {
                self.killed = true;
                self.exit_code = code;
                self.pump_open = false;
                Effect::StopPump
            }
            InstanceEvent::RestartScheduled => {
                if matches!(self.status, UnitStatus::Exited(_)) {
                    let previous = std::mem::replace(&mut self.status, UnitStatus::Retrying);
                    self.status_before_retry = Some(previous);
                    self.queued_for_restart = true;
                }
                Effect::None
            }
            InstanceEvent::RestartAbandoned => {
                if let Some(previous) = self.status_before_retry.take() {
                    self.status = previous;
                }
                self.queued_for_restart = false;
                Effect::None
            }
        }
    }

    fn on_line(&mut self, line: String) -> Effect {
        let scanning = self.pump_open
            && matches!(self.status, UnitStatus::Starting | UnitStatus::Running(_));
        if !scanning {
            return Effect::None;
        }

        let matched = self
            .marker
            .as_deref()
            .is_some_and(|marker| line.contains(marker));
        self.last_output_line = Some(line);

        if matched {
            self.status = if self.one_shot {
                UnitStatus::Completed
            } else {
                UnitStatus::Running(Readiness::Ready)
            };
            self.pump_open = false;
            Effect::StopPump
        } else {
            self.status = UnitStatus::Running(Readiness::Building);
            Effect::None
        }
    }

    pub fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            name: self.name.clone(),
            status: self.status.clone(),
            last_output_line: self.last_output_line.clone(),
            exit_code: self.exit_code,
            started_at: self.started_at,
            retry_count: self.retry_count,
            queued_for_restart: self.queued_for_restart,
            pid: self.pid,
            killed: self.killed,
            one_shot: self.one_shot,
        }
    }
}
