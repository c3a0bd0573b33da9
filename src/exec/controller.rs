// src/exec/controller.rs

//! Process lifecycle controller: runs one attempt of one unit.
//!
//! The controller owns the child process handle and the attempt's
//! [`InstanceState`]. It is the only writer of that state: stdout lines, the
//! scan cutoff, process exit and cancellation all arrive in one `select!`
//! loop and are applied in order. Every change is published as a fresh
//! [`UnitSnapshot`] on a `watch` channel for the render loop.

use std::time::Duration;

use chrono::Local;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{
    Effect, InstanceEvent, InstanceState, PumpLimits, Readiness, UnitSnapshot, UnitStatus,
};
use crate::exec::command::build_command;
use crate::exec::pump::{spawn_drain, spawn_line_pump};
use crate::exec::tree_kill::ProcessTree;
use crate::unit::UnitDescriptor;

const LINE_CHANNEL_CAPACITY: usize = 64;

/// How long buffered stdout is still scanned after the process exited.
const EXIT_DRAIN: Duration = Duration::from_millis(200);

/// What an attempt leaves behind.
#[derive(Debug)]
pub struct AttemptResult {
    pub state: InstanceState,
    /// The attempt's process tree, if the process was spawned. Descendants
    /// may still be alive; see [`ProcessTree::reap_leftovers`].
    pub tree: Option<ProcessTree>,
}

pub struct ProcessController<'a> {
    unit: &'a UnitDescriptor,
    state: InstanceState,
    publisher: &'a watch::Sender<UnitSnapshot>,
    limits: PumpLimits,
}

impl<'a> ProcessController<'a> {
    pub fn new(
        unit: &'a UnitDescriptor,
        retry_count: u32,
        publisher: &'a watch::Sender<UnitSnapshot>,
        limits: PumpLimits,
    ) -> Self {
        Self {
            unit,
            state: InstanceState::for_attempt(unit, retry_count),
            publisher,
            limits,
        }
    }

    fn apply(&mut self, event: InstanceEvent) -> Effect {
        let effect = self.state.apply(event);
        self.publisher.send_replace(self.state.snapshot());
        effect
    }

    /// Spawn the process and drive it until it exits or `cancel` fires.
    ///
    /// On cancellation the whole process tree is killed and the root is
    /// awaited before this returns. Spawn failures are recorded in the
    /// returned state, never raised.
    pub async fn run(mut self, cancel: &CancellationToken) -> AttemptResult {
        let name = self.unit.name.clone();
        let retry = self.state.retry_count();
        self.publisher.send_replace(self.state.snapshot());

        info!(
            unit = %name,
            retry,
            cmd = %self.unit.command_line(),
            "starting unit process"
        );

        let mut child = match build_command(self.unit).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(unit = %name, error = %e, "failed to spawn unit process");
                self.apply(InstanceEvent::SpawnFailed(format!(
                    "{}: {e}",
                    self.unit.command
                )));
                return AttemptResult {
                    state: self.state,
                    tree: None,
                };
            }
        };

        let tree = ProcessTree::of(&child);
        self.apply(InstanceEvent::Spawned {
            pid: tree.root_pid(),
            at: Local::now(),
        });

        let pump_token = cancel.child_token();
        let _pump_guard = pump_token.clone().drop_guard();
        let mut lines = self.attach_pumps(&mut child, &pump_token);

        let cutoff = sleep(self.limits.cutoff_for(self.unit.one_shot));
        tokio::pin!(cutoff);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let code = match tree.kill(&mut child).await {
                        Ok(status) => status.code(),
                        Err(e) => {
                            warn!(unit = %name, error = %e, "waiting for killed process failed");
                            None
                        }
                    };
                    info!(unit = %name, pid = ?tree.root_pid(), "unit process tree killed");
                    self.apply(InstanceEvent::Killed(code));
                    break;
                }

                status = child.wait() => {
                    let code = match status {
                        Ok(status) => status.code(),
                        Err(e) => {
                            warn!(unit = %name, error = %e, "waiting for unit process failed");
                            None
                        }
                    };
                    self.drain_after_exit(&mut lines).await;
                    self.apply(InstanceEvent::Exited(code));
                    info!(
                        unit = %name,
                        retry,
                        exit_code = ?code,
                        status = %self.state.status(),
                        "unit process exited"
                    );
                    break;
                }

                line = recv_line(&mut lines), if lines.is_some() => match line {
                    Some(line) => {
                        if self.apply(InstanceEvent::Line(line)) == Effect::StopPump {
                            self.log_marker_seen();
                            lines = None;
                        }
                    }
                    None => lines = None,
                },

                _ = &mut cutoff, if lines.is_some() => {
                    debug!(
                        unit = %name,
                        status = %self.state.status(),
                        "readiness marker not seen before cutoff; stopping output scan"
                    );
                    self.apply(InstanceEvent::PumpCutoff);
                    lines = None;
                }
            }
        }

        AttemptResult {
            state: self.state,
            tree: Some(tree),
        }
    }

    fn attach_pumps(
        &self,
        child: &mut Child,
        token: &CancellationToken,
    ) -> Option<mpsc::Receiver<String>> {
        if let Some(stderr) = child.stderr.take() {
            spawn_drain(self.unit.name.clone(), stderr, token.clone());
        }

        let stdout = child.stdout.take()?;
        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        spawn_line_pump(self.unit.name.clone(), stdout, tx, token.clone());
        Some(rx)
    }

    /// Apply stdout lines that were already produced when the process exited.
    async fn drain_after_exit(&mut self, lines: &mut Option<mpsc::Receiver<String>>) {
        let Some(rx) = lines.as_mut() else { return };
        let deadline = Instant::now() + EXIT_DRAIN;

        while let Ok(Some(line)) = timeout_at(deadline, rx.recv()).await {
            if self.apply(InstanceEvent::Line(line)) == Effect::StopPump {
                self.log_marker_seen();
                break;
            }
        }
        *lines = None;
    }

    fn log_marker_seen(&self) {
        match self.state.status() {
            UnitStatus::Running(Readiness::Ready) => {
                info!(unit = %self.unit.name, "unit is ready")
            }
            UnitStatus::Completed => {
                info!(unit = %self.unit.name, "unit completed (marker seen)")
            }
            _ => {}
        }
    }
}

async fn recv_line(lines: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match lines {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
