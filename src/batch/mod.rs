// src/batch/mod.rs

//! Sequential execution strategy.
//!
//! Units run one at a time, in input order, each to completion. Output is
//! buffered rather than scanned live; success means exit code 0. A failing
//! unit does not stop the batch. Cancellation stops iteration and kills the
//! unit that is currently running (whole process tree) before returning.

use std::time::{Duration, Instant};

use chrono::Local;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{InstanceEvent, InstanceState, UnitSnapshot};
use crate::errors::Result;
use crate::exec::command::build_command;
use crate::exec::pump::spawn_collector;
use crate::exec::tree_kill::ProcessTree;
use crate::render::StatusSink;
use crate::unit::{UnitDescriptor, UnitName, ensure_unique_names, expand_companions};

/// How long to keep collecting output once a unit's process tree is gone.
pub const DEFAULT_OUTPUT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub output_grace: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_grace: DEFAULT_OUTPUT_GRACE,
        }
    }
}

/// Result of running one unit to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchUnitResult {
    pub name: UnitName,
    /// `None` if the process never started or died from a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Combined stdout and stderr lines.
    pub output: Vec<String>,
    pub duration: Duration,
    pub spawn_error: Option<String>,
    /// Killed because the batch was cancelled.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    /// Units in the batch, including any that never ran.
    pub total: usize,
    /// One entry per unit that was started, in input order.
    pub results: Vec<BatchUnitResult>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }

    pub fn failed(&self) -> impl Iterator<Item = &BatchUnitResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchExecutor {
    options: BatchOptions,
}

impl BatchExecutor {
    pub fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    /// Run `units` sequentially. The only error is a contract violation
    /// (duplicate unit names), detected before anything runs.
    pub async fn run<S: StatusSink>(
        &self,
        units: Vec<UnitDescriptor>,
        cancel: &CancellationToken,
        mut sink: S,
    ) -> Result<BatchReport> {
        let units = expand_companions(units);
        ensure_unique_names(&units)?;

        let total = units.len();
        let mut states: Vec<InstanceState> = units.iter().map(InstanceState::queued).collect();
        let mut results = Vec::with_capacity(total);
        let mut succeeded = 0;

        info!(units = total, "batch run starting");
        sink.on_snapshot(&snapshots(&states));

        for (idx, unit) in units.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("batch cancelled; skipping remaining units");
                break;
            }

            let result = self.run_unit(unit, &mut states[idx], cancel).await;
            if result.success {
                succeeded += 1;
            }
            sink.on_snapshot(&snapshots(&states));
            sink.on_unit_finished(&result);

            let stop = result.cancelled;
            results.push(result);
            if stop {
                break;
            }
        }

        let report = BatchReport {
            succeeded,
            total,
            results,
            cancelled: cancel.is_cancelled(),
        };
        info!(
            succeeded = report.succeeded,
            total = report.total,
            cancelled = report.cancelled,
            "batch run finished"
        );
        sink.on_batch_summary(&report);
        Ok(report)
    }

    async fn run_unit(
        &self,
        unit: &UnitDescriptor,
        state: &mut InstanceState,
        cancel: &CancellationToken,
    ) -> BatchUnitResult {
        let started = Instant::now();
        info!(unit = %unit.name, cmd = %unit.command_line(), "running batch unit");

        let mut child = match build_command(unit).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(unit = %unit.name, error = %e, "failed to spawn unit process");
                let reason = format!("{}: {e}", unit.command);
                state.apply(InstanceEvent::SpawnFailed(reason.clone()));
                return BatchUnitResult {
                    name: unit.name.clone(),
                    exit_code: None,
                    success: false,
                    output: Vec::new(),
                    duration: started.elapsed(),
                    spawn_error: Some(reason),
                    cancelled: false,
                };
            }
        };

        let tree = ProcessTree::of(&child);
        state.apply(InstanceEvent::Spawned {
            pid: tree.root_pid(),
            at: Local::now(),
        });

        let io_token = CancellationToken::new();
        let mut collector = spawn_collector(child.stdout.take(), child.stderr.take(), io_token.clone());

        let (exit_code, cancelled) = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => (status.code(), false),
                Err(e) => {
                    warn!(unit = %unit.name, error = %e, "waiting for unit process failed");
                    (None, false)
                }
            },
            _ = cancel.cancelled() => {
                info!(unit = %unit.name, "batch cancelled; killing running unit");
                match tree.kill(&mut child).await {
                    Ok(status) => (status.code(), true),
                    Err(e) => {
                        warn!(unit = %unit.name, error = %e, "waiting for killed process failed");
                        (None, true)
                    }
                }
            }
        };
        tree.reap_leftovers().await;

        let output = match timeout(self.options.output_grace, &mut collector).await {
            Ok(Ok(lines)) => lines,
            Ok(Err(e)) => {
                warn!(unit = %unit.name, error = %e, "output collector failed");
                Vec::new()
            }
            Err(_) => {
                debug!(unit = %unit.name, "output still open after grace period; truncating");
                io_token.cancel();
                collector.await.unwrap_or_default()
            }
        };

        if let Some(last) = output.last() {
            state.apply(InstanceEvent::Line(last.clone()));
        }
        state.apply(if cancelled {
            InstanceEvent::Killed(exit_code)
        } else {
            InstanceEvent::Exited(exit_code)
        });

        let success = !cancelled && exit_code == Some(0);
        info!(unit = %unit.name, exit_code = ?exit_code, success, "batch unit finished");

        BatchUnitResult {
            name: unit.name.clone(),
            exit_code,
            success,
            output,
            duration: started.elapsed(),
            spawn_error: None,
            cancelled,
        }
    }
}

fn snapshots(states: &[InstanceState]) -> Vec<UnitSnapshot> {
    states.iter().map(InstanceState::snapshot).collect()
}
