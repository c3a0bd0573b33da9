// src/supervisor/mod.rs

//! Concurrent execution strategy.
//!
//! Every unit is started at once, each driven by its own task that runs
//! attempts through a [`ProcessController`] and applies the
//! [`RestartPolicy`] between them. The supervisor itself only polls: on a
//! fixed tick it copies every unit's latest snapshot and hands the set to the
//! [`StatusSink`].
//!
//! The run ends when `cancel` fires or, if every unit is one-shot, when all
//! of them reached a terminal state. Either way the run-wide token is then
//! cancelled and each unit task kills its process tree and waits for it.
//! A unit whose root exits on its own has its leftover descendants killed
//! right away, not at the end of the run.

pub mod restart;

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{InstanceEvent, InstanceState, PumpLimits, UnitOutcome, UnitSnapshot};
use crate::errors::Result;
use crate::exec::controller::ProcessController;
use crate::render::StatusSink;
use crate::unit::{UnitDescriptor, UnitName, ensure_unique_names, expand_companions};

pub use restart::RestartPolicy;

/// Default render interval for interactive use.
pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

/// Explicit settings for a supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub tick: Duration,
    pub restart: RestartPolicy,
    pub limits: PumpLimits,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            restart: RestartPolicy::default(),
            limits: PumpLimits::default(),
        }
    }
}

/// Final state of every unit when a supervised run returned.
#[derive(Debug, Clone)]
pub struct SupervisedReport {
    units: Vec<UnitSnapshot>,
    cancelled: bool,
}

impl SupervisedReport {
    /// Snapshots in unit order (companions follow their primary).
    pub fn snapshots(&self) -> &[UnitSnapshot] {
        &self.units
    }

    pub fn snapshot(&self, name: &str) -> Option<&UnitSnapshot> {
        self.units.iter().find(|s| s.name == name)
    }

    pub fn outcome(&self, name: &str) -> Option<UnitOutcome> {
        self.snapshot(name).map(UnitOutcome::from_snapshot)
    }

    pub fn outcomes(&self) -> IndexMap<UnitName, UnitOutcome> {
        self.units
            .iter()
            .map(|s| (s.name.clone(), UnitOutcome::from_snapshot(s)))
            .collect()
    }

    /// The run ended because the caller cancelled it.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }
}

#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    options: SupervisorOptions,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Run all units concurrently until cancelled (or, for all-one-shot
    /// sets, until every unit finished).
    ///
    /// Per-unit failures end up in the report. The only error is a contract
    /// violation such as a duplicate unit name, detected before anything is
    /// spawned.
    pub async fn run<S: StatusSink>(
        &self,
        units: Vec<UnitDescriptor>,
        cancel: &CancellationToken,
        mut sink: S,
    ) -> Result<SupervisedReport> {
        let units = expand_companions(units);
        ensure_unique_names(&units)?;
        let units: Vec<Arc<UnitDescriptor>> = units.into_iter().map(Arc::new).collect();

        let bounded = units.iter().all(|u| u.one_shot);
        info!(units = units.len(), bounded, "supervised run starting");

        let run_token = cancel.child_token();
        let mut receivers = Vec::with_capacity(units.len());
        let mut tasks = JoinSet::new();

        for unit in &units {
            let (tx, rx) = watch::channel(InstanceState::for_attempt(unit, 0).snapshot());
            receivers.push(rx);
            tasks.spawn(supervise_unit(
                Arc::clone(unit),
                self.options.restart,
                self.options.limits,
                run_token.clone(),
                tx,
            ));
        }

        let mut ticker = interval(self.options.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = run_token.cancelled() => {
                    info!("cancellation requested; stopping all units");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshots = collect_snapshots(&receivers);
                    sink.on_snapshot(&snapshots);

                    if bounded && self.all_settled(&units, &snapshots) {
                        info!("all units finished");
                        break;
                    }
                }
            }
        }

        let cancelled = cancel.is_cancelled();
        run_token.cancel();

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "unit supervision task failed");
            }
        }

        let snapshots = collect_snapshots(&receivers);
        sink.on_snapshot(&snapshots);
        info!(cancelled, "supervised run finished");

        Ok(SupervisedReport {
            units: snapshots,
            cancelled,
        })
    }

    /// Every unit is terminal and none is about to be restarted.
    fn all_settled(&self, units: &[Arc<UnitDescriptor>], snapshots: &[UnitSnapshot]) -> bool {
        units.iter().zip(snapshots).all(|(unit, snap)| {
            snap.status.is_terminal() && !self.options.restart.should_restart(unit, snap, false)
        })
    }
}

fn collect_snapshots(receivers: &[watch::Receiver<UnitSnapshot>]) -> Vec<UnitSnapshot> {
    receivers.iter().map(|rx| rx.borrow().clone()).collect()
}

/// Drive one unit through as many attempts as the restart policy allows.
///
/// Each attempt's process group is cleaned up as soon as its root is gone,
/// whether or not another attempt follows.
async fn supervise_unit(
    unit: Arc<UnitDescriptor>,
    policy: RestartPolicy,
    limits: PumpLimits,
    cancel: CancellationToken,
    publisher: watch::Sender<UnitSnapshot>,
) {
    let mut retry_count = 0;

    loop {
        let attempt = ProcessController::new(&unit, retry_count, &publisher, limits)
            .run(&cancel)
            .await;
        let mut state = attempt.state;
        if let Some(tree) = attempt.tree {
            tree.reap_leftovers().await;
        }

        if !policy.should_restart(&unit, &state.snapshot(), cancel.is_cancelled()) {
            debug!(unit = %unit.name, status = %state.status(), "unit supervision finished");
            return;
        }

        state.apply(InstanceEvent::RestartScheduled);
        publisher.send_replace(state.snapshot());
        warn!(
            unit = %unit.name,
            exit_code = ?state.exit_code(),
            next_retry = retry_count + 1,
            delay_ms = policy.delay.as_millis() as u64,
            "unit crashed; scheduling restart"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                state.apply(InstanceEvent::RestartAbandoned);
                publisher.send_replace(state.snapshot());
                return;
            }
            _ = sleep(policy.delay) => {}
        }

        retry_count = state.retry_count() + 1;
    }
}
