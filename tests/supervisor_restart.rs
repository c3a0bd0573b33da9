#![cfg(unix)]

mod common;
use crate::common::*;

use std::error::Error;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use procherd::engine::{PumpLimits, UnitOutcome, UnitStatus};
use procherd::supervisor::{RestartPolicy, Supervisor, SupervisorOptions};

type TestResult = Result<(), Box<dyn Error>>;

fn restarting(max_retries: Option<u32>) -> SupervisorOptions {
    SupervisorOptions {
        tick: Duration::from_millis(5),
        restart: RestartPolicy {
            enabled: true,
            delay: Duration::from_millis(60),
            max_retries,
        },
        limits: PumpLimits::default(),
    }
}

/// Distinct retry counts in the order the sink saw them.
fn observed_retries(sink: &RecordingSink, name: &str) -> Vec<u32> {
    let mut seen: Vec<u32> = Vec::new();
    for frame in sink.frames() {
        if let Some(snap) = frame.iter().find(|s| s.name == name) {
            if seen.last() != Some(&snap.retry_count) {
                seen.push(snap.retry_count);
            }
        }
    }
    seen
}

#[tokio::test]
async fn crashed_unit_is_retried_until_the_cap() -> TestResult {
    init_tracing();

    let units = vec![sh_unit("crashy", "echo boom; exit 3").one_shot(true)];
    let sink = RecordingSink::new();

    let report = with_timeout(Supervisor::new(restarting(Some(3))).run(
        units,
        &CancellationToken::new(),
        sink.clone(),
    ))
    .await?;

    let snap = report.snapshot("crashy").unwrap();
    assert_eq!(snap.status, UnitStatus::Exited(3));
    assert_eq!(snap.retry_count, 3);
    assert!(!snap.queued_for_restart);
    assert_eq!(report.outcome("crashy"), Some(UnitOutcome::Failed(3)));

    // Each restart bumps the counter by exactly one.
    let retries = observed_retries(&sink, "crashy");
    assert_eq!(retries.first(), Some(&0));
    assert_eq!(retries.last(), Some(&3));
    assert!(retries.windows(2).all(|w| w[1] == w[0] + 1), "got {retries:?}");

    assert!(sink.status_history("crashy").contains(&"retrying".to_string()));
    Ok(())
}

#[tokio::test]
async fn clean_exit_is_not_restarted() -> TestResult {
    init_tracing();

    let units = vec![sh_unit("ok", "exit 0").one_shot(true)];
    let report = with_timeout(Supervisor::new(restarting(None)).run(
        units,
        &CancellationToken::new(),
        RecordingSink::new(),
    ))
    .await?;

    let snap = report.snapshot("ok").unwrap();
    assert_eq!(snap.status, UnitStatus::Completed);
    assert_eq!(snap.retry_count, 0);
    Ok(())
}

#[tokio::test]
async fn unit_override_disables_restart() -> TestResult {
    init_tracing();

    let units = vec![
        sh_unit("opted_out", "exit 1")
            .one_shot(true)
            .restart_on_crash(false),
    ];
    let report = with_timeout(Supervisor::new(restarting(None)).run(
        units,
        &CancellationToken::new(),
        RecordingSink::new(),
    ))
    .await?;

    assert_eq!(report.snapshot("opted_out").unwrap().retry_count, 0);
    assert_eq!(report.outcome("opted_out"), Some(UnitOutcome::Failed(1)));
    Ok(())
}

#[tokio::test]
async fn cancelling_during_restart_delay_stops_retrying() -> TestResult {
    init_tracing();

    let mut options = restarting(None);
    options.restart.delay = Duration::from_secs(30);

    let units = vec![sh_unit("looping", "exit 7")];
    let sink = RecordingSink::new();
    let cancel = CancellationToken::new();
    let run = {
        let sink = sink.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { Supervisor::new(options).run(units, &cancel, sink).await })
    };

    with_timeout(wait_for_unit(&sink, "looping", |s| s.status == UnitStatus::Retrying)).await;
    cancel.cancel();

    let report = with_timeout(run).await??;
    let snap = report.snapshot("looping").unwrap();
    assert_eq!(snap.status, UnitStatus::Exited(7));
    assert!(!snap.queued_for_restart);
    assert_eq!(snap.retry_count, 0);
    Ok(())
}
