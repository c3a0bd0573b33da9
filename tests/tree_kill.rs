#![cfg(unix)]

mod common;
use crate::common::*;

use std::error::Error;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use procherd::engine::{Readiness, UnitStatus};
use procherd::exec::{ProcessTree, build_command};
use procherd::supervisor::{Supervisor, SupervisorOptions};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn cancellation_kills_grandchildren() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let pid_path = pid_file(dir.path(), "grandchild");

    let script = format!(
        "sleep 30 & echo $! > '{}'; echo READY; wait",
        pid_path.display()
    );
    let units = vec![sh_unit("parent", &script).readiness_marker("READY")];

    let sink = RecordingSink::new();
    let cancel = CancellationToken::new();
    let options = SupervisorOptions {
        tick: Duration::from_millis(10),
        ..SupervisorOptions::default()
    };
    let run = {
        let sink = sink.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { Supervisor::new(options).run(units, &cancel, sink).await })
    };

    let parent = with_timeout(wait_for_unit(&sink, "parent", |s| {
        s.status == UnitStatus::Running(Readiness::Ready)
    }))
    .await;
    let grandchild = with_timeout(read_pid_file(&pid_path)).await;
    assert!(process_alive(grandchild));

    cancel.cancel();
    let report = with_timeout(run).await??;
    assert!(report.snapshot("parent").unwrap().killed);

    // Nothing of the tree survives once the run has returned.
    assert!(!process_alive(parent.pid.unwrap()));
    assert!(wait_until_dead(grandchild, Duration::from_secs(1)).await);
    Ok(())
}

#[tokio::test]
async fn kill_waits_for_the_root_process() -> TestResult {
    init_tracing();

    let unit = sh_unit("sleeper", "sleep 30");
    let mut child = build_command(&unit).spawn()?;
    let tree = ProcessTree::of(&child);
    let pid = tree.root_pid().unwrap();

    let status = with_timeout(tree.kill(&mut child)).await?;
    assert!(!status.success());
    assert!(!process_alive(pid));
    Ok(())
}

#[tokio::test]
async fn leftovers_of_a_finished_root_are_reaped() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let pid_path = pid_file(dir.path(), "orphan");

    let script = format!("sleep 30 & echo $! > '{}'; exit 0", pid_path.display());
    let mut child = build_command(&sh_unit("leaver", &script)).spawn()?;
    let tree = ProcessTree::of(&child);

    let status = with_timeout(child.wait()).await?;
    assert!(status.success());
    let orphan = with_timeout(read_pid_file(&pid_path)).await;
    assert!(process_alive(orphan));

    with_timeout(tree.reap_leftovers()).await;
    assert!(wait_until_dead(orphan, Duration::from_secs(1)).await);
    Ok(())
}

#[tokio::test]
async fn supervised_unit_leftovers_die_without_waiting_for_the_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let pid_path = pid_file(dir.path(), "orphan");

    let install = format!("sleep 30 & echo $! > '{}'; exit 0", pid_path.display());
    let units = vec![
        sh_unit("server", "echo READY; sleep 30").readiness_marker("READY"),
        sh_unit("install", &install).one_shot(true),
    ];

    let sink = RecordingSink::new();
    let cancel = CancellationToken::new();
    let options = SupervisorOptions {
        tick: Duration::from_millis(10),
        ..SupervisorOptions::default()
    };
    let run = {
        let sink = sink.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { Supervisor::new(options).run(units, &cancel, sink).await })
    };

    with_timeout(wait_for_unit(&sink, "install", |s| s.status == UnitStatus::Completed)).await;
    let orphan = with_timeout(read_pid_file(&pid_path)).await;

    // The run is unbounded and still going; the orphan must not outlive it.
    assert!(wait_until_dead(orphan, Duration::from_secs(2)).await);
    assert!(!run.is_finished());

    cancel.cancel();
    with_timeout(run).await??;
    Ok(())
}
