#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use procherd::engine::UnitSnapshot;

pub use procherd_test_utils::builders::{ConfigFileBuilder, UnitConfigBuilder, sh_unit};
pub use procherd_test_utils::{RecordingSink, init_tracing, with_timeout};
#[cfg(unix)]
pub use procherd_test_utils::{process_alive, wait_until_dead};

/// Executable that does not exist anywhere.
pub const MISSING_EXE: &str = "/nonexistent/procherd-missing-binary";

/// Poll the sink until `name`'s latest snapshot satisfies `pred`.
pub async fn wait_for_unit<F>(sink: &RecordingSink, name: &str, pred: F) -> UnitSnapshot
where
    F: Fn(&UnitSnapshot) -> bool,
{
    loop {
        if let Some(snap) = sink.latest(name) {
            if pred(&snap) {
                return snap;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Read a pid that a test script wrote to `path`, waiting for it to appear.
pub async fn read_pid_file(path: &Path) -> u32 {
    loop {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn pid_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.pid"))
}
