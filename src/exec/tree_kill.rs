// src/exec/tree_kill.rs

//! Whole-process-tree termination.
//!
//! Every unit process is started in its own process tree ([`isolate`]) so
//! that cancellation can take down the process *and* everything it spawned:
//!
//! - POSIX: the child leads a new process group; the group is sent
//!   `SIGKILL` with `killpg`, then we wait for the leader and poll until the
//!   group is empty.
//! - Windows: the child gets a new process group; `taskkill /T /F` walks and
//!   kills the tree, then we wait for the child.
//!
//! There is no grace period: termination is forced.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Upper bound on waiting for descendants to disappear after the kill.
pub const GROUP_EXIT_WAIT: Duration = Duration::from_secs(1);

/// Put the command's process into its own tree.
pub fn isolate(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
}

/// Handle on the process tree rooted at a spawned child.
///
/// Captured right after spawning, while the root pid is still known; the
/// tree stays addressable after the root itself has been reaped.
#[derive(Debug, Clone, Copy)]
pub struct ProcessTree {
    root: Option<u32>,
}

impl ProcessTree {
    pub fn of(child: &Child) -> Self {
        Self { root: child.id() }
    }

    pub fn root_pid(&self) -> Option<u32> {
        self.root
    }

    /// Kill the whole tree and wait until the OS confirms the root exited.
    pub async fn kill(&self, child: &mut Child) -> io::Result<ExitStatus> {
        debug!(pid = ?self.root, "killing process tree");
        self.signal_tree();
        if let Err(e) = child.start_kill() {
            // Already exited: wait() below returns the cached status.
            debug!(pid = ?self.root, error = %e, "direct kill of root process failed");
        }
        let status = child.wait().await?;
        self.wait_tree_gone().await;
        Ok(status)
    }

    /// Kill anything the root left behind after exiting on its own.
    pub async fn reap_leftovers(&self) {
        #[cfg(unix)]
        {
            if self.tree_alive() {
                debug!(pid = ?self.root, "root exited; killing leftover descendants");
                self.signal_tree();
                self.wait_tree_gone().await;
            }
        }
    }

    #[cfg(unix)]
    fn signal_tree(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pid) = self.root else { return };
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pid, error = %e, "killpg failed"),
        }
    }

    #[cfg(windows)]
    fn signal_tree(&self) {
        let Some(pid) = self.root else { return };
        let result = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        if let Err(e) = result {
            warn!(pid, error = %e, "taskkill failed");
        }
    }

    #[cfg(unix)]
    fn tree_alive(&self) -> bool {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let Some(pid) = self.root else { return false };
        if killpg(Pid::from_raw(pid as i32), None).is_err() {
            return false;
        }
        #[cfg(target_os = "linux")]
        {
            if let Some(live) = linux::group_has_live_member(pid) {
                return live;
            }
        }
        true
    }

    #[cfg(windows)]
    fn tree_alive(&self) -> bool {
        false
    }

    async fn wait_tree_gone(&self) {
        let deadline = tokio::time::Instant::now() + GROUP_EXIT_WAIT;
        while self.tree_alive() {
            if tokio::time::Instant::now() >= deadline {
                debug!(pid = ?self.root, "process tree still visible after kill");
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Group membership from `/proc`. Zombies that nobody reaps still answer
/// `killpg(pgid, 0)`, so they are filtered out here.
#[cfg(target_os = "linux")]
mod linux {
    use std::fs;

    /// `None` if `/proc` could not be read.
    pub(super) fn group_has_live_member(pgid: u32) -> Option<bool> {
        let entries = fs::read_dir("/proc").ok()?;
        let live = entries
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|e| fs::read_to_string(e.path().join("stat")).ok())
            .any(|stat| live_member_of(&stat, pgid));
        Some(live)
    }

    /// Parse one `/proc/<pid>/stat` line: state is field 3, pgrp field 5.
    fn live_member_of(stat: &str, pgid: u32) -> bool {
        let Some((_, rest)) = stat.rsplit_once(')') else {
            return false;
        };
        let mut fields = rest.split_whitespace();
        let state = fields.next();
        let pgrp = fields.nth(1).and_then(|f| f.parse::<u32>().ok());
        pgrp == Some(pgid) && state != Some("Z")
    }

}
