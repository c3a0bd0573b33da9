// src/exec/command.rs

//! Building the OS command for a unit.

use std::process::Stdio;

use tokio::process::Command;
use tracing::warn;

use crate::exec::tree_kill;
use crate::unit::{UnitDescriptor, env};

/// Build a ready-to-spawn command for `unit`.
///
/// - `shell = false`: `command` is exec'd directly with `args` as its
///   argument list.
/// - `shell = true`: `command args` is handed to `sh -c` / `cmd /C`.
///
/// Environment values are placeholder-resolved against the unit's working
/// directory. stdout/stderr are piped, stdin is closed, and the child is
/// placed in its own process tree so it can be killed as a whole.
pub fn build_command(unit: &UnitDescriptor) -> Command {
    let mut cmd = if unit.shell {
        shell_command(&unit.command_line())
    } else {
        let mut c = Command::new(&unit.command);
        push_args(&mut c, unit);
        c
    };

    if let Some(dir) = &unit.working_dir {
        cmd.current_dir(dir);
    }

    let resolved = env::resolve_env(&unit.env, &unit.effective_dir());
    for (key, value) in resolved.iter() {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tree_kill::isolate(&mut cmd);
    cmd
}

/// Build a shell command appropriate for the platform.
fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

/// Append the opaque argument string to a direct-exec command.
///
/// POSIX: split with shell quoting rules (quotes group words, backslash
/// escapes). Unbalanced quotes fall back to plain whitespace splitting.
#[cfg(unix)]
fn push_args(cmd: &mut Command, unit: &UnitDescriptor) {
    cmd.args(split_args(&unit.args).unwrap_or_else(|e| {
        warn!(unit = %unit.name, error = %e, "could not parse args; splitting on whitespace");
        unit.args.split_whitespace().map(str::to_string).collect()
    }));
}

/// Windows: the string is handed to the program verbatim, which parses its
/// own command line.
#[cfg(windows)]
fn push_args(cmd: &mut Command, unit: &UnitDescriptor) {
    if !unit.args.trim().is_empty() {
        cmd.raw_arg(&unit.args);
    }
}

/// Split an argument string the way a POSIX shell would, without expansion.
pub fn split_args(args: &str) -> Result<Vec<String>, shell_words::ParseError> {
    shell_words::split(args)
}
