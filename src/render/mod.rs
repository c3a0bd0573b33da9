// src/render/mod.rs

//! Status output.
//!
//! Strategies never print directly. They hand snapshots and results to a
//! [`StatusSink`] chosen by the host, so the CLI decides where and how status
//! is shown and tests can record it instead.
//!
//! - [`table`] holds the pure snapshot-to-text renderer.
//! - [`TerminalSink`] writes tables and batch outcomes to any `Write`.

pub mod table;

use std::io::{self, Write};
use std::time::Duration;

use tracing::warn;

use crate::batch::{BatchReport, BatchUnitResult};
use crate::engine::UnitSnapshot;

pub use table::render_table;

/// Receiver for status updates produced by an orchestration run.
///
/// Implementations must not block for long: they are called from the render
/// loop.
pub trait StatusSink: Send {
    /// Called on every render tick (supervised) or after each unit (batch).
    fn on_snapshot(&mut self, snapshots: &[UnitSnapshot]);

    /// Batch mode: one unit finished.
    fn on_unit_finished(&mut self, _result: &BatchUnitResult) {}

    /// Batch mode: the run finished.
    fn on_batch_summary(&mut self, _report: &BatchReport) {}
}

impl<S: StatusSink + ?Sized> StatusSink for &mut S {
    fn on_snapshot(&mut self, snapshots: &[UnitSnapshot]) {
        (**self).on_snapshot(snapshots)
    }

    fn on_unit_finished(&mut self, result: &BatchUnitResult) {
        (**self).on_unit_finished(result)
    }

    fn on_batch_summary(&mut self, report: &BatchReport) {
        (**self).on_batch_summary(report)
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn on_snapshot(&mut self, _snapshots: &[UnitSnapshot]) {}
}

/// Number of output lines echoed for a failed batch unit.
pub const FAILURE_TAIL_LINES: usize = 20;

/// Writes status tables and batch outcomes to a terminal (or any writer).
pub struct TerminalSink<W: Write + Send> {
    out: W,
    clear_screen: bool,
    write_failed: bool,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout(clear_screen: bool) -> Self {
        Self::new(io::stdout(), clear_screen)
    }
}

impl<W: Write + Send> TerminalSink<W> {
    /// With `clear_screen`, every table redraws the screen in place.
    pub fn new(out: W, clear_screen: bool) -> Self {
        Self {
            out,
            clear_screen,
            write_failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush());
        if let Err(e) = result {
            if !self.write_failed {
                warn!(error = %e, "failed to write status output");
                self.write_failed = true;
            }
        }
    }
}

impl<W: Write + Send> StatusSink for TerminalSink<W> {
    fn on_snapshot(&mut self, snapshots: &[UnitSnapshot]) {
        let mut text = String::new();
        if self.clear_screen {
            text.push_str("\x1b[2J\x1b[H");
        }
        text.push_str(&render_table(snapshots));
        self.write(&text);
    }

    fn on_unit_finished(&mut self, result: &BatchUnitResult) {
        let mut text = format_outcome_line(result);
        text.push('\n');

        if !result.success && !result.cancelled {
            let skip = result.output.len().saturating_sub(FAILURE_TAIL_LINES);
            for line in &result.output[skip..] {
                text.push_str("    | ");
                text.push_str(line);
                text.push('\n');
            }
        }
        self.write(&text);
    }

    fn on_batch_summary(&mut self, report: &BatchReport) {
        let mut text = format!("{}/{} units succeeded", report.succeeded, report.total);
        if report.cancelled {
            text.push_str(" (cancelled)");
        }
        text.push('\n');
        self.write(&text);
    }
}

/// One-line outcome of a batch unit, e.g. `[ok] api (exit 0, 1.2s)`.
pub fn format_outcome_line(result: &BatchUnitResult) -> String {
    let elapsed = format_duration(result.duration);
    if result.cancelled {
        return format!("[cancelled] {} ({elapsed})", result.name);
    }
    if let Some(err) = &result.spawn_error {
        return format!("[FAILED] {}: could not start: {err}", result.name);
    }

    let code = result
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    if result.success {
        format!("[ok] {} (exit {code}, {elapsed})", result.name)
    } else {
        format!("[FAILED] {} (exit {code}, {elapsed})", result.name)
    }
}

fn format_duration(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, code: Option<i32>) -> BatchUnitResult {
        BatchUnitResult {
            name: name.to_string(),
            exit_code: code,
            success: code == Some(0),
            output: (1..=30).map(|i| format!("line {i}")).collect(),
            duration: Duration::from_millis(1200),
            spawn_error: None,
            cancelled: false,
        }
    }

    #[test]
    fn outcome_lines() {
        assert_eq!(format_outcome_line(&result("api", Some(0))), "[ok] api (exit 0, 1.2s)");
        assert_eq!(
            format_outcome_line(&result("web", Some(2))),
            "[FAILED] web (exit 2, 1.2s)"
        );

        let mut ghost = result("ghost", None);
        ghost.spawn_error = Some("No such file or directory".into());
        assert_eq!(
            format_outcome_line(&ghost),
            "[FAILED] ghost: could not start: No such file or directory"
        );
    }

    #[test]
    fn failed_units_echo_their_output_tail() {
        let mut sink = TerminalSink::new(Vec::new(), false);
        sink.on_unit_finished(&result("web", Some(1)));
        sink.on_unit_finished(&result("api", Some(0)));
        let text = String::from_utf8(sink.into_inner()).unwrap();

        assert!(text.contains("    | line 30"));
        assert!(text.contains("    | line 11"));
        assert!(!text.contains("    | line 10\n"));
        assert_eq!(text.matches("    | ").count(), FAILURE_TAIL_LINES);
    }

    #[test]
    fn snapshot_redraw_clears_screen_only_when_asked() {
        let mut plain = TerminalSink::new(Vec::new(), false);
        plain.on_snapshot(&[]);
        assert!(!String::from_utf8(plain.into_inner()).unwrap().contains('\x1b'));

        let mut live = TerminalSink::new(Vec::new(), true);
        live.on_snapshot(&[]);
        assert!(String::from_utf8(live.into_inner()).unwrap().starts_with("\x1b[2J"));
    }
}
