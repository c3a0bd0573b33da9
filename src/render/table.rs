// src/render/table.rs

//! Plain-text status table.

use crate::engine::{UnitSnapshot, UnitStatus};

/// Longest output excerpt shown per row.
pub const MAX_OUTPUT_WIDTH: usize = 60;

const HEADERS: [&str; 6] = ["UNIT", "STATUS", "EXIT", "RETRIES", "STARTED", "LAST OUTPUT"];

/// Render snapshots as an aligned table, one row per unit, in input order.
///
/// Pure: the same snapshots always produce the same text.
pub fn render_table(snapshots: &[UnitSnapshot]) -> String {
    let rows: Vec<[String; 6]> = snapshots.iter().map(row_for).collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS.map(str::to_string), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn row_for(snap: &UnitSnapshot) -> [String; 6] {
    let mut status = snap.status.label();
    if snap.killed {
        status.push_str(" [killed]");
    }

    let exit = snap
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());

    let started = snap
        .started_at
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());

    let output = match (&snap.status, &snap.last_output_line) {
        (UnitStatus::FailedToStart(reason), _) => reason.clone(),
        (_, Some(line)) => line.clone(),
        (_, None) => String::new(),
    };

    [
        snap.name.clone(),
        status,
        exit,
        snap.retry_count.to_string(),
        started,
        truncate(output.trim(), MAX_OUTPUT_WIDTH),
    ]
}

fn push_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let last = cells.len() - 1;
    for (i, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
        out.push_str(cell);
        if i != last {
            let pad = width.saturating_sub(cell.chars().count()) + 2;
            out.extend(std::iter::repeat_n(' ', pad));
        }
    }
    let trimmed_len = out.trim_end_matches(' ').len();
    out.truncate(trimmed_len);
    out.push('\n');
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Readiness;

    fn snap(name: &str, status: UnitStatus) -> UnitSnapshot {
        UnitSnapshot {
            name: name.to_string(),
            status,
            last_output_line: None,
            exit_code: None,
            started_at: None,
            retry_count: 0,
            queued_for_restart: false,
            pid: None,
            killed: false,
            one_shot: false,
        }
    }

    #[test]
    fn renders_header_and_rows_in_order() {
        let mut api = snap("api", UnitStatus::Running(Readiness::Ready));
        api.last_output_line = Some("Now listening on http://localhost:5000".into());
        let mut migrate = snap("migrations", UnitStatus::Exited(1));
        migrate.exit_code = Some(1);
        migrate.retry_count = 2;

        let table = render_table(&[api, migrate]);
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("UNIT"));
        assert!(lines[1].starts_with("api "));
        assert!(lines[1].contains("ready"));
        assert!(lines[1].contains("Now listening"));
        assert!(lines[2].starts_with("migrations"));
        assert!(lines[2].contains("exited (1)"));

        // Columns line up.
        let col = lines[0].find("STATUS").unwrap();
        assert_eq!(&lines[1][col..col + 5], "ready");
    }

    #[test]
    fn spawn_failure_reason_is_shown() {
        let s = snap("ghost", UnitStatus::FailedToStart("no such file".into()));
        assert!(render_table(&[s]).contains("no such file"));
    }

    #[test]
    fn long_output_is_truncated() {
        let mut s = snap("noisy", UnitStatus::Running(Readiness::Building));
        s.last_output_line = Some("x".repeat(200));
        let table = render_table(&[s]);
        let row = table.lines().nth(1).unwrap();
        assert!(row.ends_with("..."));
        assert!(row.chars().count() < 200);
    }

    #[test]
    fn rendering_is_repeatable() {
        let s = vec![snap("a", UnitStatus::Starting), snap("b", UnitStatus::Completed)];
        assert_eq!(render_table(&s), render_table(&s));
    }
}
