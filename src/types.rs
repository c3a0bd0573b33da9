use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Execution strategy used for a run.
///
/// - `Supervise`: start every unit at once, refresh a live status table and
///   restart crashed units (default behaviour).
/// - `Batch`: run units one at a time in input order, buffering output, and
///   report how many succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Supervise,
    Batch,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Supervise
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "supervise" | "supervised" | "concurrent" => Ok(RunMode::Supervise),
            "batch" | "sequential" => Ok(RunMode::Batch),
            other => Err(format!(
                "invalid mode: {other} (expected \"supervise\" or \"batch\")"
            )),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Supervise => f.write_str("supervise"),
            RunMode::Batch => f.write_str("batch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_aliases() {
        assert_eq!("Batch".parse::<RunMode>(), Ok(RunMode::Batch));
        assert_eq!("concurrent".parse::<RunMode>(), Ok(RunMode::Supervise));
        assert!("parallel".parse::<RunMode>().is_err());
    }
}
