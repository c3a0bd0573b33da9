use std::sync::{Arc, Mutex};

use procherd::batch::{BatchReport, BatchUnitResult};
use procherd::engine::UnitSnapshot;
use procherd::render::StatusSink;

/// Everything a [`RecordingSink`] saw, in arrival order.
#[derive(Debug, Default)]
pub struct Recorded {
    pub frames: Vec<Vec<UnitSnapshot>>,
    pub finished: Vec<BatchUnitResult>,
    pub summaries: Vec<BatchReport>,
}

/// A status sink that:
/// - records every snapshot frame, batch result and summary
/// - can be cloned so the test keeps a handle while the run owns the sink.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn frames(&self) -> Vec<Vec<UnitSnapshot>> {
        self.inner.lock().unwrap().frames.clone()
    }

    pub fn last_frame(&self) -> Option<Vec<UnitSnapshot>> {
        self.inner.lock().unwrap().frames.last().cloned()
    }

    /// Latest recorded snapshot of `name`, if any frame contained it.
    pub fn latest(&self, name: &str) -> Option<UnitSnapshot> {
        let guard = self.inner.lock().unwrap();
        guard
            .frames
            .iter()
            .rev()
            .find_map(|frame| frame.iter().find(|s| s.name == name).cloned())
    }

    /// Every distinct status label `name` showed, in order.
    pub fn status_history(&self, name: &str) -> Vec<String> {
        let guard = self.inner.lock().unwrap();
        let mut out: Vec<String> = Vec::new();
        for snap in guard.frames.iter().flatten().filter(|s| s.name == name) {
            let label = snap.status.label();
            if out.last() != Some(&label) {
                out.push(label);
            }
        }
        out
    }

    pub fn finished(&self) -> Vec<BatchUnitResult> {
        self.inner.lock().unwrap().finished.clone()
    }

    pub fn summaries(&self) -> Vec<BatchReport> {
        self.inner.lock().unwrap().summaries.clone()
    }
}

impl StatusSink for RecordingSink {
    fn on_snapshot(&mut self, snapshots: &[UnitSnapshot]) {
        self.inner.lock().unwrap().frames.push(snapshots.to_vec());
    }

    fn on_unit_finished(&mut self, result: &BatchUnitResult) {
        self.inner.lock().unwrap().finished.push(result.clone());
    }

    fn on_batch_summary(&mut self, report: &BatchReport) {
        self.inner.lock().unwrap().summaries.push(report.clone());
    }
}
