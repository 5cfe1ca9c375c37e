//! Weighted progress reporting.
//!
//! Each stage owns a fixed slice of the bar proportional to its weight. A
//! slice is counted once, whether the stage completed or was skipped, and
//! the reported percentage never goes backwards.

use std::collections::HashSet;

use tracing::info;

use super::stage::StageKind;
use crate::defaults::{INTERPOLATION_CAP, MAX_PENDING_PERCENT};

/// Receives `(percent, step)` updates from a render.
pub trait ProgressReporter {
    fn report(&mut self, percent: u8, step: &str);
}

impl<F: FnMut(u8, &str)> ProgressReporter for F {
    fn report(&mut self, percent: u8, step: &str) {
        self(percent, step)
    }
}

/// Writes each update to the log.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&mut self, percent: u8, step: &str) {
        info!(percent, step, "render progress");
    }
}

/// Drops every update.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _percent: u8, _step: &str) {}
}

/// One recorded update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub step: String,
}

/// Records every update, for tests and library callers that poll.
#[derive(Debug, Default)]
pub struct CollectorProgress {
    events: Vec<ProgressEvent>,
}

impl CollectorProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    pub fn last(&self) -> Option<&ProgressEvent> {
        self.events.last()
    }

    pub fn steps(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.step.as_str()).collect()
    }
}

impl ProgressReporter for CollectorProgress {
    fn report(&mut self, percent: u8, step: &str) {
        self.events.push(ProgressEvent {
            percent,
            step: step.to_string(),
        });
    }
}

/// Turns stage events into monotonic percentages for one render.
pub struct ProgressTracker<'r> {
    reporter: &'r mut dyn ProgressReporter,
    total: u32,
    done: u32,
    counted: HashSet<StageKind>,
    last: u8,
}

impl<'r> ProgressTracker<'r> {
    pub fn new(plan: &[StageKind], reporter: &'r mut dyn ProgressReporter) -> Self {
        let total = plan.iter().map(|s| s.weight()).sum::<u32>().max(1);
        Self {
            reporter,
            total,
            done: 0,
            counted: HashSet::new(),
            last: 0,
        }
    }

    /// Percentage of weight accounted for so far.
    pub fn percent(&self) -> u8 {
        to_percent(f64::from(self.done), f64::from(self.total))
    }

    /// Highest percentage emitted so far.
    pub fn last_reported(&self) -> u8 {
        self.last
    }

    /// Emits a free-form step at the current percentage.
    pub fn note(&mut self, step: &str) {
        self.emit(self.percent(), step);
    }

    pub fn begin(&mut self, stage: StageKind) {
        self.emit(self.percent(), stage.label());
    }

    /// Reports that `stage` is `fraction` of the way through. The fraction
    /// is capped so a running stage never claims its whole slice.
    pub fn interpolate(&mut self, stage: StageKind, fraction: f64) {
        if self.counted.contains(&stage) {
            return;
        }
        let fraction = fraction.clamp(0.0, INTERPOLATION_CAP);
        let position = f64::from(self.done) + f64::from(stage.weight()) * fraction;
        let percent = to_percent(position, f64::from(self.total));
        self.emit(percent, stage.label());
    }

    pub fn complete(&mut self, stage: StageKind) {
        self.account(stage);
        self.emit(self.percent(), stage.label());
    }

    pub fn skip(&mut self, stage: StageKind) {
        self.account(stage);
        self.emit(self.percent(), &format!("{} skip", stage.label()));
    }

    /// Final update. The only way to report 100.
    pub fn finish(&mut self) {
        self.done = self.total;
        self.last = 100;
        self.reporter.report(100, "Done");
    }

    fn account(&mut self, stage: StageKind) {
        if self.counted.insert(stage) {
            self.done = (self.done + stage.weight()).min(self.total);
        }
    }

    fn emit(&mut self, percent: u8, step: &str) {
        let percent = percent.min(MAX_PENDING_PERCENT).max(self.last);
        self.last = percent;
        self.reporter.report(percent, step);
    }
}

fn to_percent(position: f64, total: f64) -> u8 {
    (100.0 * position / total).round().clamp(0.0, 100.0) as u8
}
