//! Terminal rendering for the CLI: the progress bar and result lines.

use crate::pipeline::{ProgressReporter, RenderSummary};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// Progress bar fed by render progress callbacks.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(100))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        match ProgressStyle::with_template(TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("#>-")),
            Err(e) => tracing::debug!("progress template rejected: {e}"),
        }
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarProgress {
    fn report(&mut self, percent: u8, step: &str) {
        self.bar.set_position(u64::from(percent));
        self.bar.set_message(step.to_string());
    }
}

/// One line per skipped stage plus the final output path.
pub fn summary_lines(summary: &RenderSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary
        .skipped
        .iter()
        .map(|s| format!("{} {} skipped: {}", "⚠".yellow(), s.stage, s.reason))
        .collect();
    lines.push(format!(
        "{} Rendered {} ({} stages)",
        "✓".green(),
        summary.output.display(),
        summary.completed.len()
    ));
    lines
}

pub fn print_summary(summary: &RenderSummary) {
    for line in summary_lines(summary) {
        println!("{line}");
    }
}

pub fn print_failure(error: &dyn std::fmt::Display) {
    eprintln!("{} {}", "✗".red(), error);
}
