//! Text summary builder for CLI output.

use crate::engine::log_directory;
use crate::model::{RunMode, RunState, RunSummary};
use std::time::Duration;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a short human-readable report of a finished run.
pub(crate) fn build_text_summary(summary: &RunSummary) -> TextSummary {
    let mut lines = Vec::new();

    let elapsed = humantime::format_duration(Duration::from_millis(summary.duration_ms));
    let status = match (summary.state, summary.exit_code) {
        (RunState::Completed, Some(code)) => format!("completed with exit code {code}"),
        (RunState::Completed, None) => "completed (terminated by signal)".to_string(),
        (state, _) => state.label().to_string(),
    };
    lines.push(format!(
        "Run {status} after {elapsed} ({} mode)",
        summary.mode.as_str()
    ));
    lines.push(format!("Problem: {}", summary.problem_path));
    match summary.mode {
        RunMode::Single => lines.push(format!("Log: {}", summary.log_path)),
        RunMode::Parallel => lines.push(format!(
            "Log directory: {}",
            log_directory(&summary.log_path)
        )),
    }
    lines.push(format!("Lines relayed: {}", summary.lines_relayed));
    if let Some(err) = summary.error.as_deref() {
        lines.push(format!("Error: {err}"));
    }

    TextSummary { lines }
}
