//! Post-run processing utilities.
//!
//! Turns a finished run into a serializable summary for presentation layers.

use super::controller::LaunchPlan;
use crate::engine::RunOutcome;
use crate::error::RunError;
use crate::model::{RunState, RunSummary};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Summarize a run whose worker produced an outcome.
pub(crate) fn summarize_run(
    plan: &LaunchPlan,
    started_at: OffsetDateTime,
    outcome: &RunOutcome,
) -> RunSummary {
    let mut summary = base_summary(plan, started_at);
    summary.duration_ms = outcome.elapsed.as_millis() as u64;
    summary.state = outcome.state;
    summary.exit_code = outcome.exit_code();
    summary.success = outcome.succeeded();
    summary.lines_relayed = outcome.lines;
    summary.error = outcome.error.as_ref().map(|e| e.to_string());
    summary
}

/// Summarize a run whose worker could not be joined.
pub(crate) fn failed_summary(
    plan: &LaunchPlan,
    started_at: OffsetDateTime,
    err: &RunError,
) -> RunSummary {
    let mut summary = base_summary(plan, started_at);
    let elapsed = OffsetDateTime::now_utc() - started_at;
    summary.duration_ms = elapsed.whole_milliseconds().max(0) as u64;
    summary.error = Some(err.to_string());
    summary
}

fn base_summary(plan: &LaunchPlan, started_at: OffsetDateTime) -> RunSummary {
    RunSummary {
        started_at_utc: started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        mode: plan.mode,
        program: plan.invocation.program.display().to_string(),
        args: plan
            .invocation
            .argv()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect(),
        problem_path: plan.params.problem_path.clone(),
        log_path: plan.params.log_path.clone(),
        duration_ms: 0,
        state: RunState::Failed,
        exit_code: None,
        success: false,
        lines_relayed: 0,
        error: None,
    }
}
