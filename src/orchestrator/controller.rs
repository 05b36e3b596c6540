//! Run lifecycle controller.
//!
//! Owns the run orchestrator, starts and reruns the solver, and emits events for
//! presentation layers.

use super::post_process::{failed_summary, summarize_run};
use crate::engine::{RunHandle, RunOrchestrator};
use crate::error::RunError;
use crate::model::{Invocation, RunEvent, RunMode, RunParameters};
use anyhow::Result;
use time::OffsetDateTime;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Rerun,
    Quit,
}

/// Everything needed to (re)launch the same solver run.
#[derive(Debug, Clone)]
pub(crate) struct LaunchPlan {
    pub mode: RunMode,
    pub params: RunParameters,
    pub invocation: Invocation,
}

/// Internal handle for an active run.
pub(crate) struct RunCtx {
    pub handle: Option<RunHandle>,
    pub started_at: OffsetDateTime,
}

/// Start `plan` on the orchestrator, announcing it on `event_tx` first.
pub(crate) fn start_run(
    orchestrator: &RunOrchestrator,
    plan: &LaunchPlan,
    event_tx: UnboundedSender<RunEvent>,
) -> Result<RunCtx, RunError> {
    if orchestrator.is_busy() {
        return Err(RunError::Busy);
    }
    let _ = event_tx.send(RunEvent::Launched {
        invocation: plan.invocation.clone(),
    });
    let started_at = OffsetDateTime::now_utc();
    let handle = orchestrator.start(plan.invocation.clone(), event_tx)?;
    Ok(RunCtx {
        handle: Some(handle),
        started_at,
    })
}

/// Drive runs from UI commands until the UI quits and the active run has finished.
pub(crate) async fn run_controller(
    plan: &LaunchPlan,
    event_tx: UnboundedSender<RunEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let orchestrator = RunOrchestrator::new();
    let mut run_ctx = launch(&orchestrator, plan, &event_tx);
    let mut quit_pending = false;
    let mut cmd_closed = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !cmd_closed => {
                match cmd {
                    Some(UiCommand::Rerun) => {
                        if run_ctx.is_some() {
                            let _ = event_tx.send(RunEvent::Info(
                                "Run in progress; rerun once it finishes".into(),
                            ));
                        } else {
                            run_ctx = launch(&orchestrator, plan, &event_tx);
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        cmd_closed |= cmd.is_none();
                        // Runs are never cancelled; quitting waits for the active one.
                        if run_ctx.is_none() {
                            break;
                        }
                        if !quit_pending {
                            tracing::info!("quit requested; waiting for the active run");
                        }
                        quit_pending = true;
                    }
                }
            }
            // Do not take the handle before this branch wins; otherwise it is dropped
            // when another branch is chosen and completion is never observed.
            done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some((h.await, ctx.started_at));
                    }
                }
                futures::future::pending().await
            } => {
                if let Some((join_res, started_at)) = done {
                    let summary = match join_res {
                        Ok(outcome) => summarize_run(plan, started_at, &outcome),
                        Err(e) => {
                            let _ = event_tx.send(RunEvent::ErrorText(e.to_string()));
                            failed_summary(plan, started_at, &e)
                        }
                    };
                    let _ = event_tx.send(RunEvent::RunCompleted { summary: Box::new(summary) });
                    run_ctx = None;
                    if quit_pending {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn launch(
    orchestrator: &RunOrchestrator,
    plan: &LaunchPlan,
    event_tx: &UnboundedSender<RunEvent>,
) -> Option<RunCtx> {
    match start_run(orchestrator, plan, event_tx.clone()) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            let _ = event_tx.send(RunEvent::Info(e.to_string()));
            None
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::RunState;
    use tokio::sync::mpsc;

    fn plan(script: &str) -> LaunchPlan {
        LaunchPlan {
            mode: RunMode::Single,
            params: RunParameters {
                problem_path: "p.txt".into(),
                log_path: "p_log.log".into(),
                ..Default::default()
            },
            invocation: Invocation::new("sh", vec!["-c".into(), script.into()]),
        }
    }

    #[tokio::test]
    async fn quit_waits_for_the_active_run() {
        let plan = plan("echo hello; sleep 0.2; echo bye");
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        cmd_tx.send(UiCommand::Quit).unwrap();

        run_controller(&plan, event_tx, cmd_rx).await.unwrap();

        let mut lines = Vec::new();
        let mut summary = None;
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                RunEvent::OutputLine(l) => lines.push(l),
                RunEvent::RunCompleted { summary: s } => summary = Some(s),
                _ => {}
            }
        }
        assert_eq!(lines, ["hello", "bye"]);
        let summary = summary.expect("run completed");
        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.lines_relayed, 2);
    }

    #[tokio::test]
    async fn rerun_is_refused_while_running() {
        let plan = plan("sleep 0.2");
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        cmd_tx.send(UiCommand::Rerun).unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();

        run_controller(&plan, event_tx, cmd_rx).await.unwrap();

        let mut launches = 0;
        let mut refused = false;
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                RunEvent::Launched { .. } => launches += 1,
                RunEvent::Info(msg) if msg.contains("in progress") => refused = true,
                _ => {}
            }
        }
        assert_eq!(launches, 1);
        assert!(refused);
    }

    #[tokio::test]
    async fn start_run_rejects_a_busy_orchestrator() {
        let plan = plan("sleep 0.2");
        let orchestrator = RunOrchestrator::new();
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let mut ctx = start_run(&orchestrator, &plan, event_tx.clone()).unwrap();
        assert!(matches!(
            start_run(&orchestrator, &plan, event_tx),
            Err(RunError::Busy)
        ));
        ctx.handle.take().unwrap().wait().await.unwrap();
    }
}
