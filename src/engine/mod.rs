mod command;
mod relay;

pub use command::{CommandBuilder, Entrypoint};
pub(crate) use command::log_directory;

use crate::error::{RunError, StreamKind};
use crate::model::{Invocation, RunEvent, RunState};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Receives everything a run produces. Called from the run's worker task.
pub trait RunSink: Send + Sync + 'static {
    /// One stdout line, without its terminator.
    fn on_output_line(&self, line: &str);
    /// The stderr block, or a spawn/stream failure message.
    fn on_error(&self, text: &str);
    fn on_state(&self, _state: RunState) {}
}

impl RunSink for mpsc::UnboundedSender<RunEvent> {
    fn on_output_line(&self, line: &str) {
        let _ = self.send(RunEvent::OutputLine(line.to_string()));
    }

    fn on_error(&self, text: &str) {
        let _ = self.send(RunEvent::ErrorText(text.to_string()));
    }

    fn on_state(&self, state: RunState) {
        let _ = self.send(RunEvent::State(state));
    }
}

/// What a finished run reports back to its caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,
    pub status: Option<ExitStatus>,
    pub lines: u64,
    pub elapsed: Duration,
    /// First failure seen, if any. A non-zero exit is not a failure.
    pub error: Option<RunError>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Completed && self.status.is_some_and(|s| s.success())
    }
}

/// Owns the single run slot. Clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct RunOrchestrator {
    busy: Arc<AtomicBool>,
}

/// Holds the run slot for as long as the worker lives.
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RunOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a previous run's worker has not finished yet.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Launch `invocation` on a background task and return immediately.
    ///
    /// Fails with [`RunError::Busy`] while another run holds the slot. Every
    /// other failure is delivered through `sink.on_error` and recorded on the
    /// [`RunOutcome`]. Must be called from within a Tokio runtime.
    pub fn start<S: RunSink>(&self, invocation: Invocation, sink: S) -> Result<RunHandle, RunError> {
        tracing::info!(command = %invocation.display(), "starting solver run");
        self.launch(sink, move |sink, state| execute(invocation, sink, state))
    }

    /// Run `work` on a background task while it holds the slot.
    fn launch<S, F, Fut>(&self, sink: S, work: F) -> Result<RunHandle, RunError>
    where
        S: RunSink,
        F: FnOnce(S, watch::Sender<RunState>) -> Fut + Send + 'static,
        Fut: Future<Output = RunOutcome> + Send + 'static,
    {
        let slot = self.acquire()?;
        let (state_tx, state_rx) = watch::channel(RunState::Idle);

        let worker = tokio::spawn(async move {
            // Released once the child has been waited on and stderr flushed.
            let _slot = slot;
            work(sink, state_tx).await
        });

        Ok(RunHandle {
            worker,
            state: state_rx,
        })
    }

    fn acquire(&self) -> Result<SlotGuard, RunError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RunError::Busy)?;
        Ok(SlotGuard(self.busy.clone()))
    }
}

/// One in-flight run. Await it (or call [`RunHandle::wait`]) for the outcome.
pub struct RunHandle {
    worker: JoinHandle<RunOutcome>,
    state: watch::Receiver<RunState>,
}

impl RunHandle {
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub async fn wait(self) -> Result<RunOutcome, RunError> {
        self.await
    }
}

impl Future for RunHandle {
    type Output = Result<RunOutcome, RunError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.worker)
            .poll(cx)
            .map(|res| res.map_err(|e| RunError::Worker(e.to_string())))
    }
}

/// A spawned child's pipes and its exit future.
struct ChildIo<O, E, W> {
    stdout: Option<O>,
    stderr: Option<E>,
    exit: W,
}

fn set_state(sink: &dyn RunSink, state: &watch::Sender<RunState>, s: RunState) {
    state.send_replace(s);
    sink.on_state(s);
}

async fn execute<S: RunSink>(
    invocation: Invocation,
    sink: S,
    state: watch::Sender<RunState>,
) -> RunOutcome {
    let started = Instant::now();
    set_state(&sink, &state, RunState::Starting);

    let mut command = Command::new(&invocation.program);
    command
        .args(invocation.argv())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let err = RunError::SpawnFailure {
                program: invocation.program.display().to_string(),
                reason: e.to_string(),
            };
            tracing::warn!(error = %err, "solver failed to start");
            sink.on_error(&err.to_string());
            set_state(&sink, &state, RunState::Failed);
            return RunOutcome {
                state: RunState::Failed,
                status: None,
                lines: 0,
                elapsed: started.elapsed(),
                error: Some(err),
            };
        }
    };

    tracing::debug!(pid = ?child.id(), "solver spawned");
    let pipes = ChildIo {
        stdout: child.stdout.take(),
        stderr: child.stderr.take(),
        exit: child.wait(),
    };
    supervise(pipes, &sink, &state, started).await
}

/// Relay stdout, drain stderr beside it, then wait for the exit status.
async fn supervise<O, E, W>(
    child: ChildIo<O, E, W>,
    sink: &dyn RunSink,
    state: &watch::Sender<RunState>,
    started: Instant,
) -> RunOutcome
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin + Send + 'static,
    W: Future<Output = io::Result<ExitStatus>>,
{
    set_state(sink, state, RunState::Streaming);

    let stderr_task = child
        .stderr
        .map(|stream| tokio::spawn(relay::collect_stream(stream)));

    let mut error: Option<RunError> = None;
    let mut report = |err: RunError| {
        tracing::warn!(error = %err, "solver stream failure");
        sink.on_error(&err.to_string());
        error.get_or_insert(err);
    };

    let mut lines = 0;
    if let Some(stdout) = child.stdout {
        // The reader is dropped on return, closing our end of the pipe.
        if let Err(e) = relay::relay_lines(stdout, sink, &mut lines).await {
            report(RunError::stream(StreamKind::Stdout, &e));
        }
    }

    let status = match child.exit.await {
        Ok(status) => Some(status),
        Err(e) => {
            report(RunError::stream(StreamKind::Exit, &e));
            None
        }
    };

    if let Some(task) = stderr_task {
        match task.await {
            Ok(Ok(text)) => {
                if let Some(block) = relay::stderr_block(&text) {
                    sink.on_error(&block);
                }
            }
            Ok(Err(e)) => report(RunError::stream(StreamKind::Stderr, &e)),
            Err(e) => report(RunError::StreamFailure {
                stream: StreamKind::Stderr,
                reason: e.to_string(),
            }),
        }
    }

    let final_state = if error.is_some() {
        RunState::Failed
    } else {
        RunState::Completed
    };
    tracing::info!(
        exit_code = ?status.and_then(|s| s.code()),
        lines,
        state = final_state.label(),
        "solver run finished"
    );
    set_state(sink, state, final_state);

    RunOutcome {
        state: final_state,
        status,
        lines,
        elapsed: started.elapsed(),
        error,
    }
}
