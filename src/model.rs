use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;

/// Which solver entry point to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// One agent writing to a single log file
    Single,
    /// Several agents writing into a log directory
    Parallel,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Single => "single",
            RunMode::Parallel => "parallel",
        }
    }
}

/// Inputs for one solver run.
///
/// `num_agents`, `timeout_seconds` and `max_workers` only apply to
/// [`RunMode::Parallel`]. They are signed so that invalid (negative) input can
/// be rejected when the invocation is built instead of wrapping silently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    pub problem_path: String,
    pub log_path: String,
    #[serde(default)]
    pub other_prompts: Option<String>,
    #[serde(default)]
    pub num_agents: Option<i64>,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    #[serde(default)]
    pub max_workers: Option<i64>,
}

/// A ready-to-spawn command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub program: PathBuf,
    /// Entry script passed to `program` ahead of the solver arguments.
    #[serde(default)]
    pub script: Option<PathBuf>,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            script: None,
            args,
        }
    }

    /// Everything after the program name, in spawn order.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        if let Some(script) = &self.script {
            argv.push(script.clone().into_os_string());
        }
        argv.extend(self.args.iter().map(OsString::from));
        argv
    }

    /// Human-readable command line for status lines and logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        if let Some(script) = &self.script {
            parts.push(script.display().to_string());
        }
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                parts.push(format!("{arg:?}"));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Starting,
    Streaming,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Starting => "starting",
            RunState::Streaming => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

/// Events flowing from the run controller to presentation layers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Launched {
        invocation: Invocation,
    },
    State(RunState),
    /// One line of the solver's standard output.
    OutputLine(String),
    /// Standard-error block or a launch/stream failure message.
    ErrorText(String),
    Info(String),
    RunCompleted {
        // Boxed to keep the per-line variants small.
        summary: Box<RunSummary>,
    },
}

/// Serializable record of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default)]
    pub started_at_utc: String,
    pub mode: RunMode,
    pub program: String,
    pub args: Vec<String>,
    pub problem_path: String,
    pub log_path: String,
    pub duration_ms: u64,
    pub state: RunState,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub success: bool,
    pub lines_relayed: u64,
    #[serde(default)]
    pub error: Option<String>,
}
