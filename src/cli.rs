use crate::config::LauncherConfig;
use crate::engine::RunOrchestrator;
use crate::model::{RunEvent, RunMode, RunSummary};
use crate::orchestrator::{failed_summary, start_run, summarize_run, LaunchPlan};
use crate::workspace::{RunOptions, Workspace};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "solver-launcher",
    version,
    about = "Launch a problem solver in single or parallel mode and follow its output live"
)]
pub struct Cli {
    /// Problem file name, saved under the problems directory (".txt" is added if missing)
    #[arg(long)]
    pub name: String,

    /// Run one agent, or several agents in parallel
    #[arg(long, value_enum, default_value_t = RunMode::Single)]
    pub mode: RunMode,

    /// Problem statement text (read from stdin when neither this nor --problem-file is given)
    #[arg(long, conflicts_with = "problem_file")]
    pub problem: Option<String>,

    /// Read the problem statement from a file
    #[arg(long)]
    pub problem_file: Option<PathBuf>,

    /// Number of agents (parallel mode; 0 leaves it to the solver)
    #[arg(short = 'n', long, default_value_t = 10, allow_negative_numbers = true)]
    pub agents: i64,

    /// Timeout in seconds (parallel mode; 0 leaves it to the solver)
    #[arg(short = 't', long, default_value_t = 0, allow_negative_numbers = true)]
    pub timeout: i64,

    /// Maximum worker processes (parallel mode; 0 leaves it to the solver)
    #[arg(short = 'w', long, default_value_t = 0, allow_negative_numbers = true)]
    pub workers: i64,

    /// Extra instructions passed through to the solver
    #[arg(short = 'o', long)]
    pub other_prompts: Option<String>,

    /// Stream output as plain text (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Print a JSON run summary on stdout; solver output goes to stderr (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Launcher config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Program used to run the solver scripts
    #[arg(long)]
    pub interpreter: Option<PathBuf>,

    /// Directory containing the solver scripts
    #[arg(long)]
    pub code_dir: Option<PathBuf>,

    /// Directory problems are saved into
    #[arg(long)]
    pub problems_dir: Option<PathBuf>,

    /// Directory solver logs are written to
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,
}

/// Run the launcher. Returns the exit code non-TUI modes should exit with.
pub async fn run(args: Cli) -> Result<i32> {
    let cfg = load_config(&args)?;
    let use_tui = cfg!(feature = "tui") && !args.json && !args.text;

    if use_tui {
        crate::logging::init_file(&cfg.logs_dir)?;
    } else {
        crate::logging::init_stderr();
    }

    let plan = prepare_plan(&args, &cfg)?;
    tracing::info!(mode = plan.mode.as_str(), command = %plan.invocation.display(), "launch plan ready");

    #[cfg(feature = "tui")]
    if use_tui {
        crate::tui::run(plan).await?;
        return Ok(0);
    }

    run_text(&args, plan).await
}

/// Load the config file and apply command line overrides.
pub fn load_config(args: &Cli) -> Result<LauncherConfig> {
    let mut cfg = LauncherConfig::load(args.config.as_deref())?;
    if let Some(p) = &args.interpreter {
        cfg.interpreter = p.clone();
    }
    if let Some(p) = &args.code_dir {
        cfg.code_dir = p.clone();
    }
    if let Some(p) = &args.problems_dir {
        cfg.problems_dir = p.clone();
    }
    if let Some(p) = &args.logs_dir {
        cfg.logs_dir = p.clone();
    }
    Ok(cfg)
}

fn run_options(args: &Cli) -> RunOptions {
    RunOptions {
        other_prompts: args.other_prompts.clone(),
        num_agents: Some(args.agents),
        timeout_seconds: Some(args.timeout),
        max_workers: Some(args.workers),
    }
}

fn read_problem_text(args: &Cli) -> Result<String> {
    if let Some(text) = &args.problem {
        return Ok(text.clone());
    }
    if let Some(path) = &args.problem_file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("read problem file {}", path.display()));
    }
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        bail!("no problem given: use --problem, --problem-file, or pipe it on stdin");
    }
    let mut text = String::new();
    stdin
        .read_to_string(&mut text)
        .context("read problem from stdin")?;
    Ok(text)
}

/// Persist the problem and build the solver invocation.
pub(crate) fn prepare_plan(args: &Cli, cfg: &LauncherConfig) -> Result<LaunchPlan> {
    let text = read_problem_text(args)?;
    let prepared = Workspace::from_config(cfg).prepare(&args.name, &text)?;
    let params = prepared.parameters(args.mode, &run_options(args));
    let invocation = cfg
        .command_builder()
        .build(args.mode, &params)
        .context("build solver command")?;
    Ok(LaunchPlan {
        mode: args.mode,
        params,
        invocation,
    })
}

async fn run_text(args: &Cli, plan: LaunchPlan) -> Result<i32> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<RunEvent>();

    let orchestrator = RunOrchestrator::new();
    let mut ctx = start_run(&orchestrator, &plan, evt_tx).context("start solver run")?;

    // The channel closes once the run's worker drops its sink.
    while let Some(ev) = evt_rx.recv().await {
        match ev {
            RunEvent::OutputLine(line) => {
                // JSON mode keeps stdout for the summary.
                let _ = out_tx.send(if args.json {
                    OutputLine::Stderr(line)
                } else {
                    OutputLine::Stdout(line)
                });
            }
            RunEvent::ErrorText(text) => {
                for line in text.lines() {
                    let _ = out_tx.send(OutputLine::Stderr(line.to_string()));
                }
            }
            RunEvent::Launched { invocation } => {
                let _ = out_tx.send(OutputLine::Stderr(format!("$ {}", invocation.display())));
            }
            RunEvent::Info(msg) => {
                let _ = out_tx.send(OutputLine::Stderr(msg));
            }
            RunEvent::State(_) | RunEvent::RunCompleted { .. } => {}
        }
    }

    let handle = ctx.handle.take().context("run handle missing")?;
    let summary = match handle.await {
        Ok(outcome) => summarize_run(&plan, ctx.started_at, &outcome),
        Err(e) => failed_summary(&plan, ctx.started_at, &e),
    };

    if args.json {
        let out = serde_json::to_string_pretty(&summary)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_text_summary(&summary).lines {
            let _ = out_tx.send(OutputLine::Stderr(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(exit_code(&summary))
}

fn exit_code(summary: &RunSummary) -> i32 {
    match summary.exit_code {
        Some(code) => code,
        None if summary.success => 0,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunState;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_parallel_flags() {
        let args = Cli::try_parse_from([
            "solver-launcher",
            "--name",
            "p1",
            "--mode",
            "parallel",
            "--problem",
            "Find all n.",
            "-n",
            "5",
            "-t",
            "600",
            "-o",
            "be rigorous",
        ])
        .unwrap();
        assert_eq!(args.mode, RunMode::Parallel);
        assert_eq!(args.agents, 5);
        assert_eq!(args.timeout, 600);
        assert_eq!(args.workers, 0);
        assert_eq!(args.other_prompts.as_deref(), Some("be rigorous"));
    }

    #[test]
    fn problem_and_problem_file_conflict() {
        let res = Cli::try_parse_from([
            "solver-launcher",
            "--name",
            "p1",
            "--problem",
            "x",
            "--problem-file",
            "p.txt",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn prepare_plan_writes_problem_and_builds_command() {
        let dir = tempfile::tempdir().unwrap();
        let problems = dir.path().join("problems");
        let logs = dir.path().join("logs");
        let args = Cli::try_parse_from([
            "solver-launcher",
            "--name",
            "geo",
            "--mode",
            "parallel",
            "--problem",
            "Show the angle is 90 degrees.",
            "-n",
            "5",
            "--interpreter",
            "/usr/bin/python3",
            "--problems-dir",
            problems.to_str().unwrap(),
            "--logs-dir",
            logs.to_str().unwrap(),
        ])
        .unwrap();

        let cfg = load_config(&with_empty_config(args.clone(), dir.path())).unwrap();
        let plan = prepare_plan(&args, &cfg).unwrap();

        let problem_path = problems.join("geo.txt");
        assert_eq!(
            std::fs::read_to_string(&problem_path).unwrap(),
            "Show the angle is 90 degrees."
        );
        assert_eq!(plan.invocation.program, PathBuf::from("/usr/bin/python3"));
        assert_eq!(
            plan.invocation.args,
            [
                problem_path.to_string_lossy().into_owned(),
                "-d".to_string(),
                logs.to_string_lossy().into_owned(),
                "-n".to_string(),
                "5".to_string(),
            ]
        );
    }

    #[test]
    fn negative_count_is_rejected_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let args = Cli::try_parse_from([
            "solver-launcher",
            "--name",
            "p",
            "--mode",
            "parallel",
            "--problem",
            "x",
            "-w",
            "-2",
            "--problems-dir",
            dir.path().join("problems").to_str().unwrap(),
            "--logs-dir",
            dir.path().join("logs").to_str().unwrap(),
        ])
        .unwrap();
        let cfg = load_config(&with_empty_config(args.clone(), dir.path())).unwrap();
        let err = prepare_plan(&args, &cfg).unwrap_err();
        assert!(format!("{err:#}").contains("max_workers must not be negative"));
    }

    #[test]
    fn exit_code_mirrors_the_solver() {
        let summary = RunSummary {
            started_at_utc: String::new(),
            mode: RunMode::Single,
            program: "python3".into(),
            args: vec![],
            problem_path: "p.txt".into(),
            log_path: "p_log.log".into(),
            duration_ms: 0,
            state: RunState::Completed,
            exit_code: Some(4),
            success: false,
            lines_relayed: 0,
            error: None,
        };
        assert_eq!(exit_code(&summary), 4);
        assert_eq!(
            exit_code(&RunSummary {
                exit_code: None,
                state: RunState::Failed,
                ..summary
            }),
            1
        );
    }

    /// Points `--config` at an empty file so tests never read the user's config.
    fn with_empty_config(mut args: Cli, dir: &std::path::Path) -> Cli {
        let path = dir.join("config.toml");
        std::fs::write(&path, "").unwrap();
        args.config = Some(path);
        args
    }
}
