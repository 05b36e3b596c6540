//! Solver command line construction.

use crate::error::RunError;
use crate::model::{Invocation, RunMode, RunParameters};
use std::path::{Path, PathBuf};

/// Program and optional script that a mode launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrypoint {
    pub program: PathBuf,
    pub script: Option<PathBuf>,
}

impl Entrypoint {
    pub fn new(program: impl Into<PathBuf>, script: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script,
        }
    }
}

/// Maps a mode and its parameters to an [`Invocation`]. Performs no I/O.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    single: Entrypoint,
    parallel: Entrypoint,
}

impl CommandBuilder {
    pub fn new(single: Entrypoint, parallel: Entrypoint) -> Self {
        Self { single, parallel }
    }

    pub fn build(&self, mode: RunMode, params: &RunParameters) -> Result<Invocation, RunError> {
        let args = build_args(mode, params)?;
        let entry = match mode {
            RunMode::Single => &self.single,
            RunMode::Parallel => &self.parallel,
        };
        Ok(Invocation {
            program: entry.program.clone(),
            script: entry.script.clone(),
            args,
        })
    }
}

/// Build the solver argument list that follows the entry script.
pub fn build_args(mode: RunMode, params: &RunParameters) -> Result<Vec<String>, RunError> {
    if params.problem_path.is_empty() {
        return Err(RunError::InvalidParameters(
            "problem path must not be empty".into(),
        ));
    }
    if params.log_path.is_empty() {
        return Err(RunError::InvalidParameters(
            "log path must not be empty".into(),
        ));
    }

    let other_prompts = params.other_prompts.as_deref().filter(|p| !p.is_empty());
    let mut args = vec![params.problem_path.clone()];

    match mode {
        RunMode::Single => {
            args.push("--log".into());
            args.push(params.log_path.clone());
            if let Some(prompts) = other_prompts {
                args.push("--other_prompts".into());
                args.push(prompts.to_string());
            }
        }
        RunMode::Parallel => {
            args.push("-d".into());
            args.push(log_directory(&params.log_path));
            let counts = [
                ("-n", "num_agents", params.num_agents),
                ("-t", "timeout_seconds", params.timeout_seconds),
                ("-w", "max_workers", params.max_workers),
            ];
            for (flag, name, value) in counts {
                if let Some(v) = optional_count(name, value)? {
                    args.push(flag.into());
                    args.push(v.to_string());
                }
            }
            if let Some(prompts) = other_prompts {
                args.push("-o".into());
                args.push(prompts.to_string());
            }
        }
    }

    Ok(args)
}

/// Zero counts as "not provided"; negatives are rejected.
fn optional_count(name: &str, value: Option<i64>) -> Result<Option<i64>, RunError> {
    match value {
        Some(v) if v < 0 => Err(RunError::InvalidParameters(format!(
            "{name} must not be negative (got {v})"
        ))),
        Some(0) | None => Ok(None),
        Some(v) => Ok(Some(v)),
    }
}

/// Directory the parallel runner writes its logs into.
pub(crate) fn log_directory(log_path: &str) -> String {
    match Path::new(log_path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params() -> RunParameters {
        RunParameters {
            problem_path: "problems/p1.txt".into(),
            log_path: "run_logs/p1_log.log".into(),
            ..Default::default()
        }
    }

    fn builder() -> CommandBuilder {
        CommandBuilder::new(
            Entrypoint::new("python3", Some(PathBuf::from("code/agent.py"))),
            Entrypoint::new("python3", Some(PathBuf::from("code/run_parallel.py"))),
        )
    }

    #[test]
    fn single_without_optionals() {
        let args = build_args(RunMode::Single, &params()).unwrap();
        assert_eq!(args, ["problems/p1.txt", "--log", "run_logs/p1_log.log"]);
    }

    #[test]
    fn single_with_other_prompts() {
        let p = RunParameters {
            other_prompts: Some("foo".into()),
            ..params()
        };
        let args = build_args(RunMode::Single, &p).unwrap();
        assert_eq!(
            args,
            [
                "problems/p1.txt",
                "--log",
                "run_logs/p1_log.log",
                "--other_prompts",
                "foo"
            ]
        );
    }

    #[test]
    fn single_ignores_parallel_fields() {
        let p = RunParameters {
            num_agents: Some(-3),
            timeout_seconds: Some(60),
            max_workers: Some(4),
            other_prompts: Some(String::new()),
            ..params()
        };
        let args = build_args(RunMode::Single, &p).unwrap();
        assert_eq!(args, ["problems/p1.txt", "--log", "run_logs/p1_log.log"]);
    }

    #[test]
    fn parallel_treats_zero_as_absent() {
        let p = RunParameters {
            num_agents: Some(5),
            timeout_seconds: Some(0),
            max_workers: Some(0),
            ..params()
        };
        let args = build_args(RunMode::Parallel, &p).unwrap();
        assert_eq!(args, ["problems/p1.txt", "-d", "run_logs", "-n", "5"]);
    }

    #[test]
    fn parallel_appends_flags_in_fixed_order() {
        let p = RunParameters {
            num_agents: Some(10),
            timeout_seconds: Some(300),
            max_workers: Some(4),
            other_prompts: Some("use induction".into()),
            ..params()
        };
        let args = build_args(RunMode::Parallel, &p).unwrap();
        assert_eq!(
            args,
            [
                "problems/p1.txt",
                "-d",
                "run_logs",
                "-n",
                "10",
                "-t",
                "300",
                "-w",
                "4",
                "-o",
                "use induction"
            ]
        );
    }

    #[test]
    fn parallel_log_directory_defaults_to_current_dir() {
        let p = RunParameters {
            log_path: "p1_log.log".into(),
            ..params()
        };
        let args = build_args(RunMode::Parallel, &p).unwrap();
        assert_eq!(args, ["problems/p1.txt", "-d", "."]);
    }

    #[test]
    fn rejects_empty_problem_path() {
        let p = RunParameters {
            problem_path: String::new(),
            ..params()
        };
        let err = build_args(RunMode::Single, &p).unwrap_err();
        assert!(matches!(err, RunError::InvalidParameters(msg) if msg.contains("problem path")));
    }

    #[test]
    fn rejects_empty_log_path() {
        let p = RunParameters {
            log_path: String::new(),
            ..params()
        };
        assert!(matches!(
            build_args(RunMode::Parallel, &p),
            Err(RunError::InvalidParameters(_))
        ));
    }

    #[test]
    fn rejects_negative_counts_in_parallel_mode() {
        for p in [
            RunParameters {
                num_agents: Some(-1),
                ..params()
            },
            RunParameters {
                timeout_seconds: Some(-5),
                ..params()
            },
            RunParameters {
                max_workers: Some(-2),
                ..params()
            },
        ] {
            assert!(matches!(
                build_args(RunMode::Parallel, &p),
                Err(RunError::InvalidParameters(_))
            ));
        }
    }

    #[test]
    fn builder_uses_mode_entrypoint() {
        let inv = builder().build(RunMode::Parallel, &params()).unwrap();
        assert_eq!(inv.program, PathBuf::from("python3"));
        assert_eq!(inv.script, Some(PathBuf::from("code/run_parallel.py")));
        assert_eq!(inv.args, ["problems/p1.txt", "-d", "run_logs"]);
    }

    #[test]
    fn builder_is_deterministic() {
        let p = RunParameters {
            num_agents: Some(3),
            other_prompts: Some("x".into()),
            ..params()
        };
        let b = builder();
        assert_eq!(
            b.build(RunMode::Parallel, &p).unwrap(),
            b.build(RunMode::Parallel, &p).unwrap()
        );
    }
}
