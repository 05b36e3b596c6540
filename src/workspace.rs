//! Problem persistence.
//!
//! Writes the problem text where the solver expects it and derives the log
//! location. This is the only place the launcher itself touches the disk.

use crate::config::LauncherConfig;
use crate::model::{RunMode, RunParameters};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub(crate) struct Workspace {
    problems_dir: PathBuf,
    logs_dir: PathBuf,
}

/// Paths of a problem that has been written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PreparedProblem {
    pub problem_path: PathBuf,
    pub log_path: PathBuf,
}

/// Optional knobs collected from the user before a run.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunOptions {
    pub other_prompts: Option<String>,
    pub num_agents: Option<i64>,
    pub timeout_seconds: Option<i64>,
    pub max_workers: Option<i64>,
}

impl Workspace {
    pub fn new(problems_dir: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            problems_dir: problems_dir.into(),
            logs_dir: logs_dir.into(),
        }
    }

    pub fn from_config(cfg: &LauncherConfig) -> Self {
        Self::new(cfg.problems_dir.clone(), cfg.logs_dir.clone())
    }

    /// Write `text` as `name` (".txt" appended if missing) and create the log directory.
    pub fn prepare(&self, name: &str, text: &str) -> Result<PreparedProblem> {
        let text = text.trim();
        let name = name.trim();
        if text.is_empty() || name.is_empty() {
            bail!("problem text and file name are both required");
        }
        let file_name = normalize_name(name);
        if Path::new(&file_name).file_name() != Some(std::ffi::OsStr::new(&file_name)) {
            bail!("problem file name must not contain a directory: {name}");
        }

        std::fs::create_dir_all(&self.problems_dir)
            .with_context(|| format!("create {}", self.problems_dir.display()))?;
        std::fs::create_dir_all(&self.logs_dir)
            .with_context(|| format!("create {}", self.logs_dir.display()))?;

        let problem_path = self.problems_dir.join(&file_name);
        std::fs::write(&problem_path, text)
            .with_context(|| format!("write problem {}", problem_path.display()))?;
        tracing::debug!(path = %problem_path.display(), "problem written");

        Ok(PreparedProblem {
            log_path: self.log_path_for(&file_name),
            problem_path,
        })
    }

    fn log_path_for(&self, file_name: &str) -> PathBuf {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        self.logs_dir.join(format!("{stem}_log.log"))
    }
}

impl PreparedProblem {
    /// Parameters for `mode`; parallel-only options are dropped in single mode.
    pub fn parameters(&self, mode: RunMode, opts: &RunOptions) -> RunParameters {
        let parallel = mode == RunMode::Parallel;
        RunParameters {
            problem_path: self.problem_path.to_string_lossy().into_owned(),
            log_path: self.log_path.to_string_lossy().into_owned(),
            other_prompts: opts
                .other_prompts
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            num_agents: opts.num_agents.filter(|_| parallel),
            timeout_seconds: opts.timeout_seconds.filter(|_| parallel),
            max_workers: opts.max_workers.filter(|_| parallel),
        }
    }
}

fn normalize_name(name: &str) -> String {
    if name.ends_with(".txt") {
        name.to_string()
    } else {
        format!("{name}.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(root: &Path) -> Workspace {
        Workspace::new(root.join("problems"), root.join("run_logs"))
    }

    #[test]
    fn writes_trimmed_problem_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let prepared = ws.prepare(" imo_p1 ", "\n  Prove that 1 < 2.  \n").unwrap();

        assert_eq!(prepared.problem_path, dir.path().join("problems/imo_p1.txt"));
        assert_eq!(prepared.log_path, dir.path().join("run_logs/imo_p1_log.log"));
        assert_eq!(
            std::fs::read_to_string(&prepared.problem_path).unwrap(),
            "Prove that 1 < 2."
        );
        assert!(dir.path().join("run_logs").is_dir());
    }

    #[test]
    fn keeps_existing_txt_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let prepared = workspace(dir.path()).prepare("p2.txt", "x").unwrap();
        assert_eq!(prepared.problem_path, dir.path().join("problems/p2.txt"));
        assert_eq!(prepared.log_path, dir.path().join("run_logs/p2_log.log"));
    }

    #[test]
    fn rejects_blank_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        assert!(ws.prepare("p", "   ").is_err());
        assert!(ws.prepare("  ", "text").is_err());
        assert!(!dir.path().join("problems").exists());
    }

    #[test]
    fn rejects_names_with_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(workspace(dir.path()).prepare("../escape", "text").is_err());
    }

    #[test]
    fn parameters_follow_mode() {
        let prepared = PreparedProblem {
            problem_path: PathBuf::from("problems/p.txt"),
            log_path: PathBuf::from("run_logs/p_log.log"),
        };
        let opts = RunOptions {
            other_prompts: Some("  ".into()),
            num_agents: Some(10),
            timeout_seconds: Some(0),
            max_workers: Some(2),
        };

        let single = prepared.parameters(RunMode::Single, &opts);
        assert_eq!(single.problem_path, "problems/p.txt");
        assert_eq!(single.other_prompts, None);
        assert_eq!(single.num_agents, None);
        assert_eq!(single.max_workers, None);

        let parallel = prepared.parameters(RunMode::Parallel, &opts);
        assert_eq!(parallel.num_agents, Some(10));
        assert_eq!(parallel.timeout_seconds, Some(0));
        assert_eq!(parallel.max_workers, Some(2));
    }
}
