//! Launcher layout: where the solver scripts live and where problems and logs go.

use crate::engine::{CommandBuilder, Entrypoint};
use crate::model::RunMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Program that runs the solver scripts
    pub interpreter: PathBuf,
    pub code_dir: PathBuf,
    pub single_script: PathBuf,
    pub parallel_script: PathBuf,
    pub problems_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            code_dir: PathBuf::from("code"),
            single_script: PathBuf::from("agent.py"),
            parallel_script: PathBuf::from("run_parallel.py"),
            problems_dir: PathBuf::from("problems"),
            logs_dir: PathBuf::from("run_logs"),
        }
    }
}

impl LauncherConfig {
    /// Load from `explicit` if given (it must exist), else from the user config
    /// directory if a file is there, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn entrypoint(&self, mode: RunMode) -> Entrypoint {
        let script = match mode {
            RunMode::Single => &self.single_script,
            RunMode::Parallel => &self.parallel_script,
        };
        Entrypoint::new(self.interpreter.clone(), Some(self.code_dir.join(script)))
    }

    pub fn command_builder(&self) -> CommandBuilder {
        CommandBuilder::new(
            self.entrypoint(RunMode::Single),
            self.entrypoint(RunMode::Parallel),
        )
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("solver-launcher").join(CONFIG_FILE))
}
