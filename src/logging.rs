//! Tracing setup.
//!
//! Filtering follows `RUST_LOG` (default `warn`). While the TUI owns the
//! terminal, events go to a file in the logs directory instead of stderr.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "solver-launcher.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg_attr(not(feature = "tui"), allow(dead_code))]
pub fn init_file(logs_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("create {}", logs_dir.display()))?;
    let path = logs_dir.join(LOG_FILE);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}
