mod cli;
mod config;
mod engine;
mod error;
mod logging;
mod model;
mod orchestrator;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;
mod workspace;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.json || args.text || cfg!(not(feature = "tui"));

    match cli::run(args).await {
        // Non-TUI modes hand the solver's exit code back to the shell.
        Ok(code) if is_non_tui => std::process::exit(code),
        Ok(_) => Ok(()),
        Err(e) => Err(e),
    }
}
