//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (launch, rerun, quit) and post-run
//! summaries. UI/CLI layers call into this module to keep responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, start_run, LaunchPlan, UiCommand};
pub(crate) use post_process::{failed_summary, summarize_run};
