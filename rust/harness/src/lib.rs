#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

//! Re-ID Experiment Harness
//!
//! Resolves experiment selectors into a plan, runs each experiment as an
//! external process with a timeout, and reports progress and a final summary.

pub mod config;
pub mod plan;
pub mod report;
pub mod runner;
pub mod scheduler;

pub use config::{HarnessConfig, HarnessSettings};
pub use plan::{ResolvedPlan, resolve};
pub use report::{Reporter, RunReport};
pub use runner::{Dispatch, JobOutcome, JobStatus, Runner};
pub use scheduler::{BatchState, RunSummary, Scheduler};
