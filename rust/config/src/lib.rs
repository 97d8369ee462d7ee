//! Experiment and group tables shared by the harness crates.

mod tables;
mod types;

pub use tables::*;
pub use types::*;
