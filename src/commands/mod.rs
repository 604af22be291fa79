//! CLI command implementations.

pub mod run;

pub use run::{PipelineCommand, RunMode, RunOptions, RunOutcome};
