//! Command Line Interface (CLI) layer for acqmap.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`): logging setup, configuration
//! from the environment, cluster selection and the exit status. It wires
//! user-provided options to the library functionality in `acqmap::api`.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
