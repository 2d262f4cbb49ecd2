//! acqmap CLI entrypoint.
//!
//! Thin wrapper over the `cli` module: parse args, run the report and exit
//! with 0 on success or 1 on failure (after the cluster was released).
//! For programmatic use, prefer the library API (`acqmap::api`).

use std::process::ExitCode;

use clap::Parser;

mod cli;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();
    cli::run(args)
}
