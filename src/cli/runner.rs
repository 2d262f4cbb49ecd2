use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use acqmap::api::{generate_acquisition_report, generate_report_from_paths};
use acqmap::core::params::PipelineConfig;
use acqmap::core::processing::ReportSummary;

use super::args::CliArgs;
use super::errors::AppError;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn execute(args: &CliArgs) -> Result<ReportSummary, AppError> {
    let config = PipelineConfig::from_env()?;
    if args.input.is_empty() {
        info!("Cluster: {}", config.cluster);
        return Ok(generate_acquisition_report(&args.collection_id, &config)?);
    }

    if let Some(missing) = args.input.iter().find(|p| !p.exists()) {
        return Err(AppError::InputNotFound {
            path: missing.clone(),
        });
    }
    info!("Reading item index from {} local path(s)", args.input.len());
    Ok(generate_report_from_paths(
        &args.input,
        &args.collection_id,
        &config,
    )?)
}

/// Run the CLI. The cluster is already released when this returns.
pub fn run(args: CliArgs) -> ExitCode {
    init_logging();

    match execute(&args) {
        Ok(summary) => {
            info!(
                "Done: {} tile(s), {} scene(s) -> {}, {}",
                summary.tiles,
                summary.scenes,
                summary.png.display(),
                summary.parquet.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            let mut chain = e.chain().into_iter();
            if let Some(head) = chain.next() {
                error!("Pipeline failed: {}", head);
            }
            for cause in chain {
                error!("  caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}
