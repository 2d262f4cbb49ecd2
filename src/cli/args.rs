use clap::Parser;
use std::path::PathBuf;

use acqmap::core::params::DEFAULT_COLLECTION_ID;

#[derive(Parser)]
#[command(
    name = "acqmap",
    version,
    about = "Count acquisitions per WRS tile and map them",
    after_help = "Environment: ACQMAP_CLUSTER, ACQMAP_GATEWAY_URL, ACQMAP_CATALOG_URL, \
                  ACQMAP_SAS_URL, ACQMAP_WORKERS, RUST_LOG"
)]
pub struct CliArgs {
    /// STAC collection whose item index is aggregated
    #[arg(long, default_value = DEFAULT_COLLECTION_ID)]
    pub collection_id: String,

    /// Read the item index from local GeoParquet files or directories instead of the catalog
    #[arg(long, num_args = 1..)]
    pub input: Vec<PathBuf>,
}
