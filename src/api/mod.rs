//! High-level, ergonomic library API: produce the acquisition report for a
//! catalog collection, build it from local GeoParquet files, or aggregate an
//! item index to in-memory rows. Prefer these entrypoints over the low-level
//! processing modules when embedding acqmap.
use std::path::Path;

use crate::cluster::{ComputeCluster, with_cluster};
use crate::core::params::PipelineConfig;
use crate::core::processing::{
    ReportSummary, build_report, count_by_tile, distinct_tile_geometries, left_join, run_pipeline,
};
use crate::error::Result;
use crate::io::ItemIndex;
use crate::types::JoinedTile;

/// Produce `acq-by-wrs-tile.{png,parquet}` for `collection_id`.
///
/// The cluster selected by `config.cluster` is acquired for the run and
/// released afterwards, whether the run succeeded or not.
pub fn generate_acquisition_report(
    collection_id: &str,
    config: &PipelineConfig,
) -> Result<ReportSummary> {
    let mut cluster = ComputeCluster::acquire(&config.cluster, config)?;
    with_cluster(&mut cluster, |c| run_pipeline(collection_id, config, c))
}

/// Produce the report from local GeoParquet files or directories instead of the catalog.
/// Runs on an ephemeral local cluster.
pub fn generate_report_from_paths<P: AsRef<Path>>(
    paths: &[P],
    collection_id: &str,
    config: &PipelineConfig,
) -> Result<ReportSummary> {
    let index = ItemIndex::open_local(paths, config.npartitions)?;
    let title = PipelineConfig::title_for(collection_id, None);
    let mut cluster = ComputeCluster::local(config.workers)?;
    with_cluster(&mut cluster, |c| {
        build_report(&index, c, collection_id, &title, config)
    })
}

/// Aggregate local GeoParquet files to joined rows (no rendering, no disk output).
pub fn aggregate_item_index<P: AsRef<Path>>(
    paths: &[P],
    config: &PipelineConfig,
) -> Result<Vec<JoinedTile>> {
    let index = ItemIndex::open_local(paths, config.npartitions)?;
    let mut cluster = ComputeCluster::local(config.workers)?;
    with_cluster(&mut cluster, |c| {
        let counts = count_by_tile(&index, c)?;
        let geometries = distinct_tile_geometries(&index, c)?;
        Ok(left_join(geometries.rows, &counts.rows))
    })
}
