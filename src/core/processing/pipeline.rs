//! End-to-end acquisition report: resolve the collection's item index,
//! count scenes per WRS tile, attach one footprint per tile, render the
//! choropleth and persist the PNG and Parquet outputs.
use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use super::aggregate::{count_by_tile, distinct_tile_geometries};
use super::join::left_join;
use crate::cluster::ComputeCluster;
use crate::core::params::PipelineConfig;
use crate::core::render::{FigureLayout, RenderStats, render_choropleth};
use crate::error::Result;
use crate::io::stac::http_client;
use crate::io::writers::{PngMetadata, persist_outputs};
use crate::io::{CatalogClient, ItemIndex, Signer};

/// What a successful run produced
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub collection_id: String,
    pub title: String,
    /// Rows in the joined table
    pub tiles: usize,
    /// Scenes counted across all tiles
    pub scenes: u64,
    pub render: RenderStats,
    pub png: PathBuf,
    pub parquet: PathBuf,
}

/// Run the whole pipeline for `collection_id` on `cluster`.
pub fn run_pipeline(
    collection_id: &str,
    config: &PipelineConfig,
    cluster: &ComputeCluster,
) -> Result<ReportSummary> {
    info!("Looking up collection '{}' at {}", collection_id, config.catalog_url);
    let catalog = CatalogClient::open(&config.catalog_url, config.http_timeout)?;
    let collection = catalog.get_collection(collection_id)?;
    let asset = collection.asset(&config.asset_key)?;

    info!("Signing asset {}", asset.href);
    let signed = Signer::new(&config.sas_url, config.http_timeout)?.sign(asset)?;

    info!(
        "Loading item index with {} partition(s) on cluster '{}'",
        config.npartitions,
        cluster.name()
    );
    let http = http_client(config.http_timeout)?;
    let index = ItemIndex::open_signed(&http, &signed, config.npartitions)?;

    let title = PipelineConfig::title_for(collection_id, collection.title.as_deref());
    build_report(&index, cluster, collection_id, &title, config)
}

/// Aggregate, join, render and persist from an already opened item index.
pub fn build_report(
    index: &ItemIndex,
    cluster: &ComputeCluster,
    collection_id: &str,
    title: &str,
    config: &PipelineConfig,
) -> Result<ReportSummary> {
    info!(
        "Item index {}: {} part(s) in {} partition(s)",
        index.source(),
        index.nparts(),
        index.npartitions()
    );

    info!("Aggregating acquisitions per WRS tile");
    let counts = count_by_tile(index, cluster)?;
    let scenes = counts.stats.rows;
    if counts.stats.skipped_null_keys > 0 {
        warn!(
            "Skipped {} row(s) with null grid coordinates",
            counts.stats.skipped_null_keys
        );
    }

    info!("Extracting unique tile geometries");
    let geometries = distinct_tile_geometries(index, cluster)?;

    info!("Joining counts with geometries");
    let joined = left_join(geometries.rows, &counts.rows);
    let unmatched = joined.iter().filter(|t| t.count.is_none()).count();
    if unmatched > 0 {
        warn!("{} tile(s) have a geometry but no count", unmatched);
    }

    info!("Rendering map");
    let (image, render) = render_choropleth(&joined, title, &FigureLayout::for_dpi(config.dpi))?;
    info!(
        "Rendered {} filled tile(s) into a {}x{} image",
        render.filled,
        image.width(),
        image.height()
    );

    let metadata = PngMetadata {
        title: title.to_string(),
        entries: vec![
            ("COLLECTION".to_string(), collection_id.to_string()),
            ("TILE_COUNT".to_string(), joined.len().to_string()),
            ("SCENE_COUNT".to_string(), scenes.to_string()),
            ("CREATED".to_string(), Utc::now().to_rfc3339()),
            (
                "SOFTWARE".to_string(),
                format!("acqmap {}", env!("CARGO_PKG_VERSION")),
            ),
        ],
    };
    persist_outputs(
        &image,
        config.dpi,
        &metadata,
        &joined,
        &config.output_png,
        &config.output_parquet,
    )?;

    Ok(ReportSummary {
        collection_id: collection_id.to_string(),
        title: title.to_string(),
        tiles: joined.len(),
        scenes,
        render,
        png: config.output_png.clone(),
        parquet: config.output_parquet.clone(),
    })
}
