//! The two materializations over the item index: per-tile scene counts and
//! one footprint per tile. Each is an independent pass over the same
//! immutable `ItemIndex`; partitions are scanned in parallel on the cluster and
//! their partial results merged in partition order.
use std::collections::{BTreeMap, HashMap};

use tracing::info;

use crate::cluster::ComputeCluster;
use crate::error::{Error, Result};
use crate::io::geoparquet::{ItemIndex, Projection, ScanStats};
use crate::types::{TileCount, TileGeometry, TileId};

/// Rows produced by a materialization plus the scan accounting behind them
#[derive(Debug, Clone)]
pub struct Materialized<T> {
    pub rows: Vec<T>,
    pub stats: ScanStats,
}

/// Group the index by tile and count rows per group. Output is sorted by tile.
pub fn count_by_tile(
    index: &ItemIndex,
    cluster: &ComputeCluster,
) -> Result<Materialized<TileCount>> {
    let partials = cluster.map_partitions::<_, Error, _>(index.partitions(), |partition| {
        let mut counts: HashMap<TileId, u64> = HashMap::new();
        let stats = index.scan_partition(partition, Projection::TileIds, |row| {
            *counts.entry(row.tile).or_insert(0) += 1;
        })?;
        Ok((counts, stats))
    })?;

    let (counts, stats) = merge_counts(partials);
    info!("Counted {} scene(s) across {} tile(s)", stats.rows, counts.len());
    Ok(Materialized {
        rows: counts
            .into_iter()
            .map(|(tile, count)| TileCount { tile, count })
            .collect(),
        stats,
    })
}

/// Keep one geometry per tile: the first non-null one in (partition, file, row) order.
/// Output is sorted by tile.
pub fn distinct_tile_geometries(
    index: &ItemIndex,
    cluster: &ComputeCluster,
) -> Result<Materialized<TileGeometry>> {
    let partials = cluster.map_partitions::<_, Error, _>(index.partitions(), |partition| {
        let mut firsts: HashMap<TileId, Option<Vec<u8>>> = HashMap::new();
        let stats = index.scan_partition(partition, Projection::TilesWithGeometry, |row| {
            let slot = firsts.entry(row.tile).or_insert(None);
            if slot.is_none() {
                *slot = row.geometry.map(<[u8]>::to_vec);
            }
        })?;
        Ok((firsts, stats))
    })?;

    let (firsts, stats) = merge_first_geometries(partials);
    let missing = firsts.values().filter(|g| g.is_none()).count();
    if missing > 0 {
        info!("{} tile(s) have no non-null geometry", missing);
    }
    info!("Extracted {} unique tile geometries", firsts.len());
    Ok(Materialized {
        rows: firsts
            .into_iter()
            .map(|(tile, geometry)| TileGeometry { tile, geometry })
            .collect(),
        stats,
    })
}

fn merge_counts(
    partials: Vec<(HashMap<TileId, u64>, ScanStats)>,
) -> (BTreeMap<TileId, u64>, ScanStats) {
    let mut merged = BTreeMap::new();
    let mut stats = ScanStats::default();
    for (counts, partial_stats) in partials {
        for (tile, count) in counts {
            *merged.entry(tile).or_insert(0) += count;
        }
        stats = stats.merge(partial_stats);
    }
    (merged, stats)
}

/// `partials` must be in partition order; earlier partitions win.
fn merge_first_geometries(
    partials: Vec<(HashMap<TileId, Option<Vec<u8>>>, ScanStats)>,
) -> (BTreeMap<TileId, Option<Vec<u8>>>, ScanStats) {
    let mut merged: BTreeMap<TileId, Option<Vec<u8>>> = BTreeMap::new();
    let mut stats = ScanStats::default();
    for (firsts, partial_stats) in partials {
        for (tile, geometry) in firsts {
            let slot = merged.entry(tile).or_insert(None);
            if slot.is_none() {
                *slot = geometry;
            }
        }
        stats = stats.merge(partial_stats);
    }
    (merged, stats)
}
