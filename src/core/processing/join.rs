use std::collections::HashMap;

use crate::types::{JoinedTile, TileCount, TileGeometry, TileId};

/// Left join of tile geometries with tile counts on the tile id.
/// Every geometry row appears once, in input order; unmatched rows get `count: None`.
pub fn left_join(geometries: Vec<TileGeometry>, counts: &[TileCount]) -> Vec<JoinedTile> {
    let lookup: HashMap<TileId, u64> = counts.iter().map(|c| (c.tile, c.count)).collect();
    geometries
        .into_iter()
        .map(|g| JoinedTile {
            count: lookup.get(&g.tile).copied(),
            tile: g.tile,
            geometry: g.geometry,
        })
        .collect()
}
