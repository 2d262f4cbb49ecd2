//! Shared types used across acqmap.
//! Includes the WRS `TileId`, the per-tile aggregation rows (`TileCount`,
//! `TileGeometry`, `JoinedTile`) and the `ClusterSelector` resolved at startup.
use serde::{Deserialize, Serialize};

/// One WRS grid cell. Ordered by path, then row.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TileId {
    pub path: i64,
    pub row: i64,
}

impl TileId {
    pub fn new(path: i64, row: i64) -> Self {
        Self { path, row }
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}/{:03}", self.path, self.row)
    }
}

/// Number of scene records observed for a tile
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TileCount {
    pub tile: TileId,
    pub count: u64,
}

/// Footprint retained for a tile after deduplication (WKB encoded)
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TileGeometry {
    pub tile: TileId,
    pub geometry: Option<Vec<u8>>,
}

/// Row of the left join of tile geometries with tile counts
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct JoinedTile {
    pub tile: TileId,
    pub geometry: Option<Vec<u8>>,
    /// None only when a geometry had no matching count row
    pub count: Option<u64>,
}

/// Where partition work is executed
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum ClusterSelector {
    /// Spin up a local pool owned (and released) by this run
    #[default]
    Ephemeral,
    /// Attach to a pre-provisioned cluster by name; never shut down by us
    Named(String),
}

impl ClusterSelector {
    /// Absent or blank names select a local ephemeral cluster.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(n) if !n.is_empty() => ClusterSelector::Named(n.to_string()),
            _ => ClusterSelector::Ephemeral,
        }
    }
}

impl std::fmt::Display for ClusterSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterSelector::Ephemeral => write!(f, "ephemeral local cluster"),
            ClusterSelector::Named(name) => write!(f, "named cluster '{}'", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_ids_order_by_path_then_row() {
        let mut tiles = vec![TileId::new(2, 5), TileId::new(1, 9), TileId::new(1, 1)];
        tiles.sort();
        assert_eq!(tiles, vec![TileId::new(1, 1), TileId::new(1, 9), TileId::new(2, 5)]);
    }

    #[test]
    fn tile_id_display_is_zero_padded() {
        assert_eq!(TileId::new(44, 7).to_string(), "044/007");
    }

    #[test]
    fn blank_cluster_name_selects_ephemeral() {
        assert_eq!(ClusterSelector::from_name(None), ClusterSelector::Ephemeral);
        assert_eq!(ClusterSelector::from_name(Some("  ")), ClusterSelector::Ephemeral);
        assert_eq!(
            ClusterSelector::from_name(Some("prod-a")),
            ClusterSelector::Named("prod-a".to_string())
        );
    }
}
