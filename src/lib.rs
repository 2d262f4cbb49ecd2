#![doc = r#"
acqmap: acquisitions per WRS tile from a STAC GeoParquet item index.

This crate resolves a STAC collection (Landsat Collection 2 Level-2 by default) to
its `geoparquet-items` asset, signs it with a short-lived SAS token, and reads the
item index as a partitioned dataset projected to `landsat:wrs_path`,
`landsat:wrs_row` and `geometry`. Scenes are counted per WRS tile on a compute
cluster, joined with one footprint per tile, rendered as a choropleth, and written
as `acq-by-wrs-tile.png` and `acq-by-wrs-tile.parquet`. It powers the `acqmap`
CLI and can be embedded in your own Rust applications.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Quick start: report for a catalog collection
--------------------------------------------
```rust,no_run
use acqmap::{generate_acquisition_report, PipelineConfig};

fn main() -> acqmap::Result<()> {
    let config = PipelineConfig::from_env()?;
    let summary = generate_acquisition_report("landsat-c2-l2", &config)?;
    println!("{} tiles, {} scenes", summary.tiles, summary.scenes);
    Ok(())
}
```

Offline: aggregate local GeoParquet files
-----------------------------------------
```rust,no_run
use acqmap::{aggregate_item_index, PipelineConfig};

fn main() -> acqmap::Result<()> {
    let rows = aggregate_item_index(&["/data/items"], &PipelineConfig::default())?;
    for row in rows {
        println!("{} {:?}", row.tile, row.count);
    }
    Ok(())
}
```

Clusters
--------
Partition work runs on a [`ComputeCluster`]. `ClusterSelector::Ephemeral` starts a
local worker pool for the run and shuts it down afterwards; `ClusterSelector::Named`
attaches to a running cluster registered with a gateway and leaves it running.

Error handling
--------------
All public functions return `acqmap::Result<T>`; match on `acqmap::Error` to handle
specific cases.

```rust,no_run
use acqmap::{generate_acquisition_report, Error, PipelineConfig};
use acqmap::io::CatalogError;

fn main() {
    match generate_acquisition_report("no-such-collection", &PipelineConfig::default()) {
        Ok(_) => {}
        Err(Error::Catalog(CatalogError::CollectionNotFound(id))) => {
            eprintln!("unknown collection {id}")
        }
        Err(other) => eprintln!("failed: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level entry points.
- [`cluster`]: cluster acquisition and scoped release.
- [`io`]: catalog, signing, blob, item index and output writers.
- [`core`]: configuration, aggregation pipeline and rendering.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod cluster;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::params::PipelineConfig;
pub use core::processing::ReportSummary;
pub use error::{Error, Result};
pub use types::{ClusterSelector, JoinedTile, TileCount, TileGeometry, TileId};

// Cluster
pub use cluster::{ClusterError, ComputeCluster, with_cluster};

// Readers
pub use io::{CatalogError, ItemIndex, ItemIndexError};

// High-level API re-exports
pub use api::{aggregate_item_index, generate_acquisition_report, generate_report_from_paths};
