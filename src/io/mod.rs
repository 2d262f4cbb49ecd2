//! I/O layer: the STAC catalog client, SAS signing of blob assets, blob
//! listing and ranged reads, the partitioned GeoParquet item index, GDAL
//! footprint decoding, and the `writers` for PNG and Parquet outputs.
pub mod blob;
pub mod gdal;
pub mod geoparquet;
pub mod signing;
pub mod stac;
pub mod writers;

pub use geoparquet::{ItemIndex, ItemIndexError, Partition, Projection, ScanStats};
pub use signing::{SignedAsset, Signer};
pub use stac::{CatalogClient, CatalogError, Collection};
