//! Crate-level error type and `Result` alias for structured error handling.
//! Converts catalog, item index, cluster, GDAL and I/O errors, and provides
//! semantic variants for configuration and rendering failures.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] crate::io::CatalogError),

    #[error("Item index error: {0}")]
    ItemIndex(#[from] crate::io::ItemIndexError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] crate::cluster::ClusterError),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] crate::io::gdal::GdalError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl Error {
    /// Iterator over this error followed by its `source()` chain.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn std::error::Error + 'static)> {
        std::iter::successors(
            Some(self as &(dyn std::error::Error + 'static)),
            |e| e.source(),
        )
    }
}
