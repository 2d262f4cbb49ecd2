//! Output writers: the rendered map as PNG and the joined table as Parquet.
//!
//! `persist_outputs` stages both files as temporaries beside their
//! destinations and moves them into place only after both were written, so
//! a failed write leaves previous outputs untouched and no partial files.
//! The two renames are not atomic as a pair: if the second fails, the PNG
//! moved by the first is removed, so a new map never sits next to a stale
//! table. The previous PNG is not restored in that case.
pub mod parquet;
pub mod png;

use std::io::Write;
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use tracing::{info, warn};

use image::RgbImage;

use crate::error::Result;
use crate::types::JoinedTile;

pub use self::parquet::{encode_joined_table, joined_schema, read_joined_table};
pub use self::png::{PngMetadata, write_rgb_png};

fn staging_file(dest: &Path) -> Result<NamedTempFile> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let suffix = dest
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    Ok(Builder::new()
        .prefix(".acqmap-")
        .suffix(&suffix)
        .tempfile_in(dir)?)
}

/// Write the map and the table, then move both into place.
pub fn persist_outputs(
    image: &RgbImage,
    dpi: u32,
    metadata: &PngMetadata,
    rows: &[JoinedTile],
    png_path: &Path,
    parquet_path: &Path,
) -> Result<()> {
    let png_tmp = staging_file(png_path)?;
    write_rgb_png(png_tmp.path(), image, dpi, metadata)?;

    let mut parquet_tmp = staging_file(parquet_path)?;
    parquet_tmp.write_all(&encode_joined_table(rows)?)?;
    parquet_tmp.as_file().sync_all()?;

    png_tmp.persist(png_path).map_err(|e| e.error)?;
    if let Err(e) = parquet_tmp.persist(parquet_path) {
        warn!(
            "Could not move joined table into place; removing {}",
            png_path.display()
        );
        if let Err(cleanup) = std::fs::remove_file(png_path) {
            warn!("Failed to remove {}: {}", png_path.display(), cleanup);
        }
        return Err(e.error.into());
    }
    info!("Saved map to {}", png_path.display());
    info!("Saved joined table to {}", parquet_path.display());
    Ok(())
}
