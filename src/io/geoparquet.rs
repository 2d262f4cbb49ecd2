//! Lazy, partitioned access to a STAC GeoParquet item index.
//!
//! An `ItemIndex` is only a plan: the list of part files split into
//! partitions, plus the three columns every part must provide. Nothing is
//! read until a caller scans a partition, and each scan projects only the
//! columns it asks for. Remote parts fetch only the byte ranges of the
//! projected column chunks. Scans never mutate the index, so independent
//! queries can run over the same handle.
use std::fs::{self, File};
use std::ops::Range;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int64Type};
use arrow::error::ArrowError;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
};
use parquet::errors::ParquetError;
use parquet::file::reader::ChunkReader;
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::blob::{RemoteFile, list_dataset_parts};
use super::signing::SignedAsset;
use super::stac::CatalogError;
use crate::core::params::{GEOMETRY_COLUMN, PATH_COLUMN, ROW_COLUMN};
use crate::types::TileId;

const BATCH_SIZE: usize = 64 * 1024;

/// Errors encountered while opening or scanning the item index
#[derive(Debug, Error)]
pub enum ItemIndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Parquet error in {file}: {source}")]
    Parquet {
        file: String,
        #[source]
        source: ParquetError,
    },
    #[error("Arrow error in {file}: {source}")]
    Arrow {
        file: String,
        #[source]
        source: ArrowError,
    },
    #[error("Missing column `{column}` in {file}")]
    MissingColumn { column: &'static str, file: String },
    #[error("Column `{column}` in {file} has unsupported type {data_type}")]
    ColumnType {
        column: &'static str,
        file: String,
        data_type: DataType,
    },
    #[error("Column `{column}` in {file} holds {count} value(s) that are not integers")]
    InvalidValue {
        column: &'static str,
        file: String,
        count: usize,
    },
    #[error("No Parquet parts found under {0}")]
    NoParts(String),
}

/// A single Parquet file of the item index
#[derive(Clone)]
pub enum PartSource {
    Local(PathBuf),
    Remote { name: String, file: RemoteFile },
}

impl PartSource {
    pub fn name(&self) -> String {
        match self {
            PartSource::Local(path) => path.display().to_string(),
            PartSource::Remote { name, .. } => name.clone(),
        }
    }
}

impl std::fmt::Debug for PartSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PartSource({})", self.name())
    }
}

/// Contiguous run of part files processed as one unit of work
#[derive(Debug, Clone)]
pub struct Partition {
    pub index: usize,
    pub parts: Vec<PartSource>,
}

/// A scene row as seen by a partition scan
#[derive(Debug, Clone, Copy)]
pub struct SceneRow<'a> {
    pub tile: TileId,
    /// WKB footprint; None when not projected or null
    pub geometry: Option<&'a [u8]>,
}

/// Row accounting for one scan
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub rows: u64,
    pub skipped_null_keys: u64,
}

impl ScanStats {
    pub fn merge(self, other: ScanStats) -> ScanStats {
        ScanStats {
            rows: self.rows + other.rows,
            skipped_null_keys: self.skipped_null_keys + other.skipped_null_keys,
        }
    }
}

/// Which columns a scan reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Grid coordinates only
    TileIds,
    /// Grid coordinates and geometry
    TilesWithGeometry,
}

/// Lazily evaluated, partitioned item index
#[derive(Debug, Clone)]
pub struct ItemIndex {
    source: String,
    partitions: Vec<Partition>,
}

impl ItemIndex {
    /// Split `parts` into at most `npartitions` contiguous partitions whose
    /// sizes differ by at most one.
    pub fn from_parts(
        source: impl Into<String>,
        parts: Vec<PartSource>,
        npartitions: usize,
    ) -> Self {
        let n = parts.len();
        let count = npartitions.max(1).min(n);
        let mut partitions = Vec::with_capacity(count);
        let mut iter = parts.into_iter();
        for index in 0..count {
            let size = n / count + usize::from(index < n % count);
            partitions.push(Partition {
                index,
                parts: iter.by_ref().take(size).collect(),
            });
        }
        Self {
            source: source.into(),
            partitions,
        }
    }

    /// Open local Parquet files and/or directories of Parquet files (searched recursively).
    pub fn open_local<I, P>(paths: I, npartitions: usize) -> Result<Self, ItemIndexError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut files = Vec::new();
        let mut roots = Vec::new();
        for path in paths {
            let path = path.as_ref();
            roots.push(path.display().to_string());
            collect_parquet_files(path, &mut files)?;
        }
        let source = roots.join(", ");
        if files.is_empty() {
            return Err(ItemIndexError::NoParts(source));
        }
        let parts = files.into_iter().map(PartSource::Local).collect();
        Ok(Self::from_parts(source, parts, npartitions))
    }

    /// Open the parts of a signed blob asset. Only the container listing is fetched here.
    pub fn open_signed(
        http: &Client,
        asset: &SignedAsset,
        npartitions: usize,
    ) -> Result<Self, ItemIndexError> {
        let listing = list_dataset_parts(http, asset)?;
        let source = format!(
            "{}/{}/{}",
            asset.location.account, asset.location.container, asset.location.prefix
        );
        if listing.is_empty() {
            return Err(ItemIndexError::NoParts(source));
        }
        let total_bytes: u64 = listing.iter().map(|b| b.size).sum();
        info!(
            "Item index {}: {} part(s), {:.1} MB",
            source,
            listing.len(),
            total_bytes as f64 / 1024.0 / 1024.0
        );
        let mut parts = Vec::with_capacity(listing.len());
        for blob in listing {
            let url = asset.blob_url(&blob.name)?;
            parts.push(PartSource::Remote {
                file: RemoteFile::new(http.clone(), url, blob.size),
                name: blob.name,
            });
        }
        Ok(Self::from_parts(source, parts, npartitions))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn npartitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn nparts(&self) -> usize {
        self.partitions.iter().map(|p| p.parts.len()).sum()
    }

    /// Read every row of `partition`, calling `visit` for rows with non-null grid coordinates.
    pub fn scan_partition<F>(
        &self,
        partition: &Partition,
        projection: Projection,
        mut visit: F,
    ) -> Result<ScanStats, ItemIndexError>
    where
        F: FnMut(SceneRow<'_>),
    {
        let mut stats = ScanStats::default();
        for part in &partition.parts {
            let name = part.name();
            debug!("Partition {}: scanning {}", partition.index, name);
            let part_stats = match part {
                PartSource::Local(path) => {
                    let file = File::open(path)?;
                    let plan = ScanPlan::load(&file, &name, projection)?;
                    scan_part(file, plan, &name, projection, &mut visit)?
                }
                PartSource::Remote { file, .. } => {
                    let plan = ScanPlan::load(file, &name, projection)?;
                    let chunks = file.fetch_ranges(&plan.byte_ranges()).map_err(|source| {
                        ItemIndexError::Parquet {
                            file: name.clone(),
                            source,
                        }
                    })?;
                    scan_part(chunks, plan, &name, projection, &mut visit)?
                }
            };
            stats = stats.merge(part_stats);
        }
        if stats.skipped_null_keys > 0 {
            warn!(
                "Partition {}: skipped {} row(s) with null grid coordinates",
                partition.index, stats.skipped_null_keys
            );
        }
        Ok(stats)
    }
}

fn collect_parquet_files(path: &Path, out: &mut Vec<PathBuf>) -> Result<(), ItemIndexError> {
    if path.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(path)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();
    for entry in entries {
        let hidden = entry
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(['_', '.']))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        if entry.is_dir() {
            collect_parquet_files(&entry, out)?;
        } else if entry.extension().is_some_and(|ext| ext == "parquet") {
            out.push(entry);
        }
    }
    Ok(())
}

/// Footer metadata of one part plus the columns a scan projects
struct ScanPlan {
    metadata: ArrowReaderMetadata,
    mask: ProjectionMask,
    /// Parquet leaf columns under the projected roots
    leaves: Vec<usize>,
}

impl ScanPlan {
    /// Read the footer of `reader` and resolve the projection. Every part must
    /// carry all three columns, even when a scan reads two.
    fn load<R: ChunkReader>(
        reader: &R,
        file: &str,
        projection: Projection,
    ) -> Result<Self, ItemIndexError> {
        let metadata = ArrowReaderMetadata::load(reader, ArrowReaderOptions::default())
            .map_err(|source| ItemIndexError::Parquet {
                file: file.to_string(),
                source,
            })?;
        let schema = metadata.schema().clone();
        let root_index = |column: &'static str| {
            schema
                .index_of(column)
                .map_err(|_| ItemIndexError::MissingColumn {
                    column,
                    file: file.to_string(),
                })
        };
        let mut roots = vec![root_index(PATH_COLUMN)?, root_index(ROW_COLUMN)?];
        let geometry_idx = root_index(GEOMETRY_COLUMN)?;
        if projection == Projection::TilesWithGeometry {
            roots.push(geometry_idx);
        }

        let descr = metadata.parquet_schema();
        let leaves = (0..descr.num_columns())
            .filter(|&leaf| roots.contains(&descr.get_column_root_idx(leaf)))
            .collect();
        let mask = ProjectionMask::roots(descr, roots);
        Ok(Self {
            metadata,
            mask,
            leaves,
        })
    }

    /// File byte ranges of the projected column chunks across all row groups.
    fn byte_ranges(&self) -> Vec<Range<u64>> {
        self.metadata
            .metadata()
            .row_groups()
            .iter()
            .flat_map(|rg| {
                self.leaves.iter().map(move |&leaf| {
                    let (start, len) = rg.column(leaf).byte_range();
                    start..start + len
                })
            })
            .collect()
    }
}

fn scan_part<R, F>(
    reader: R,
    plan: ScanPlan,
    file: &str,
    projection: Projection,
    visit: &mut F,
) -> Result<ScanStats, ItemIndexError>
where
    R: ChunkReader + 'static,
    F: FnMut(SceneRow<'_>),
{
    let batches = ParquetRecordBatchReaderBuilder::new_with_metadata(reader, plan.metadata)
        .with_projection(plan.mask)
        .with_batch_size(BATCH_SIZE)
        .build()
        .map_err(|source| ItemIndexError::Parquet {
            file: file.to_string(),
            source,
        })?;

    let mut stats = ScanStats::default();
    for batch in batches {
        let batch = batch.map_err(|source| ItemIndexError::Arrow {
            file: file.to_string(),
            source,
        })?;
        let column = |name: &'static str| {
            batch
                .column_by_name(name)
                .cloned()
                .ok_or_else(|| ItemIndexError::MissingColumn {
                    column: name,
                    file: file.to_string(),
                })
        };
        let paths = grid_values(&column(PATH_COLUMN)?, PATH_COLUMN, file)?;
        let rows = grid_values(&column(ROW_COLUMN)?, ROW_COLUMN, file)?;
        let geometries = match projection {
            Projection::TileIds => None,
            Projection::TilesWithGeometry => Some(wkb_values(&column(GEOMETRY_COLUMN)?, file)?),
        };
        let paths = paths.as_primitive::<Int64Type>();
        let rows = rows.as_primitive::<Int64Type>();
        let geometries = geometries.as_ref().map(|g| g.as_binary::<i64>());

        for i in 0..batch.num_rows() {
            if paths.is_null(i) || rows.is_null(i) {
                stats.skipped_null_keys += 1;
                continue;
            }
            let geometry = geometries.and_then(|g| (!g.is_null(i)).then(|| g.value(i)));
            visit(SceneRow {
                tile: TileId::new(paths.value(i), rows.value(i)),
                geometry,
            });
            stats.rows += 1;
        }
    }
    Ok(stats)
}

fn is_grid_type(data_type: &DataType) -> bool {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 => true,
        DataType::Dictionary(_, value) => is_grid_type(value),
        other => other.is_integer(),
    }
}

/// Cast an integer or digit-string grid column to Int64; unparseable values are errors.
fn grid_values(
    array: &ArrayRef,
    column: &'static str,
    file: &str,
) -> Result<ArrayRef, ItemIndexError> {
    if !is_grid_type(array.data_type()) {
        return Err(ItemIndexError::ColumnType {
            column,
            file: file.to_string(),
            data_type: array.data_type().clone(),
        });
    }
    let values = cast(array, &DataType::Int64).map_err(|source| ItemIndexError::Arrow {
        file: file.to_string(),
        source,
    })?;
    // A safe cast turns unparseable strings into nulls
    let invalid = values.null_count() - array.null_count();
    if invalid > 0 {
        return Err(ItemIndexError::InvalidValue {
            column,
            file: file.to_string(),
            count: invalid,
        });
    }
    Ok(values)
}

fn wkb_values(array: &ArrayRef, file: &str) -> Result<ArrayRef, ItemIndexError> {
    match array.data_type() {
        DataType::Binary | DataType::LargeBinary => {
            cast(array, &DataType::LargeBinary).map_err(|source| ItemIndexError::Arrow {
                file: file.to_string(),
                source,
            })
        }
        other => Err(ItemIndexError::ColumnType {
            column: GEOMETRY_COLUMN,
            file: file.to_string(),
            data_type: other.clone(),
        }),
    }
}
