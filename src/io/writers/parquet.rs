//! Parquet encoding of the joined tile table.
//!
//! Columns: `landsat:wrs_path` (Int64), `landsat:wrs_row` (Int64),
//! `geometry` (WKB Binary, nullable), `count` (Int64, nullable). No index
//! column is written. File metadata carries a GeoParquet `geo` entry so
//! geospatial readers recognise the geometry column.
use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array as _, BinaryArray, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::core::params::{COUNT_COLUMN, GEOMETRY_COLUMN, PATH_COLUMN, ROW_COLUMN};
use crate::error::{Error, Result};
use crate::types::{JoinedTile, TileId};

/// Schema of `acq-by-wrs-tile.parquet`
pub fn joined_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(PATH_COLUMN, DataType::Int64, false),
        Field::new(ROW_COLUMN, DataType::Int64, false),
        Field::new(GEOMETRY_COLUMN, DataType::Binary, true),
        Field::new(COUNT_COLUMN, DataType::Int64, true),
    ]))
}

// No `crs` key: GeoParquet readers then default to OGC:CRS84, the lon/lat
// footprints of the item index. An explicit null would mean "unknown".
fn geo_metadata() -> String {
    serde_json::json!({
        "version": "1.0.0",
        "primary_column": GEOMETRY_COLUMN,
        "columns": {
            GEOMETRY_COLUMN: {
                "encoding": "WKB",
                "geometry_types": [],
            }
        }
    })
    .to_string()
}

fn writer_properties() -> WriterProperties {
    let geo = KeyValue {
        key: "geo".to_string(),
        value: Some(geo_metadata()),
    };
    WriterProperties::builder()
        .set_key_value_metadata(Some(vec![geo]))
        .build()
}

fn count_to_i64(tile: &TileId, count: u64) -> Result<i64> {
    i64::try_from(count).map_err(|_| {
        Error::Processing(format!("count {} for tile {} exceeds Int64", count, tile))
    })
}

/// Build the single record batch holding `rows`.
pub fn joined_batch(rows: &[JoinedTile]) -> Result<RecordBatch> {
    let paths = Int64Array::from(rows.iter().map(|r| r.tile.path).collect::<Vec<_>>());
    let grid_rows = Int64Array::from(rows.iter().map(|r| r.tile.row).collect::<Vec<_>>());
    let geometries = BinaryArray::from(
        rows.iter()
            .map(|r| r.geometry.as_deref())
            .collect::<Vec<_>>(),
    );
    let counts = Int64Array::from(
        rows.iter()
            .map(|r| r.count.map(|c| count_to_i64(&r.tile, c)).transpose())
            .collect::<Result<Vec<_>>>()?,
    );

    Ok(RecordBatch::try_new(
        joined_schema(),
        vec![
            Arc::new(paths),
            Arc::new(grid_rows),
            Arc::new(geometries),
            Arc::new(counts),
        ],
    )?)
}

/// Encode `rows` as a Parquet file in memory.
pub fn encode_joined_table(rows: &[JoinedTile]) -> Result<Bytes> {
    let batch = joined_batch(rows)?;
    let mut cursor = Cursor::new(Vec::<u8>::new());
    let mut writer = ArrowWriter::try_new(&mut cursor, joined_schema(), Some(writer_properties()))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(Bytes::from(cursor.into_inner()))
}

/// Decode a file written by [`encode_joined_table`].
pub fn read_joined_table(bytes: Bytes) -> Result<Vec<JoinedTile>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
    let mut out = Vec::new();
    for batch in reader {
        let batch = batch?;
        let paths = column::<Int64Array>(&batch, PATH_COLUMN)?;
        let grid_rows = column::<Int64Array>(&batch, ROW_COLUMN)?;
        let geometries = column::<BinaryArray>(&batch, GEOMETRY_COLUMN)?;
        let counts = column::<Int64Array>(&batch, COUNT_COLUMN)?;
        for i in 0..batch.num_rows() {
            out.push(JoinedTile {
                tile: TileId::new(paths.value(i), grid_rows.value(i)),
                geometry: (!geometries.is_null(i)).then(|| geometries.value(i).to_vec()),
                count: (!counts.is_null(i)).then(|| counts.value(i) as u64),
            });
        }
    }
    Ok(out)
}

fn column<'a, A: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<A>())
        .ok_or_else(|| Error::Processing(format!("column '{}' missing or mistyped", name)))
}
