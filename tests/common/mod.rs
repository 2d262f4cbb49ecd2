#![allow(dead_code)]

pub mod server;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryArray, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use gdal::vector::Geometry;
use parquet::arrow::ArrowWriter;

/// WKB of the 1x1 degree square with lower-left corner (x, y).
pub fn square(x: f64, y: f64) -> Vec<u8> {
    let wkt = format!(
        "POLYGON (({x} {y}, {x1} {y}, {x1} {y1}, {x} {y1}, {x} {y}))",
        x1 = x + 1.0,
        y1 = y + 1.0
    );
    Geometry::from_wkt(&wkt).unwrap().wkb().unwrap()
}

/// WKB of a `vertices`-gon of radius 0.5 centred in the unit square at (x, y).
/// Large vertex counts give footprints that dominate a part's size.
pub fn polygon(x: f64, y: f64, vertices: usize) -> Vec<u8> {
    let mut ring: Vec<String> = (0..vertices)
        .map(|i| {
            let angle = i as f64 / vertices as f64 * std::f64::consts::TAU;
            format!("{} {}", x + 0.5 + 0.5 * angle.cos(), y + 0.5 + 0.5 * angle.sin())
        })
        .collect();
    ring.push(ring[0].clone());
    let wkt = format!("POLYGON (({}))", ring.join(", "));
    Geometry::from_wkt(&wkt).unwrap().wkb().unwrap()
}

/// Write one item-index part with the three projected columns and an extra `id` column.
pub fn write_items(path: &Path, rows: &[(i64, i64, Option<Vec<u8>>)]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("landsat:wrs_path", DataType::Int64, true),
        Field::new("landsat:wrs_row", DataType::Int64, true),
        Field::new("geometry", DataType::Binary, true),
    ]));
    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(0..rows.len() as i64));
    let paths: ArrayRef = Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.0)));
    let grid_rows: ArrayRef = Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1)));
    let geometries: ArrayRef = Arc::new(BinaryArray::from(
        rows.iter().map(|r| r.2.as_deref()).collect::<Vec<_>>(),
    ));
    let batch =
        RecordBatch::try_new(schema.clone(), vec![ids, paths, grid_rows, geometries]).unwrap();
    let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}
