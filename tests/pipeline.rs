mod common;

use std::collections::HashSet;
use std::path::Path;

use acqmap::io::writers::read_joined_table;
use acqmap::{PipelineConfig, TileId, aggregate_item_index, generate_report_from_paths};
use common::{square, write_items};

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        output_png: dir.join("acq-by-wrs-tile.png"),
        output_parquet: dir.join("acq-by-wrs-tile.parquet"),
        workers: Some(2),
        ..PipelineConfig::default()
    }
}

#[test]
fn three_scenes_on_two_tiles() {
    let input = tempfile::tempdir().unwrap();
    write_items(
        &input.path().join("part-0.parquet"),
        &[
            (1, 1, Some(square(0.0, 0.0))),
            (1, 1, Some(square(0.0, 0.0))),
            (2, 5, Some(square(3.0, 0.0))),
        ],
    );

    let rows = aggregate_item_index(&[input.path()], &PipelineConfig::default()).unwrap();
    let got: Vec<(TileId, Option<u64>)> = rows.iter().map(|r| (r.tile, r.count)).collect();
    assert_eq!(
        got,
        vec![(TileId::new(1, 1), Some(2)), (TileId::new(2, 5), Some(1))]
    );
    assert!(rows.iter().all(|r| r.geometry.is_some()));
}

#[test]
fn join_is_complete_without_duplicates_across_parts() {
    let input = tempfile::tempdir().unwrap();
    for part in 0..5 {
        let rows: Vec<(i64, i64, Option<Vec<u8>>)> = (0..4)
            .map(|i| (10 + i, 20 + (part + i) % 3, Some(square(i as f64, part as f64))))
            .collect();
        write_items(&input.path().join(format!("part-{part}.parquet")), &rows);
    }
    let config = PipelineConfig {
        npartitions: 3,
        workers: Some(3),
        ..PipelineConfig::default()
    };
    let rows = aggregate_item_index(&[input.path()], &config).unwrap();

    let tiles: HashSet<TileId> = rows.iter().map(|r| r.tile).collect();
    assert_eq!(tiles.len(), rows.len(), "each tile appears once");
    assert_eq!(rows.iter().map(|r| r.count.unwrap()).sum::<u64>(), 20);
    let mut sorted = rows.clone();
    sorted.sort_by_key(|r| r.tile);
    assert_eq!(sorted, rows);
}

#[test]
fn first_non_null_geometry_is_kept() {
    let input = tempfile::tempdir().unwrap();
    write_items(
        &input.path().join("a.parquet"),
        &[(7, 7, None), (7, 7, Some(square(1.0, 1.0)))],
    );
    write_items(&input.path().join("b.parquet"), &[(7, 7, Some(square(5.0, 5.0)))]);

    let rows = aggregate_item_index(&[input.path()], &PipelineConfig::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, Some(3));
    assert_eq!(rows[0].geometry.as_deref(), Some(square(1.0, 1.0).as_slice()));
}

#[test]
fn report_writes_both_outputs() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_items(
        &input.path().join("part.parquet"),
        &[
            (1, 1, Some(square(0.0, 0.0))),
            (1, 1, Some(square(0.0, 0.0))),
            (2, 5, Some(square(3.0, 0.0))),
        ],
    );
    let config = config_in(out.path());
    let summary = generate_report_from_paths(&[input.path()], "landsat-c2-l2", &config).unwrap();

    assert_eq!(summary.tiles, 2);
    assert_eq!(summary.scenes, 3);
    assert_eq!(summary.title, "Landsat acquisitions per WRS tile");
    assert_eq!(summary.render.filled, 2);

    let table = read_joined_table(std::fs::read(&config.output_parquet).unwrap().into()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table[0].tile, TileId::new(1, 1));
    assert_eq!(table[0].count, Some(2));

    let png = gdal::Dataset::open(&config.output_png).unwrap();
    assert_eq!(png.raster_count(), 3);
}

#[test]
fn empty_index_still_writes_png_and_empty_table() {
    let input = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_items(&input.path().join("empty.parquet"), &[]);
    let config = config_in(out.path());

    let summary = generate_report_from_paths(&[input.path()], "landsat-c2-l2", &config).unwrap();
    assert_eq!((summary.tiles, summary.scenes), (0, 0));
    assert!(config.output_png.exists());

    let bytes = bytes::Bytes::from(std::fs::read(&config.output_parquet).unwrap());
    assert!(read_joined_table(bytes.clone()).unwrap().is_empty());
    let builder =
        parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(bytes).unwrap();
    let names: Vec<&str> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .collect();
    assert_eq!(names, vec!["landsat:wrs_path", "landsat:wrs_row", "geometry", "count"]);
}

#[test]
fn repeated_runs_write_identical_tables() {
    let input = tempfile::tempdir().unwrap();
    for part in 0..3 {
        write_items(
            &input.path().join(format!("part-{part}.parquet")),
            &[(part, 1, Some(square(part as f64, 0.0))), (9, 9, Some(square(8.0, 8.0)))],
        );
    }
    let out = tempfile::tempdir().unwrap();
    let config = config_in(out.path());

    generate_report_from_paths(&[input.path()], "landsat-c2-l2", &config).unwrap();
    let first = std::fs::read(&config.output_parquet).unwrap();
    generate_report_from_paths(&[input.path()], "landsat-c2-l2", &config).unwrap();
    let second = std::fs::read(&config.output_parquet).unwrap();
    assert_eq!(first, second);
}

#[test]
fn failed_run_leaves_no_outputs() {
    let input = tempfile::tempdir().unwrap();
    write_items(
        &input.path().join("part.parquet"),
        &[(1, 1, Some(vec![0xde, 0xad]))],
    );
    let out = tempfile::tempdir().unwrap();
    let config = config_in(out.path());

    let err = generate_report_from_paths(&[input.path()], "landsat-c2-l2", &config).unwrap_err();
    assert!(matches!(err, acqmap::Error::Geometry(_)));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}
