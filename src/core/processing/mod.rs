//! Processing stages between loading and output: per-tile aggregation,
//! the count/geometry join, and the pipeline that sequences them.
pub mod aggregate;
pub mod join;
pub mod pipeline;

pub use aggregate::{Materialized, count_by_tile, distinct_tile_geometries};
pub use join::left_join;
pub use pipeline::{ReportSummary, build_report, run_pipeline};
