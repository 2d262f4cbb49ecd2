//! Core building blocks: run configuration (`params`), the aggregation
//! pipeline (`processing`) and map rendering (`render`). These are internal
//! primitives consumed by the high-level `api` module.
pub mod params;
pub mod processing;
pub mod render;
