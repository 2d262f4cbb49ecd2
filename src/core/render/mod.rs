//! Raster rendering of the acquisition map: drawing helpers over
//! `image::RgbImage`, the viridis color scale, bundled label text and the
//! choropleth layout.
pub mod canvas;
pub mod choropleth;
pub mod colormap;
pub mod text;

pub use choropleth::{FigureLayout, RenderStats, render_choropleth};
