//! PNG output through GDAL.
//!
//! The PNG driver only supports `CreateCopy`, so the image is first split
//! into bands of an in-memory dataset and then copied out. Resolution is
//! passed as TIFF resolution tags, which the driver writes as a `pHYs`
//! chunk; the remaining metadata lands in `tEXt` chunks.
use std::path::Path;

use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::{DriverManager, Metadata};
use image::RgbImage;
use ndarray::{ArrayView3, s};
use tracing::debug;

use crate::error::{Error, Result};

/// Text metadata written alongside the image
#[derive(Debug, Clone, Default)]
pub struct PngMetadata {
    pub title: String,
    pub entries: Vec<(String, String)>,
}

/// Write `image` as an RGB PNG at `dpi` to `output`.
pub fn write_rgb_png(
    output: &Path,
    image: &RgbImage,
    dpi: u32,
    metadata: &PngMetadata,
) -> Result<()> {
    // Keep GDAL from writing .aux.xml sidecars next to the output
    gdal::config::set_config_option("GDAL_PAM_ENABLED", "NO")?;

    let (cols, rows) = (image.width() as usize, image.height() as usize);
    let pixels = ArrayView3::from_shape((rows, cols, 3), image.as_raw().as_slice())
        .map_err(|e| Error::Render(format!("image buffer: {}", e)))?;
    let mem = DriverManager::get_driver_by_name("MEM")?;
    let mut ds = mem.create_with_band_type::<u8, _>("", cols, rows, 3)?;
    for channel in 0..3 {
        let mut band = ds.rasterband(channel + 1)?;
        let data: Vec<u8> = pixels.slice(s![.., .., channel]).iter().copied().collect();
        let mut buf = Buffer::new((cols, rows), data);
        band.write((0, 0), (cols, rows), &mut buf)?;
    }

    let dpi = dpi.to_string();
    ds.set_metadata_item("TIFFTAG_XRESOLUTION", &dpi, "")?;
    ds.set_metadata_item("TIFFTAG_YRESOLUTION", &dpi, "")?;
    // 2 = pixels per inch
    ds.set_metadata_item("TIFFTAG_RESOLUTIONUNIT", "2", "")?;
    for (key, value) in &metadata.entries {
        ds.set_metadata_item(key, value, "")?;
    }

    let mut options = CslStringList::new();
    options.set_name_value("WRITE_METADATA_AS_TEXT", "YES")?;
    if !metadata.title.is_empty() {
        options.set_name_value("TITLE", &metadata.title)?;
    }

    let png = DriverManager::get_driver_by_name("PNG")?;
    let out = ds.create_copy(&png, output, &options)?;
    drop(out);
    debug!("Wrote {}x{} PNG to {}", cols, rows, output.display());
    Ok(())
}
