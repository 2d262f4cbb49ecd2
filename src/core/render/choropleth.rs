//! Choropleth layout: tile footprints filled by acquisition count on a
//! plate carrée map, a title above and a vertical colorbar to the right.
//! The finished figure is cropped tight around what was drawn.
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use tracing::debug;

use super::canvas::{BLACK, WHITE, crop_to_content, fill_polygon, stroke_ring};
use super::colormap::{Normalize, viridis};
use super::text::{dejavu_sans, px_scale};
use crate::io::gdal::{Bounds, Ring, Shape, decode_wkb};
use crate::types::JoinedTile;

const OUTLINE: Rgb<u8> = Rgb([0x20, 0x20, 0x20]);

/// Figure geometry in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureLayout {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub title_scale: PxScale,
    pub label_scale: PxScale,
    pub colorbar_width: u32,
    pub colorbar_gap: u32,
    /// Whitespace kept around the content when cropping
    pub pad: u32,
}

impl FigureLayout {
    /// A 10 x 8 inch figure at `dpi` with a 12 pt title and 10 pt labels.
    pub fn for_dpi(dpi: u32) -> Self {
        let dpi = dpi.max(1);
        let unit = (dpi / 100).max(1);
        Self {
            width: 10 * dpi,
            height: 8 * dpi,
            margin: 40 * unit,
            title_scale: px_scale(12.0, dpi),
            label_scale: px_scale(10.0, dpi),
            colorbar_width: 20 * unit,
            colorbar_gap: 30 * unit,
            pad: dpi / 10,
        }
    }
}

impl Default for FigureLayout {
    fn default() -> Self {
        Self::for_dpi(200)
    }
}

/// Tiles drawn into the last figure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub filled: usize,
    pub outlined_only: usize,
    pub without_geometry: usize,
}

#[derive(Debug, Clone, Copy)]
struct Projection {
    bounds: Bounds,
    scale: f64,
    x0: f64,
    y0: f64,
}

impl Projection {
    /// Fit `bounds` into the pixel box with equal aspect, centered.
    fn fit(bounds: Bounds, left: f64, top: f64, width: f64, height: f64) -> Self {
        let scale = (width / bounds.width()).min(height / bounds.height());
        let x0 = left + (width - bounds.width() * scale) / 2.0;
        let y0 = top + (height - bounds.height() * scale) / 2.0;
        Self { bounds, scale, x0, y0 }
    }

    fn project(&self, (lon, lat): (f64, f64)) -> (f64, f64) {
        (
            self.x0 + (lon - self.bounds.min_x) * self.scale,
            self.y0 + (self.bounds.max_y - lat) * self.scale,
        )
    }

    fn project_ring(&self, ring: &Ring) -> Ring {
        ring.iter().map(|&p| self.project(p)).collect()
    }

    fn pixel_box(&self) -> (i32, i32, i32, i32) {
        let (x1, y1) = self.project((self.bounds.max_x, self.bounds.min_y));
        (
            self.x0.floor() as i32,
            self.y0.floor() as i32,
            x1.ceil() as i32,
            y1.ceil() as i32,
        )
    }
}

/// Extent of all shapes, widened when degenerate; the world when there are none.
fn map_extent<'a>(shapes: impl Iterator<Item = &'a Shape>) -> Bounds {
    let Some(mut bounds) = shapes.filter_map(Shape::bounds).reduce(Bounds::union) else {
        return Bounds::WORLD;
    };
    if bounds.width() <= 0.0 {
        bounds.min_x -= 1.0;
        bounds.max_x += 1.0;
    }
    if bounds.height() <= 0.0 {
        bounds.min_y -= 1.0;
        bounds.max_y += 1.0;
    }
    bounds
}

fn format_tick(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn ticks(norm: &Normalize) -> [f64; 3] {
    [norm.vmax, (norm.vmin + norm.vmax) / 2.0, norm.vmin]
}

/// Render `tiles` into a figure titled `title`.
///
/// Tiles with a count are filled by the viridis scale; tiles without one keep
/// only their outline. Footprints that fail to decode abort the render.
pub fn render_choropleth(
    tiles: &[JoinedTile],
    title: &str,
    layout: &FigureLayout,
) -> crate::Result<(RgbImage, RenderStats)> {
    let mut stats = RenderStats::default();
    let mut shapes: Vec<(Shape, Option<u64>)> = Vec::with_capacity(tiles.len());
    for tile in tiles {
        match &tile.geometry {
            Some(wkb) => shapes.push((decode_wkb(&tile.tile.to_string(), wkb)?, tile.count)),
            None => stats.without_geometry += 1,
        }
    }

    let norm = Normalize::from_values(shapes.iter().filter_map(|(_, count)| *count));
    let extent = map_extent(shapes.iter().map(|(shape, _)| shape));
    debug!(
        "Map extent lon {:.3}..{:.3} lat {:.3}..{:.3}, counts {}..{}",
        extent.min_x, extent.max_x, extent.min_y, extent.max_y, norm.vmin, norm.vmax
    );

    let font = dejavu_sans()?;
    let mut img = RgbImage::from_pixel(layout.width, layout.height, WHITE);

    let (title_width, title_height) = text_size(layout.title_scale, &font, title);
    let title_x = layout.width.saturating_sub(title_width) / 2;
    draw_text_mut(
        &mut img,
        BLACK,
        title_x as i32,
        layout.margin as i32,
        layout.title_scale,
        &font,
        title,
    );

    let max_label = ticks(&norm)
        .iter()
        .map(|v| text_size(layout.label_scale, &font, &format_tick(*v)).0)
        .max()
        .unwrap_or(0);
    let map_left = layout.margin as f64;
    let map_top = (layout.margin * 2 + title_height) as f64;
    let right_reserve =
        layout.colorbar_gap * 2 + layout.colorbar_width + max_label + layout.margin;
    let map_width = layout.width as f64 - map_left - right_reserve as f64;
    let map_height = layout.height as f64 - map_top - layout.margin as f64;
    if map_width <= 0.0 || map_height <= 0.0 {
        return Err(crate::Error::Render(format!(
            "figure {}x{} leaves no room for the map",
            layout.width, layout.height
        )));
    }
    let projection = Projection::fit(extent, map_left, map_top, map_width, map_height);

    for (shape, count) in &shapes {
        let Some(count) = count else {
            stats.outlined_only += 1;
            continue;
        };
        let color = norm.color(*count);
        for polygon in &shape.polygons {
            let exterior = projection.project_ring(&polygon.exterior);
            let holes: Vec<Ring> =
                polygon.holes.iter().map(|h| projection.project_ring(h)).collect();
            fill_polygon(&mut img, &exterior, &holes, color);
        }
        stats.filled += 1;
    }
    for (shape, _) in &shapes {
        for ring in shape.polygons.iter().flat_map(|p| p.rings()) {
            stroke_ring(&mut img, &projection.project_ring(ring), OUTLINE);
        }
    }

    draw_colorbar(&mut img, &projection, &norm, layout, &font);

    Ok((crop_to_content(&img, WHITE, layout.pad), stats))
}

fn draw_colorbar(
    img: &mut RgbImage,
    projection: &Projection,
    norm: &Normalize,
    layout: &FigureLayout,
    font: &FontRef<'_>,
) {
    let (_, top, right, bottom) = projection.pixel_box();
    let bottom = bottom.max(top + 1);
    let left = right + layout.colorbar_gap as i32;
    let bar_right = left + layout.colorbar_width as i32;
    let span = (bottom - top - 1).max(1) as f64;
    for y in top..bottom {
        let t = 1.0 - (y - top) as f64 / span;
        let value = norm.vmin + t * (norm.vmax - norm.vmin);
        draw_filled_rect_mut(
            img,
            Rect::at(left, y).of_size(layout.colorbar_width, 1),
            viridis(norm.apply(value)),
        );
    }
    draw_hollow_rect_mut(
        img,
        Rect::at(left, top).of_size(layout.colorbar_width, (bottom - top) as u32),
        BLACK,
    );

    let label_x = bar_right + (layout.colorbar_gap / 3) as i32;
    for (value, y) in ticks(norm).into_iter().zip([top, (top + bottom) / 2, bottom - 1]) {
        let label = format_tick(value);
        let (_, text_height) = text_size(layout.label_scale, font, &label);
        draw_line_segment_mut(
            img,
            (bar_right as f32, y as f32),
            ((label_x - 2) as f32, y as f32),
            BLACK,
        );
        draw_text_mut(
            img,
            BLACK,
            label_x,
            y - text_height as i32 / 2,
            layout.label_scale,
            font,
            &label,
        );
    }
}
