//! Drawing helpers over `image::RgbImage`: polygon fills that respect holes,
//! closed ring outlines, and a tight crop around whatever was drawn.
use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Ring vertices snapped to pixels, without repeats or a closing vertex.
/// None when fewer than three distinct vertices remain.
fn pixel_ring(ring: &[(f64, f64)]) -> Option<Vec<Point<i32>>> {
    let mut points: Vec<Point<i32>> = Vec::with_capacity(ring.len());
    for &(x, y) in ring {
        let p = Point::new(x.round() as i32, y.round() as i32);
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    (points.len() >= 3).then_some(points)
}

/// Fill the area inside `exterior` and outside every ring in `holes`.
/// Returns false when the exterior collapses below three pixels.
pub fn fill_polygon(
    img: &mut RgbImage,
    exterior: &[(f64, f64)],
    holes: &[Vec<(f64, f64)>],
    color: Rgb<u8>,
) -> bool {
    let Some(outer) = pixel_ring(exterior) else {
        return false;
    };
    let holes: Vec<Vec<Point<i32>>> = holes.iter().filter_map(|h| pixel_ring(h)).collect();
    if holes.is_empty() {
        draw_polygon_mut(img, &outer, color);
        return true;
    }

    // Holes are punched out of a mask over the visible part of the exterior
    let x0 = outer.iter().map(|p| p.x).min().unwrap_or(0).max(0);
    let y0 = outer.iter().map(|p| p.y).min().unwrap_or(0).max(0);
    let x1 = outer
        .iter()
        .map(|p| p.x)
        .max()
        .unwrap_or(0)
        .min(img.width() as i32 - 1);
    let y1 = outer
        .iter()
        .map(|p| p.y)
        .max()
        .unwrap_or(0)
        .min(img.height() as i32 - 1);
    if x0 > x1 || y0 > y1 {
        return true;
    }
    let shift = |ring: &[Point<i32>]| -> Vec<Point<i32>> {
        ring.iter().map(|p| Point::new(p.x - x0, p.y - y0)).collect()
    };
    let mut mask = GrayImage::new((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
    draw_polygon_mut(&mut mask, &shift(&outer), Luma([255]));
    for hole in &holes {
        draw_polygon_mut(&mut mask, &shift(hole), Luma([0]));
    }
    for (mx, my, m) in mask.enumerate_pixels() {
        if m[0] != 0 {
            img.put_pixel(mx + x0 as u32, my + y0 as u32, color);
        }
    }
    true
}

/// Outline a ring, closing it back to its first vertex.
pub fn stroke_ring(img: &mut RgbImage, ring: &[(f64, f64)], color: Rgb<u8>) {
    if ring.len() < 2 {
        return;
    }
    let closing = [ring[ring.len() - 1], ring[0]];
    for pair in ring.windows(2).chain(std::iter::once(&closing[..])) {
        let (ax, ay) = pair[0];
        let (bx, by) = pair[1];
        draw_line_segment_mut(img, (ax as f32, ay as f32), (bx as f32, by as f32), color);
    }
}

/// Half-open pixel box `(x0, y0, x1, y1)` of everything that differs from `background`.
pub fn content_bounds(img: &RgbImage, background: Rgb<u8>) -> Option<(u32, u32, u32, u32)> {
    img.enumerate_pixels()
        .filter(|(_, _, p)| **p != background)
        .fold(None, |acc, (x, y, _)| match acc {
            None => Some((x, y, x + 1, y + 1)),
            Some((x0, y0, x1, y1)) => {
                Some((x0.min(x), y0.min(y), x1.max(x + 1), y1.max(y + 1)))
            }
        })
}

/// Crop to the drawn content plus `pad` pixels, clamped to the image.
/// A blank image is returned unchanged.
pub fn crop_to_content(img: &RgbImage, background: Rgb<u8>, pad: u32) -> RgbImage {
    let Some((x0, y0, x1, y1)) = content_bounds(img, background) else {
        return img.clone();
    };
    let x0 = x0.saturating_sub(pad);
    let y0 = y0.saturating_sub(pad);
    let x1 = x1.saturating_add(pad).min(img.width());
    let y1 = y1.saturating_add(pad).min(img.height());
    imageops::crop_imm(img, x0, y0, x1 - x0, y1 - y0).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILL: Rgb<u8> = Rgb([10, 20, 30]);

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<(f64, f64)> {
        vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]
    }

    #[test]
    fn pixel_ring_drops_closing_and_repeated_vertices() {
        let ring =
            pixel_ring(&[(0.0, 0.0), (0.2, 0.1), (4.0, 0.0), (4.0, 4.0), (0.0, 0.0)]).unwrap();
        assert_eq!(ring, vec![Point::new(0, 0), Point::new(4, 0), Point::new(4, 4)]);
        assert!(pixel_ring(&[(0.0, 0.0), (0.1, 0.1), (0.0, 0.2)]).is_none());
    }

    #[test]
    fn polygon_without_holes_is_filled() {
        let mut img = RgbImage::from_pixel(20, 20, WHITE);
        assert!(fill_polygon(&mut img, &square(2.0, 2.0, 12.0, 12.0), &[], FILL));
        assert_eq!(*img.get_pixel(7, 7), FILL);
        assert_eq!(*img.get_pixel(15, 15), WHITE);
    }

    #[test]
    fn holes_stay_unfilled() {
        let mut img = RgbImage::from_pixel(30, 30, WHITE);
        let hole = square(10.0, 10.0, 20.0, 20.0);
        assert!(fill_polygon(&mut img, &square(0.0, 0.0, 29.0, 29.0), &[hole], FILL));
        assert_eq!(*img.get_pixel(15, 15), WHITE);
        assert_eq!(*img.get_pixel(5, 5), FILL);
        assert_eq!(*img.get_pixel(25, 25), FILL);
    }

    #[test]
    fn polygon_partly_off_canvas_is_clipped() {
        let mut img = RgbImage::from_pixel(10, 10, WHITE);
        let hole = square(-4.0, -4.0, -2.0, -2.0);
        assert!(fill_polygon(&mut img, &square(-5.0, -5.0, 5.0, 5.0), &[hole], FILL));
        assert_eq!(*img.get_pixel(1, 1), FILL);
        assert_eq!(*img.get_pixel(8, 8), WHITE);
    }

    #[test]
    fn stroke_closes_the_ring() {
        let mut img = RgbImage::from_pixel(10, 10, WHITE);
        stroke_ring(&mut img, &[(1.0, 1.0), (8.0, 1.0), (8.0, 8.0)], BLACK);
        // Closing edge runs along the diagonal
        assert_eq!(*img.get_pixel(4, 4), BLACK);
        assert_eq!(*img.get_pixel(1, 8), WHITE);
    }

    #[test]
    fn crop_keeps_padding_within_image() {
        let mut img = RgbImage::from_pixel(20, 10, WHITE);
        img.put_pixel(5, 4, BLACK);
        img.put_pixel(6, 5, BLACK);
        assert_eq!(content_bounds(&img, WHITE), Some((5, 4, 7, 6)));

        let cropped = crop_to_content(&img, WHITE, 2);
        assert_eq!(cropped.dimensions(), (6, 6));
        assert_eq!(*cropped.get_pixel(2, 2), BLACK);

        let edge = crop_to_content(&img, WHITE, 10);
        assert_eq!(edge.dimensions(), (17, 10));
    }

    #[test]
    fn blank_image_is_not_cropped() {
        let img = RgbImage::from_pixel(4, 3, WHITE);
        assert_eq!(content_bounds(&img, WHITE), None);
        assert_eq!(crop_to_content(&img, WHITE, 1).dimensions(), (4, 3));
    }
}
