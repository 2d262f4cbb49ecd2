//! GDAL-backed geometry decoding for tile footprints.
//!
//! Footprints arrive as WKB. They are parsed through OGR and flattened into
//! plain lon/lat polygons (an exterior ring plus holes) that the renderer can
//! project and fill. Polygons, multipolygons and geometry collections are
//! supported; anything that yields no ring of at least three vertices
//! decodes to an empty shape.
use gdal::errors::GdalError as GdalCrateError;
use gdal::vector::Geometry;
use thiserror::Error;

/// Errors encountered while decoding footprints
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("Invalid WKB for tile {tile}: {source}")]
    InvalidWkb {
        tile: String,
        #[source]
        source: GdalCrateError,
    },
}

/// Lon/lat bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Whole-world plate carrée extent
    pub const WORLD: Bounds = Bounds {
        min_x: -180.0,
        min_y: -90.0,
        max_x: 180.0,
        max_y: 90.0,
    };

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn union(self, other: Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

pub type Ring = Vec<(f64, f64)>;

/// One polygon part of a footprint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }
}

/// A decoded footprint: every polygon part, in lon/lat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub polygons: Vec<Polygon>,
}

impl Shape {
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.polygons
            .iter()
            .flat_map(|p| p.exterior.iter())
            .map(|&(x, y)| Bounds {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            })
            .reduce(Bounds::union)
    }
}

/// Decode a WKB footprint into polygons. `tile` labels the error.
pub fn decode_wkb(tile: &str, wkb: &[u8]) -> Result<Shape, GdalError> {
    let geometry = Geometry::from_wkb(wkb).map_err(|source| GdalError::InvalidWkb {
        tile: tile.to_string(),
        source,
    })?;
    let mut shape = Shape::default();
    collect_polygons(&geometry, &mut shape.polygons);
    Ok(shape)
}

fn ring_points(geometry: &Geometry) -> Option<Ring> {
    let mut points = Vec::new();
    geometry.get_points(&mut points);
    let ring: Ring = points
        .into_iter()
        .map(|(x, y, _)| (x, y))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    (ring.len() >= 3).then_some(ring)
}

// A node whose children are all leaves is a polygon: first ring exterior, the rest holes.
// Points and short linestrings drop out by length.
fn collect_polygons(geometry: &Geometry, out: &mut Vec<Polygon>) {
    let count = geometry.geometry_count();
    if count == 0 {
        if let Some(exterior) = ring_points(geometry) {
            out.push(Polygon {
                exterior,
                holes: Vec::new(),
            });
        }
        return;
    }
    let parts: Vec<_> = (0..count).map(|i| geometry.get_geometry(i)).collect();
    if parts.iter().all(|part| part.geometry_count() == 0) {
        let mut rings = parts.iter().map(|part| ring_points(part));
        if let Some(Some(exterior)) = rings.next() {
            out.push(Polygon {
                exterior,
                holes: rings.flatten().collect(),
            });
        }
        return;
    }
    for part in &parts {
        collect_polygons(part, out);
    }
}
