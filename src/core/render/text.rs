//! Label text. The map uses the bundled DejaVu Sans face so output does not
//! depend on fonts installed on the host.
use ab_glyph::{FontRef, PxScale};

static DEJAVU_SANS: &[u8] = include_bytes!("../../../assets/DejaVuSans.ttf");

pub fn dejavu_sans() -> crate::Result<FontRef<'static>> {
    FontRef::try_from_slice(DEJAVU_SANS)
        .map_err(|e| crate::Error::Render(format!("bundled font: {}", e)))
}

/// Pixel scale of a `points` sized font rendered at `dpi`.
pub fn px_scale(points: f32, dpi: u32) -> PxScale {
    PxScale::from(points * dpi.max(1) as f32 / 72.0)
}
