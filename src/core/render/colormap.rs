use image::Rgb;

// Viridis sampled at nine evenly spaced stops
const VIRIDIS: [[u8; 3]; 9] = [
    [0x44, 0x01, 0x54],
    [0x47, 0x2c, 0x7a],
    [0x3b, 0x51, 0x8b],
    [0x2c, 0x71, 0x8e],
    [0x21, 0x90, 0x8d],
    [0x27, 0xad, 0x81],
    [0x5c, 0xc8, 0x63],
    [0xaa, 0xdc, 0x32],
    [0xfd, 0xe7, 0x25],
];

/// Viridis color at position `t` in [0, 1]; out-of-range values are clamped.
pub fn viridis(t: f64) -> Rgb<u8> {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - i as f64;
    let (a, b) = (VIRIDIS[i], VIRIDIS[i + 1]);
    let mut out = [0u8; 3];
    for c in 0..3 {
        out[c] = (a[c] as f64 + (b[c] as f64 - a[c] as f64) * frac).round() as u8;
    }
    Rgb(out)
}

/// Linear normalization of counts onto [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub vmin: f64,
    pub vmax: f64,
}

impl Normalize {
    /// Range of the present values; `0..1` when there are none.
    pub fn from_values<I: IntoIterator<Item = u64>>(values: I) -> Self {
        let (lo, hi) = values
            .into_iter()
            .fold((None::<u64>, None::<u64>), |(lo, hi), v| {
                (Some(lo.map_or(v, |l| l.min(v))), Some(hi.map_or(v, |h| h.max(v))))
            });
        match (lo, hi) {
            (Some(lo), Some(hi)) => Self {
                vmin: lo as f64,
                vmax: hi as f64,
            },
            _ => Self { vmin: 0.0, vmax: 1.0 },
        }
    }

    /// A degenerate range maps everything to 0.
    pub fn apply(&self, value: f64) -> f64 {
        let span = self.vmax - self.vmin;
        if span <= 0.0 {
            0.0
        } else {
            ((value - self.vmin) / span).clamp(0.0, 1.0)
        }
    }

    pub fn color(&self, value: u64) -> Rgb<u8> {
        viridis(self.apply(value as f64))
    }
}
