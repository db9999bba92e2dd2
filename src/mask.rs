use anyhow::Context as _;

use crate::error::{CoinjarError, CoinjarResult};

/// Alpha above which a mask pixel counts as solidly inside the jar.
pub const SOLID_ALPHA_THRESHOLD: u8 = 220;

/// Half-width of the erosion sample grid; (2*STEPS+1)^2 = 81 samples.
const EROSION_STEPS: i32 = 4;

/// 2D opacity field modelling the jar silhouette.
///
/// Immutable once constructed. Atomic replacement (e.g. when a higher-quality
/// asset arrives) is a whole-value swap in the owner; old and new fields are
/// never mixed mid-query.
#[derive(Clone, Debug)]
pub struct MaskField {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl MaskField {
    /// Build from a raw straight-RGBA8 buffer, converting luminance to alpha
    /// with the fixed Rec. 601 weights 0.299/0.587/0.114.
    pub fn from_rgba8(width: u32, height: u32, rgba: &[u8]) -> CoinjarResult<Self> {
        if width == 0 || height == 0 {
            return Err(CoinjarError::validation("mask dimensions must be > 0"));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| CoinjarError::validation("mask buffer size overflow"))?;
        if rgba.len() != expected {
            return Err(CoinjarError::validation(
                "mask buffer length must be width*height*4",
            ));
        }

        let alpha = rgba
            .chunks_exact(4)
            .map(|px| {
                let lum =
                    f64::from(px[0]) * 0.299 + f64::from(px[1]) * 0.587 + f64::from(px[2]) * 0.114;
                lum.round().clamp(0.0, 255.0) as u8
            })
            .collect();

        Ok(Self {
            width,
            height,
            alpha,
        })
    }

    /// Decode an encoded bitmap (PNG etc.) into a mask field.
    pub fn decode(bytes: &[u8]) -> CoinjarResult<Self> {
        let dyn_img = image::load_from_memory(bytes).context("decode mask bitmap")?;
        let rgba = dyn_img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba8(width, height, rgba.as_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sample the stored alpha at a normalized coordinate (nearest pixel).
    pub fn alpha_at(&self, nx: f64, ny: f64) -> u8 {
        let x = (nx * f64::from(self.width)).round().clamp(0.0, f64::from(self.width - 1)) as usize;
        let y = (ny * f64::from(self.height))
            .round()
            .clamp(0.0, f64::from(self.height - 1)) as usize;
        self.alpha[y * self.width as usize + x]
    }

    /// Eroded containment test: true iff the point and an 81-sample halo at
    /// radius `pad_px` around it all lie solidly inside the silhouette.
    ///
    /// Any halo sample leaving the unit square fails the test outright; the
    /// padded neighbourhood is required to be fully in-bounds.
    pub fn inside_padded(&self, nx: f64, ny: f64, pad_px: f64) -> bool {
        let step_x = pad_px / f64::from(self.width);
        let step_y = pad_px / f64::from(self.height);
        let mut min_a = u8::MAX;
        for dy in -EROSION_STEPS..=EROSION_STEPS {
            for dx in -EROSION_STEPS..=EROSION_STEPS {
                let sx = nx + f64::from(dx) * step_x;
                let sy = ny + f64::from(dy) * step_y;
                if !(0.0..=1.0).contains(&sx) || !(0.0..=1.0).contains(&sy) {
                    return false;
                }
                min_a = min_a.min(self.alpha_at(sx, sy));
            }
        }
        min_a > SOLID_ALPHA_THRESHOLD
    }

    /// Rasterize the field as a per-pixel alpha buffer at an arbitrary
    /// resolution (nearest-neighbour), for destination-in masking.
    pub fn rasterize(&self, width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let ny = (f64::from(y) + 0.5) / f64::from(height);
            for x in 0..width {
                let nx = (f64::from(x) + 0.5) / f64::from(width);
                out.push(self.alpha_at(nx, ny));
            }
        }
        out
    }
}

/// Closed-form approximation of the jar outline in normalized space. Used as
/// the containment gate while no bitmap mask is available, and as a secondary
/// gate when the mask rejects a candidate.
pub fn jar_silhouette_contains(nx: f64, ny: f64) -> bool {
    let y_top = 0.32; // below neck
    let y_bottom = 0.18; // above base curve
    if ny < y_top || ny > 1.0 - y_bottom {
        return false;
    }
    let t = (ny - y_top) / (1.0 - y_top - y_bottom);
    if !(0.0..=1.0).contains(&t) {
        return false;
    }
    let center_x = 0.5;
    let width_factor = 0.5 + 0.35 * t; // narrow at top, wider at bottom
    let max_half_width = width_factor * 0.34; // safely within outline
    let left = (center_x - max_half_width).max(0.12);
    let right = (center_x + max_half_width).min(0.88);
    nx >= left && nx <= right
}

/// Rasterize the analytic silhouette as a hard-edged alpha buffer.
pub fn rasterize_silhouette(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        let ny = (f64::from(y) + 0.5) / f64::from(height);
        for x in 0..width {
            let nx = (f64::from(x) + 0.5) / f64::from(width);
            out.push(if jar_silhouette_contains(nx, ny) {
                255
            } else {
                0
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solid white square with a black border band, as straight RGBA8.
    fn bordered_mask(size: u32, border: u32) -> MaskField {
        let mut rgba = vec![0u8; (size * size * 4) as usize];
        for y in 0..size {
            for x in 0..size {
                let inside =
                    x >= border && x < size - border && y >= border && y < size - border;
                let v = if inside { 255 } else { 0 };
                let idx = ((y * size + x) * 4) as usize;
                rgba[idx..idx + 3].fill(v);
                rgba[idx + 3] = 255;
            }
        }
        MaskField::from_rgba8(size, size, &rgba).unwrap()
    }

    #[test]
    fn luminance_conversion_uses_fixed_weights() {
        let rgba = [100u8, 150, 200, 255];
        let mask = MaskField::from_rgba8(1, 1, &rgba).unwrap();
        let expected = (100.0 * 0.299 + 150.0 * 0.587 + 200.0 * 0.114f64).round() as u8;
        assert_eq!(mask.alpha_at(0.5, 0.5), expected);
    }

    #[test]
    fn from_rgba8_rejects_bad_lengths() {
        assert!(MaskField::from_rgba8(2, 2, &[0u8; 15]).is_err());
        assert!(MaskField::from_rgba8(0, 2, &[]).is_err());
    }

    #[test]
    fn alpha_at_clamps_to_edges() {
        let mask = bordered_mask(8, 0);
        assert_eq!(mask.alpha_at(-0.5, 0.5), 255);
        assert_eq!(mask.alpha_at(1.5, 1.5), 255);
    }

    #[test]
    fn inside_padded_passes_center_fails_edge() {
        let mask = bordered_mask(100, 10);
        assert!(mask.inside_padded(0.5, 0.5, 2.0));
        // A point sitting in the border band fails even with no padding.
        assert!(!mask.inside_padded(0.05, 0.5, 0.0));
    }

    #[test]
    fn inside_padded_is_monotonic_in_pad() {
        let mask = bordered_mask(100, 10);
        for &(nx, ny) in &[(0.5, 0.5), (0.2, 0.2), (0.15, 0.5), (0.5, 0.85)] {
            let mut prev = true;
            for pad in [0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 40.0] {
                let now = mask.inside_padded(nx, ny, pad);
                // Once the test fails at some pad, it must fail for all larger pads.
                assert!(prev || !now, "monotonicity broken at ({nx},{ny}) pad {pad}");
                prev = now;
            }
        }
    }

    #[test]
    fn padded_halo_leaving_unit_square_fails() {
        let mask = bordered_mask(10, 0); // fully solid
        assert!(mask.inside_padded(0.5, 0.5, 0.5));
        // Near the corner a large pad pushes samples out of [0,1]^2.
        assert!(!mask.inside_padded(0.01, 0.01, 2.0));
    }

    #[test]
    fn silhouette_excludes_neck_and_corners() {
        assert!(jar_silhouette_contains(0.5, 0.6));
        assert!(!jar_silhouette_contains(0.5, 0.1)); // above neck
        assert!(!jar_silhouette_contains(0.5, 0.95)); // below base
        assert!(!jar_silhouette_contains(0.05, 0.6)); // outside taper
    }

    #[test]
    fn silhouette_widens_toward_bottom() {
        // Just inside the band near the top vs the same x near the bottom.
        let nx = 0.72;
        assert!(!jar_silhouette_contains(nx, 0.35));
        assert!(jar_silhouette_contains(nx, 0.78));
    }

    #[test]
    fn decode_round_trips_through_png() {
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([255, 255, 255, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let mask = MaskField::decode(&buf).unwrap();
        assert_eq!((mask.width(), mask.height()), (4, 3));
        assert_eq!(mask.alpha_at(0.5, 0.5), 255);

        assert!(MaskField::decode(b"not a png").is_err());
    }
}
