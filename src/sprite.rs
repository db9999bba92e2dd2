use crate::composite::over;
use crate::core::FrameRGBA;
use crate::error::CoinjarResult;
use crate::transform::CanvasMetrics;

/// Coin diameter in CSS pixels. Placement separation and sprite sizing both
/// derive from this.
pub const COIN_SIZE_CSS: f64 = 42.0;

/// Pre-rasterized coin artwork at the current device resolution. Rebuilt on
/// resize or device-pixel-ratio change, never per frame.
#[derive(Clone, Debug)]
pub struct CoinSprites {
    pub coin: FrameRGBA,
    pub shadow: FrameRGBA,
    /// Vertical lift of the shadow relative to the coin, in device pixels.
    pub shadow_dy: i64,
    pub size_px: u32,
}

// Gradient stops of the coin face, straight RGBA (hex #fff3c4 .. #e19a2a).
const FACE_STOPS: [(f64, [f64; 3]); 4] = [
    (0.0, [255.0, 243.0, 196.0]),
    (0.4, [255.0, 213.0, 107.0]),
    (0.75, [241.0, 180.0, 62.0]),
    (1.0, [225.0, 154.0, 42.0]),
];

const RIM_TICKS: u32 = 56;
const TICK_COLOR: [f64; 3] = [180.0, 122.0, 33.0];

pub fn build_sprites(metrics: &CanvasMetrics) -> CoinjarResult<CoinSprites> {
    let size_px = (COIN_SIZE_CSS * metrics.device_pixel_ratio).round().max(1.0) as u32;
    let coin = rasterize_coin(size_px)?;
    let (shadow, shadow_dy) = rasterize_shadow(size_px)?;
    Ok(CoinSprites {
        coin,
        shadow,
        shadow_dy,
        size_px,
    })
}

fn rasterize_coin(size: u32) -> CoinjarResult<FrameRGBA> {
    let mut frame = FrameRGBA::transparent(size, size)?;
    let s = f64::from(size);
    let r = s / 2.0;

    for y in 0..size {
        for x in 0..size {
            let px = f64::from(x) + 0.5;
            let py = f64::from(y) + 0.5;
            let dx = px - r;
            let dy = py - r;
            let rn = dx.hypot(dy) / r;

            let mut out = [0u8; 4];

            // Coin face: radial gradient from an offset highlight center.
            if rn <= 0.88 {
                let gd = ((px - r * 0.55).hypot(py - r * 0.55) / (r * 0.98)).clamp(0.0, 1.0);
                out = premul_straight(gradient_at(gd), 1.0);

                // Soft specular highlight toward the upper left of center.
                let hd = ((px - r * 0.6).hypot(py - r * 0.55) / (r * 0.9)).clamp(0.0, 1.0);
                let hl = 0.65 * (1.0 - hd);
                if hl > 0.0 {
                    out = over(out, premul_straight([255.0, 255.0, 255.0], hl), 1.0);
                }

                // Inner ring.
                if (rn - 0.55).abs() <= 0.035 {
                    out = over(out, premul_straight([255.0, 255.0, 255.0], 0.18), 1.0);
                }
            }

            // Dark outline stroke around the face.
            if (rn - 0.88).abs() <= 0.02 {
                out = over(out, premul_straight([0.0, 0.0, 0.0], 0.35), 1.0);
            }

            // Milled rim ticks outside the face.
            if (0.92..=0.98).contains(&rn) && on_rim_tick(dx, dy, r) {
                out = over(out, premul_straight(TICK_COLOR, 1.0), 1.0);
            }

            if out[3] > 0 {
                frame.put_pixel(x, y, out);
            }
        }
    }
    Ok(frame)
}

fn rasterize_shadow(size: u32) -> CoinjarResult<(FrameRGBA, i64)> {
    let mut frame = FrameRGBA::transparent(size, size)?;
    let s = f64::from(size);
    let shadow_dy = (s * 0.10).round() as i64;
    let cx = s * 0.5;
    let cy = s * 0.5 + s * 0.30 - shadow_dy as f64;
    let rx = s * 0.42;
    let ry = s * 0.22;

    for y in 0..size {
        for x in 0..size {
            let px = f64::from(x) + 0.5;
            let py = f64::from(y) + 0.5;
            let d = ((px - cx) / rx).hypot((py - cy) / ry);
            if d >= 1.0 {
                continue;
            }
            // Pre-baked soft edge in place of a per-frame blur pass.
            let edge = 1.0 - smoothstep(0.7, 1.0, d);
            let alpha = 0.45 * 0.35 * edge;
            if alpha > 0.0 {
                frame.put_pixel(x, y, premul_straight([0.0, 0.0, 0.0], alpha));
            }
        }
    }
    Ok((frame, shadow_dy))
}

fn gradient_at(t: f64) -> [f64; 3] {
    for pair in FACE_STOPS.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let f = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
            let f = f.clamp(0.0, 1.0);
            return [
                c0[0] + (c1[0] - c0[0]) * f,
                c0[1] + (c1[1] - c0[1]) * f,
                c0[2] + (c1[2] - c0[2]) * f,
            ];
        }
    }
    FACE_STOPS[FACE_STOPS.len() - 1].1
}

fn on_rim_tick(dx: f64, dy: f64, r: f64) -> bool {
    let angle = dy.atan2(dx).rem_euclid(std::f64::consts::TAU);
    let spacing = std::f64::consts::TAU / f64::from(RIM_TICKS);
    let offset = angle.rem_euclid(spacing);
    let arc = offset.min(spacing - offset) * dx.hypot(dy);
    arc <= r * 0.03
}

fn premul_straight(rgb: [f64; 3], alpha: f64) -> [u8; 4] {
    let a = (alpha.clamp(0.0, 1.0) * 255.0).round();
    [
        ((rgb[0] * a / 255.0).round().clamp(0.0, 255.0)) as u8,
        ((rgb[1] * a / 255.0).round().clamp(0.0, 255.0)) as u8,
        ((rgb[2] * a / 255.0).round().clamp(0.0, 255.0)) as u8,
        a as u8,
    ]
}

fn smoothstep(a: f64, b: f64, x: f64) -> f64 {
    if x <= a {
        return 0.0;
    }
    if x >= b {
        return 1.0;
    }
    let t = (x - a) / (b - a);
    t * t * (3.0 - 2.0 * t)
}
