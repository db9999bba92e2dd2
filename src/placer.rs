use tracing::warn;

use crate::core::NormPoint;
use crate::mask::{MaskField, jar_silhouette_contains};
use crate::rng::Mulberry32;
use crate::spatial::SpatialIndex;
use crate::sprite::COIN_SIZE_CSS;
use crate::transform::CanvasMetrics;

/// Rejection-sampling configuration. Defaults mirror the tuned constants of
/// the production layout: a 48px erosion margin, a separation of 0.55 coin
/// diameters, and a 260-attempt budget.
#[derive(Clone, Copy, Debug)]
pub struct PlacerConfig {
    /// Margin from the silhouette edge, in mask pixels.
    pub pad_px: f64,
    /// Minimum pixel distance between any two placed coins.
    pub min_sep_px: f64,
    /// Rejection-sampling attempt budget.
    pub attempts: u32,
    /// Degraded placement used when the budget is exhausted.
    pub fallback: NormPoint,
    /// Jar-opening point drops animate from.
    pub drop_origin: NormPoint,
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            pad_px: 48.0,
            min_sep_px: 0.55 * COIN_SIZE_CSS,
            attempts: 260,
            fallback: NormPoint::new(0.5, 0.62),
            drop_origin: NormPoint::new(0.58, 0.12),
        }
    }
}

/// Outcome of a placement attempt. `fallback` marks the degraded case where
/// the attempt budget ran out and the fixed fallback point was returned;
/// separation and containment may be violated there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub point: NormPoint,
    pub fallback: bool,
}

// Vertical sampling band and bias. The power-law draw concentrates mass
// toward the settled pile at the bottom of the jar.
const BAND_TOP: f64 = 0.58;
const BAND_BOTTOM_MARGIN: f64 = 0.10;
const VERTICAL_BIAS_EXP: f64 = 2.8;

// Horizontal taper: the jar narrows toward the top.
const WIDTH_FACTOR_BASE: f64 = 0.5;
const WIDTH_FACTOR_SPREAD: f64 = 0.35;
const HALF_WIDTH_SCALE: f64 = 0.32;
const X_MIN: f64 = 0.15;
const X_MAX: f64 = 0.85;

/// Sample a valid position for a new coin.
///
/// Deterministic for fixed `seed`, `existing`, mask and metrics. Placement is
/// greedy and order-dependent: each call only sees previously placed points.
pub fn sample_inside(
    seed: &str,
    existing: &[NormPoint],
    mask: Option<&MaskField>,
    metrics: &CanvasMetrics,
    cfg: &PlacerConfig,
) -> Placement {
    let mut rng = Mulberry32::from_str_seed(seed);
    let draw_w = metrics.drawable_width();
    let draw_h = metrics.drawable_height();
    let index = SpatialIndex::build(existing, cfg.min_sep_px, draw_w, draw_h);

    for _ in 0..cfg.attempts {
        let t = rng.next_f64().powf(VERTICAL_BIAS_EXP);
        let ny = BAND_TOP + t * (1.0 - BAND_TOP - BAND_BOTTOM_MARGIN);

        let width_factor = WIDTH_FACTOR_BASE + WIDTH_FACTOR_SPREAD * t;
        let max_half_width = width_factor * HALF_WIDTH_SCALE;
        let nx = 0.5 + (rng.next_f64() * 2.0 - 1.0) * max_half_width;
        if !(X_MIN..=X_MAX).contains(&nx) {
            continue;
        }

        let contained = match mask {
            // Secondary analytic gate keeps coins dispersing when the bitmap
            // mask rejects a candidate the visual outline would accept.
            Some(m) => m.inside_padded(nx, ny, cfg.pad_px) || jar_silhouette_contains(nx, ny),
            None => jar_silhouette_contains(nx, ny),
        };
        if !contained {
            continue;
        }

        let mut separated = true;
        for p in index.nearby(nx, ny) {
            let dx = (nx - p.x) * draw_w;
            let dy = (ny - p.y) * draw_h;
            if dx.hypot(dy) < cfg.min_sep_px {
                separated = false;
                break;
            }
        }
        if separated {
            return Placement {
                point: NormPoint::new(nx, ny),
                fallback: false,
            };
        }
    }

    warn!(seed, attempts = cfg.attempts, "placement budget exhausted, using fallback point");
    Placement {
        point: cfg.fallback,
        fallback: true,
    }
}
