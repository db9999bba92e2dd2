use std::collections::HashSet;

use tracing::debug;

use crate::anim_ease::Ease;
use crate::composite::{mask_in_place, stamp_over};
use crate::core::{FrameRGBA, NormPoint};
use crate::error::CoinjarResult;
use crate::mask::{MaskField, rasterize_silhouette};
use crate::rng::Mulberry32;
use crate::sprite::{COIN_SIZE_CSS, CoinSprites};
use crate::transform::CanvasMetrics;

/// Time between landing and settling, during which the sparkle plays.
pub const SPARKLE_WINDOW_MS: f64 = 300.0;
/// Visible life of the sparkle cross (slightly shorter than the window).
const SPARKLE_LIFE_MS: f64 = 280.0;

pub const DROP_DURATION_MIN_MS: f64 = 650.0;
pub const DROP_DURATION_BAND_MS: f64 = 200.0;

/// Lifecycle of a rendered entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Unplaced,
    Animating,
    Settled,
}

/// Exists only while an entry is animating; created on placement, destroyed
/// on settle.
#[derive(Clone, Debug)]
pub struct AnimationRecord {
    pub entry_id: String,
    pub start: NormPoint,
    pub target: NormPoint,
    pub current: NormPoint,
    pub start_ms: f64,
    pub duration_ms: f64,
    pub sparkle_start_ms: Option<f64>,
}

impl AnimationRecord {
    /// Eased interpolation parameter at `now_ms`, with exact endpoints:
    /// 0 at start, 1 at (and beyond) `start + duration`.
    pub fn eased_progress(&self, now_ms: f64) -> f64 {
        let p = ((now_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0);
        Ease::OutBounce.apply(p)
    }

    pub fn position_at(&self, now_ms: f64) -> NormPoint {
        NormPoint::lerp(self.start, self.target, self.eased_progress(now_ms))
    }
}

/// Draw a randomized drop duration in the fixed band from the entry's RNG
/// stream.
pub fn drop_duration_ms(rng: &mut Mulberry32) -> f64 {
    DROP_DURATION_MIN_MS + rng.next_f64() * DROP_DURATION_BAND_MS
}

/// Dual-layer compositor: a cached offscreen buffer for settled entries plus
/// per-frame redraw of animating ones, clipped to the jar silhouette.
///
/// The static cache is invalidated on entry add, delete, resize, or sprite
/// rebuild; never by animation progress alone.
#[derive(Clone, Debug, Default)]
pub struct RenderPipeline {
    animations: Vec<AnimationRecord>,
    in_flight: HashSet<String>,
    static_cache: Option<FrameRGBA>,
    static_dirty: bool,
}

impl RenderPipeline {
    pub fn new() -> Self {
        Self {
            animations: Vec::new(),
            in_flight: HashSet::new(),
            static_cache: None,
            static_dirty: true,
        }
    }

    pub fn mark_static_dirty(&mut self) {
        self.static_dirty = true;
    }

    pub fn state_of(&self, entry_id: &str, placed: bool) -> EntryState {
        if self.in_flight.contains(entry_id) {
            EntryState::Animating
        } else if placed {
            EntryState::Settled
        } else {
            EntryState::Unplaced
        }
    }

    pub fn is_animating(&self, entry_id: &str) -> bool {
        self.in_flight.contains(entry_id)
    }

    pub fn animation(&self, entry_id: &str) -> Option<&AnimationRecord> {
        self.animations.iter().find(|a| a.entry_id == entry_id)
    }

    /// unplaced -> animating: create the drop record from the jar opening.
    pub fn begin_drop(
        &mut self,
        entry_id: &str,
        origin: NormPoint,
        target: NormPoint,
        now_ms: f64,
        duration_ms: f64,
    ) {
        self.animations.push(AnimationRecord {
            entry_id: entry_id.to_string(),
            start: origin,
            target,
            current: origin,
            start_ms: now_ms,
            duration_ms,
            sparkle_start_ms: None,
        });
        // The static layer must exclude this coin while it animates.
        self.in_flight.insert(entry_id.to_string());
        self.static_dirty = true;
    }

    /// Remove an entry's animation record, if any. The caller removes the
    /// entry itself in the same synchronous step, so a later frame never
    /// observes a half-deleted coin.
    pub fn remove(&mut self, entry_id: &str) -> bool {
        let before = self.animations.len();
        self.animations.retain(|a| a.entry_id != entry_id);
        self.in_flight.remove(entry_id);
        self.static_dirty = true;
        self.animations.len() != before
    }

    pub fn clear(&mut self) {
        self.animations.clear();
        self.in_flight.clear();
        self.static_cache = None;
        self.static_dirty = true;
    }

    /// Whether another frame should be drawn. Idle with a clean cache means
    /// no draws until an external mutation dirties the pipeline again; the
    /// dirty flag also covers the single flush frame after the last settle.
    pub fn needs_frame(&self) -> bool {
        !self.animations.is_empty() || self.static_dirty
    }

    /// Advance all animations to `now_ms`. Entries whose sparkle window has
    /// elapsed transition to settled; their ids are returned and the static
    /// cache is dirtied so the next frame folds them in.
    pub fn advance(&mut self, now_ms: f64) -> Vec<String> {
        let mut settled = Vec::new();
        for anim in &mut self.animations {
            anim.current = anim.position_at(now_ms);
            let p = ((now_ms - anim.start_ms) / anim.duration_ms).clamp(0.0, 1.0);
            if p >= 1.0 && anim.sparkle_start_ms.is_none() {
                anim.sparkle_start_ms = Some(now_ms);
            }
        }
        self.animations.retain(|anim| {
            let done = anim
                .sparkle_start_ms
                .is_some_and(|s| now_ms - s >= SPARKLE_WINDOW_MS);
            if done {
                settled.push(anim.entry_id.clone());
            }
            !done
        });
        for id in &settled {
            self.in_flight.remove(id);
        }
        if !settled.is_empty() {
            self.static_dirty = true;
        }
        settled
    }

    /// Composite one frame: blit (or rebuild) the static layer, stamp the
    /// animating coins on top, then clip to the silhouette.
    ///
    /// `placed` is the full id/position set of placed entries; coins still in
    /// flight are excluded from the static layer automatically.
    pub fn render(
        &mut self,
        placed: &[(&str, NormPoint)],
        metrics: &CanvasMetrics,
        sprites: &CoinSprites,
        mask: Option<&MaskField>,
        now_ms: f64,
    ) -> CoinjarResult<FrameRGBA> {
        let (w, h) = (metrics.pixel_width, metrics.pixel_height);
        let cache_stale = match &self.static_cache {
            Some(cache) => self.static_dirty || cache.width != w || cache.height != h,
            None => true,
        };
        if cache_stale {
            self.static_cache = Some(self.rebuild_static_layer(placed, metrics, sprites)?);
            self.static_dirty = false;
        }

        let mut frame = match &self.static_cache {
            Some(cache) => cache.clone(),
            None => FrameRGBA::transparent(w, h)?,
        };

        let mut animating: Vec<&AnimationRecord> = self.animations.iter().collect();
        animating.sort_by(|a, b| a.current.y.total_cmp(&b.current.y));
        for anim in animating {
            let (dx, dy) = coin_device_origin(anim.current, metrics);
            stamp_over(&mut frame, &sprites.shadow, dx, dy - sprites.shadow_dy);
            stamp_over(&mut frame, &sprites.coin, dx, dy);
            if let Some(sparkle_start) = anim.sparkle_start_ms {
                stamp_sparkle(&mut frame, dx, dy, metrics, now_ms - sparkle_start);
            }
        }

        let mask_alpha = match mask {
            Some(m) => m.rasterize(w, h),
            None => rasterize_silhouette(w, h),
        };
        mask_in_place(&mut frame, &mask_alpha)?;
        Ok(frame)
    }

    fn rebuild_static_layer(
        &self,
        placed: &[(&str, NormPoint)],
        metrics: &CanvasMetrics,
        sprites: &CoinSprites,
    ) -> CoinjarResult<FrameRGBA> {
        debug!(
            coins = placed.len(),
            in_flight = self.in_flight.len(),
            "rebuilding static layer"
        );
        let mut layer = FrameRGBA::transparent(metrics.pixel_width, metrics.pixel_height)?;
        let mut ordered: Vec<&(&str, NormPoint)> = placed
            .iter()
            .filter(|(id, _)| !self.in_flight.contains(*id))
            .collect();
        // Back-to-front: lower coins draw later, on top, emulating stacking.
        ordered.sort_by(|a, b| a.1.y.total_cmp(&b.1.y));
        for (_, pos) in ordered {
            let (dx, dy) = coin_device_origin(*pos, metrics);
            stamp_over(&mut layer, &sprites.shadow, dx, dy - sprites.shadow_dy);
            stamp_over(&mut layer, &sprites.coin, dx, dy);
        }
        Ok(layer)
    }
}

/// Top-left device-pixel corner for a coin centered at a normalized point,
/// clamped into the drawable box.
fn coin_device_origin(pos: NormPoint, metrics: &CanvasMetrics) -> (i64, i64) {
    let p = metrics.normalized_to_pixel(pos);
    let x = metrics.clamp_to_drawable(
        (p.x - COIN_SIZE_CSS / 2.0).round(),
        COIN_SIZE_CSS,
        metrics.css_width,
    );
    let y = metrics.clamp_to_drawable(
        (p.y - COIN_SIZE_CSS / 2.0).round(),
        COIN_SIZE_CSS,
        metrics.css_height,
    );
    let dpr = metrics.device_pixel_ratio;
    ((x * dpr).round() as i64, (y * dpr).round() as i64)
}

/// White cross flash over a just-landed coin.
fn stamp_sparkle(
    frame: &mut FrameRGBA,
    coin_dx: i64,
    coin_dy: i64,
    metrics: &CanvasMetrics,
    age_ms: f64,
) {
    let p = age_ms / SPARKLE_LIFE_MS;
    if !(0.0..=1.0).contains(&p) {
        return;
    }
    let alpha = (1.0 - p) * 0.9;
    let dpr = metrics.device_pixel_ratio;
    let len = (6.0 + 10.0 * p) * dpr;
    let half_thick = (0.75 * dpr).max(0.5);
    let cx = coin_dx as f64 + COIN_SIZE_CSS * 0.78 * dpr;
    let cy = coin_dy as f64 + COIN_SIZE_CSS * 0.32 * dpr;

    let px = [(255.0 * alpha) as u8; 4];
    let (w, h) = (i64::from(frame.width), i64::from(frame.height));
    let mut plot = |x: i64, y: i64| {
        if (0..w).contains(&x) && (0..h).contains(&y) {
            let d = frame.pixel(x as u32, y as u32);
            frame.put_pixel(x as u32, y as u32, crate::composite::over(d, px, 1.0));
        }
    };

    let span = len.round() as i64;
    let thick = half_thick.round().max(1.0) as i64;
    for off in -span..=span {
        for t in -thick..thick {
            plot((cx as i64) + off, (cy as i64) + t); // horizontal arm
            plot((cx as i64) + t, (cy as i64) + off); // vertical arm
        }
    }
}
