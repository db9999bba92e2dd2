use crate::core::{NormPoint, Point};
use crate::error::{CoinjarError, CoinjarResult};

/// Device-pixel-ratio clamp range. Values outside are treated as misreported.
const DPR_MIN: f64 = 1.0;
const DPR_MAX: f64 = 3.0;

/// Live drawing-surface geometry. Recomputed every frame from the surface;
/// never persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasMetrics {
    pub css_width: f64,
    pub css_height: f64,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub device_pixel_ratio: f64,
    pub jar_scale: f64,
}

impl CanvasMetrics {
    /// Fit a backing store to a CSS box at the given device pixel ratio.
    ///
    /// The ratio is clamped to [1,3]; pixel dimensions are
    /// `max(1, ceil(css * dpr))`. `ceil` is load-bearing: flooring can
    /// under-allocate the store relative to the CSS box and clip edge content.
    pub fn fit(css_width: f64, css_height: f64, raw_dpr: f64) -> CoinjarResult<Self> {
        if !css_width.is_finite() || !css_height.is_finite() || css_width <= 0.0 || css_height <= 0.0
        {
            return Err(CoinjarError::validation(
                "css dimensions must be finite and > 0",
            ));
        }
        let dpr = if raw_dpr.is_finite() {
            raw_dpr.clamp(DPR_MIN, DPR_MAX)
        } else {
            DPR_MIN
        };
        Ok(Self {
            css_width,
            css_height,
            pixel_width: backing_dimension(css_width, dpr),
            pixel_height: backing_dimension(css_height, dpr),
            device_pixel_ratio: dpr,
            jar_scale: 1.0,
        })
    }

    pub fn with_jar_scale(mut self, jar_scale: f64) -> CoinjarResult<Self> {
        if !jar_scale.is_finite() || jar_scale <= 0.0 {
            return Err(CoinjarError::validation("jar_scale must be finite and > 0"));
        }
        self.jar_scale = jar_scale;
        Ok(self)
    }

    /// Map a normalized point into CSS-pixel canvas coordinates, accounting
    /// for the uniform visual scale of the drawing surface.
    pub fn normalized_to_pixel(&self, p: NormPoint) -> Point {
        Point::new(
            p.x * self.css_width / self.jar_scale,
            p.y * self.css_height / self.jar_scale,
        )
    }

    /// Clamp a CSS-pixel coordinate so an object of `object_size` stays within
    /// the drawable box along the given dimension.
    pub fn clamp_to_drawable(&self, coord: f64, object_size: f64, css_dim: f64) -> f64 {
        coord.clamp(0.0, (css_dim / self.jar_scale - object_size).max(0.0))
    }

    /// Drawable width/height in CSS pixels after the jar scale.
    pub fn drawable_width(&self) -> f64 {
        self.css_width / self.jar_scale
    }

    pub fn drawable_height(&self) -> f64 {
        self.css_height / self.jar_scale
    }
}

fn backing_dimension(css: f64, dpr: f64) -> u32 {
    (css * dpr).ceil().max(1.0) as u32
}
