use std::collections::HashMap;

use crate::core::NormPoint;

/// Floor for the normalized cell size, guarding degenerate canvas sizes.
const MIN_CELL: f64 = 1e-9;

/// Uniform grid over normalized [0,1]^2 space for separation queries.
///
/// Cell size equals the minimum separation converted to normalized units per
/// axis, so any point within `min_sep_px` along either axis of a query lies
/// within one cell of it and is returned by the 3x3-block query. The guarantee
/// is per-axis and approximate: for points near a cell corner the true
/// Euclidean nearest set can extend slightly beyond the block. Callers
/// re-filter by real pixel distance, so the index may over-return but must
/// never miss an axis-near point.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    cell_w: f64,
    cell_h: f64,
    cells: HashMap<(i64, i64), Vec<NormPoint>>,
}

impl SpatialIndex {
    pub fn build(points: &[NormPoint], min_sep_px: f64, canvas_w: f64, canvas_h: f64) -> Self {
        let w = canvas_w.max(1.0);
        let h = canvas_h.max(1.0);
        let cell_w = (min_sep_px / w).max(MIN_CELL);
        let cell_h = (min_sep_px / h).max(MIN_CELL);

        let mut cells: HashMap<(i64, i64), Vec<NormPoint>> = HashMap::new();
        for p in points {
            let ci = (p.x / cell_w).floor() as i64;
            let cj = (p.y / cell_h).floor() as i64;
            cells.entry((ci, cj)).or_default().push(*p);
        }

        Self {
            cell_w,
            cell_h,
            cells,
        }
    }

    /// All points in the 3x3 block of cells centered on the query's cell.
    pub fn nearby(&self, nx: f64, ny: f64) -> Vec<NormPoint> {
        let ci = (nx / self.cell_w).floor() as i64;
        let cj = (ny / self.cell_h).floor() as i64;
        let mut out = Vec::new();
        for dj in -1..=1 {
            for di in -1..=1 {
                if let Some(bucket) = self.cells.get(&(ci + di, cj + dj)) {
                    out.extend_from_slice(bucket);
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
