use egui::Color32;

use crate::data::table::DataTable;
use crate::processing::downsampling::{reduce_to_budget, N_MAX};
use crate::state::label::{color32_from_hex, color_for_index, LabelRoster, LabelScope};
use crate::state::plot_spec::PlotSpec;

/// Multiplicative zoom factors, anchored at the cursor.
pub const ZOOM_IN_FACTOR: f64 = 2.0;
pub const ZOOM_OUT_FACTOR: f64 = 0.5;

/// Nearest-index resolution over an ascending sequence: the index
/// immediately before the distance to the query starts increasing, or the
/// last index if it never does.
pub fn nearest_index(x: f64, values: &[f64]) -> usize {
    let mut prev = f64::INFINITY;
    for (i, v) in values.iter().enumerate() {
        let delta = (v - x).abs();
        if delta < prev {
            prev = delta;
        } else {
            return i.saturating_sub(1);
        }
    }
    values.len().saturating_sub(1)
}

/// The x coordinate space of a subplot. Exactly one of the two modes is
/// active for a whole session: row positions, or the shared chronological
/// axis.
#[derive(Debug, Clone)]
pub enum XAxis {
    Rows { count: usize },
    Time { seconds: Vec<f64> },
}

impl XAxis {
    pub fn len(&self) -> usize {
        match self {
            XAxis::Rows { count } => *count,
            XAxis::Time { seconds } => seconds.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The x value of a canonical row index.
    pub fn x_of(&self, index: usize) -> f64 {
        match self {
            XAxis::Rows { .. } => index as f64,
            XAxis::Time { seconds } => seconds.get(index).copied().unwrap_or(0.0),
        }
    }

    /// Resolve a display x back to a canonical row index: rounding and
    /// clamping in row mode, nearest-timestamp scan in timestamp mode.
    pub fn resolve(&self, x: f64) -> usize {
        match self {
            XAxis::Rows { count } => {
                let max = count.saturating_sub(1);
                (x.round().max(0.0) as usize).min(max)
            }
            XAxis::Time { seconds } => nearest_index(x, seconds),
        }
    }

    /// Full data span padded by 5% on each side.
    pub fn full_range(&self) -> (f64, f64) {
        if self.is_empty() {
            return (0.0, 1.0);
        }
        let lo = self.x_of(0);
        let hi = self.x_of(self.len() - 1);
        let pad = if hi > lo { (hi - lo) * 0.05 } else { 0.5 };
        (lo - pad, hi + pad)
    }

    /// Widen a zero-width interval so it stays visible and selectable:
    /// half a row in row mode, span/(10·points) in timestamp mode.
    pub fn pad_degenerate(&self, x: f64) -> (f64, f64) {
        match self {
            XAxis::Rows { .. } => (x - 0.5, x + 0.5),
            XAxis::Time { seconds } => {
                let span = match (seconds.first(), seconds.last()) {
                    (Some(a), Some(b)) => b - a,
                    _ => 1.0,
                };
                let pad = span / (10.0 * seconds.len().max(1) as f64);
                (x - pad, x + pad)
            }
        }
    }

    /// Row-index bounds of the slice covering `[x_min, x_max]`, with one
    /// extra point on each side for line continuity.
    fn visible_bounds(&self, x_min: f64, x_max: f64) -> (usize, usize) {
        let len = self.len();
        if len == 0 {
            return (0, 0);
        }
        match self {
            XAxis::Rows { .. } => {
                let start = (x_min.floor().max(0.0) as usize).saturating_sub(1);
                let end = ((x_max.ceil().max(0.0) as usize) + 2).min(len);
                (start.min(len), end)
            }
            XAxis::Time { seconds } => {
                let start = seconds.partition_point(|&v| v < x_min).saturating_sub(1);
                let end = (seconds.partition_point(|&v| v <= x_max) + 1).min(len);
                (start, end)
            }
        }
    }
}

/// One series assigned to a subplot, at full resolution.
#[derive(Debug, Clone)]
pub struct SeriesView {
    pub name: String,
    pub values: Vec<f64>,
    pub color: Color32,
}

/// A drawn label rectangle. `entry` indexes into the table's label list so
/// a hit can be mapped back to the label it represents.
#[derive(Debug, Clone)]
pub struct OverlayRect {
    pub x1: f64,
    pub x2: f64,
    pub color: Color32,
    pub entry: usize,
}

/// Per-subplot rendering state: assigned series, visible range, cursor,
/// and overlay rectangles. Rendered line data is cached and recomputed
/// lazily whenever the range changes, always re-slicing from the original
/// series so zooming never compounds downsampling error.
pub struct Viewport {
    pub series: Vec<SeriesView>,
    pub axis: XAxis,
    pub normalize: bool,
    pub x_min: f64,
    pub x_max: f64,
    pub cursor_x: f64,
    pub overlays: Vec<OverlayRect>,
    display: Vec<(usize, Vec<[f64; 2]>)>,
    needs_recompute: bool,
}

impl Viewport {
    pub fn new(series: Vec<SeriesView>, axis: XAxis, normalize: bool) -> Self {
        let (x_min, x_max) = axis.full_range();
        Self {
            series,
            axis,
            normalize,
            x_min,
            x_max,
            cursor_x: x_min,
            overlays: Vec::new(),
            display: Vec::new(),
            needs_recompute: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn reset_view(&mut self) {
        let (lo, hi) = self.axis.full_range();
        self.set_range(lo, hi);
    }

    pub fn set_range(&mut self, x_min: f64, x_max: f64) {
        self.x_min = x_min;
        self.x_max = x_max;
        self.needs_recompute = true;
    }

    pub fn zoom_in(&mut self) {
        self.zoom(ZOOM_IN_FACTOR);
    }

    pub fn zoom_out(&mut self) {
        self.zoom(ZOOM_OUT_FACTOR);
    }

    /// Multiplicative zoom anchored at the cursor's x position.
    fn zoom(&mut self, factor: f64) {
        let anchor = self.cursor_x;
        let width = self.x_max - self.x_min;
        let new_min = anchor + (self.x_min - anchor) / factor;
        let new_max = new_min + width / factor;
        self.set_range(new_min, new_max);
    }

    pub fn set_cursor(&mut self, x: f64) {
        self.cursor_x = x;
    }

    /// Legend goes to the upper-left corner when the cursor sits in the
    /// right half of the visible range, so it never occludes the cursor.
    pub fn legend_left(&self) -> bool {
        let mid = self.x_min + (self.x_max - self.x_min) / 2.0;
        self.cursor_x >= mid
    }

    pub fn resolve_index(&self, x: f64) -> usize {
        self.axis.resolve(x)
    }

    /// Display span of a canonical label range, padded when degenerate.
    pub fn span_of(&self, range: (usize, usize)) -> (f64, f64) {
        if range.0 == range.1 {
            self.axis.pad_degenerate(self.axis.x_of(range.0))
        } else {
            (self.axis.x_of(range.0), self.axis.x_of(range.1))
        }
    }

    /// Hit test the overlay rectangles at a display x. Ties resolve to the
    /// most recently created entry.
    pub fn hit_overlay(&self, x: f64) -> Option<usize> {
        self.overlays
            .iter()
            .rev()
            .find(|r| r.x1 <= x && x <= r.x2)
            .map(|r| r.entry)
    }

    /// Rendered line data for the current range: the visible slice of each
    /// original series, value-normalized if flagged, reduced to the point
    /// budget when the slice still exceeds it.
    pub fn display_series(&mut self) -> &[(usize, Vec<[f64; 2]>)] {
        if self.needs_recompute {
            self.display = self.compute_display();
            self.needs_recompute = false;
        }
        &self.display
    }

    fn compute_display(&self) -> Vec<(usize, Vec<[f64; 2]>)> {
        let (start, end) = self.axis.visible_bounds(self.x_min, self.x_max);
        let mut out = Vec::with_capacity(self.series.len());
        for (slot, series) in self.series.iter().enumerate() {
            let end = end.min(series.values.len());
            let start = start.min(end);

            let xs: Vec<f64> = (start..end).map(|i| self.axis.x_of(i)).collect();
            let mut ys: Vec<f64> = series.values[start..end].to_vec();
            if self.normalize {
                normalize_in_place(&mut ys, &series.values);
            }

            let (xs, ys) = if xs.len() > N_MAX {
                reduce_to_budget(&xs, &ys)
            } else {
                (xs, ys)
            };
            let points = xs
                .into_iter()
                .zip(ys)
                .map(|(x, y)| [x, y])
                .collect();
            out.push((slot, points));
        }
        out
    }

    /// Y bounds of the currently displayed points, padded 5%; fixed to the
    /// unit interval in normalized mode.
    pub fn y_bounds(&mut self) -> (f64, f64) {
        if self.normalize {
            return (-0.05, 1.05);
        }
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for (_, points) in self.display_series() {
            for p in points {
                if p[1].is_finite() {
                    lo = lo.min(p[1]);
                    hi = hi.max(p[1]);
                }
            }
        }
        if !lo.is_finite() || !hi.is_finite() {
            return (0.0, 1.0);
        }
        let pad = ((hi - lo) * 0.05).max(1e-9);
        (lo - pad, hi + pad)
    }
}

/// Scale values into `[0, 1]` using the full series' min/max, so the
/// normalization is stable under zoom.
fn normalize_in_place(visible: &mut [f64], full: &[f64]) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in full {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    let span = hi - lo;
    for v in visible.iter_mut() {
        *v = if span > 0.0 { (*v - lo) / span } else { 0.0 };
    }
}

/// Build one viewport per subplot of the layout. Indices that fell out of
/// the valid header range are skipped rather than panicking; the config
/// layer keeps them rebased so this is a belt check only.
pub fn build_viewports(table: &DataTable, spec: &PlotSpec, roster: &LabelRoster) -> Vec<Viewport> {
    let axis = match table.timestamp_seconds() {
        Some(seconds) => XAxis::Time {
            seconds: seconds.to_vec(),
        },
        None => XAxis::Rows {
            count: table.row_count(),
        },
    };

    let mut viewports: Vec<Viewport> = spec
        .plot
        .iter()
        .enumerate()
        .map(|(subplot, set)| {
            let series: Vec<SeriesView> = set
                .iter()
                .enumerate()
                .filter_map(|(pos, &col)| {
                    let name = table.data_header().get(col)?.clone();
                    let values = table.column(col)?.to_vec();
                    Some(SeriesView {
                        name,
                        values,
                        color: color32_from_hex(color_for_index(pos)),
                    })
                })
                .collect();
            Viewport::new(series, axis.clone(), spec.is_normalized(subplot))
        })
        .collect();

    align_empty_ranges(&mut viewports);
    rebuild_overlays(&mut viewports, table, roster);
    viewports
}

/// Empty subplots still occupy layout space; they adopt the x range of the
/// first non-empty subplot so the stack stays visually aligned.
pub fn align_empty_ranges(viewports: &mut [Viewport]) {
    let shared = viewports
        .iter()
        .find(|v| !v.is_empty())
        .map(|v| (v.x_min, v.x_max));
    if let Some((lo, hi)) = shared {
        for v in viewports.iter_mut().filter(|v| v.is_empty()) {
            v.set_range(lo, hi);
        }
    }
}

/// Recompute every overlay rectangle from the label list. Synchronized
/// labels appear in all subplots, independent ones only in their own.
pub fn rebuild_overlays(viewports: &mut [Viewport], table: &DataTable, roster: &LabelRoster) {
    for v in viewports.iter_mut() {
        v.overlays.clear();
    }
    for (entry, label) in table.labels.iter().enumerate() {
        let color = roster
            .color_of(&label.name)
            .map(color32_from_hex)
            .unwrap_or(Color32::GRAY);
        match label.scope {
            LabelScope::All => {
                for v in viewports.iter_mut() {
                    let (x1, x2) = v.span_of(label.range);
                    v.overlays.push(OverlayRect { x1, x2, color, entry });
                }
            }
            LabelScope::Subplot(i) => {
                if let Some(v) = viewports.get_mut(i) {
                    let (x1, x2) = v.span_of(label.range);
                    v.overlays.push(OverlayRect { x1, x2, color, entry });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_viewport(rows: usize) -> Viewport {
        let values: Vec<f64> = (0..rows).map(|i| i as f64).collect();
        Viewport::new(
            vec![SeriesView {
                name: "v".to_string(),
                values,
                color: Color32::RED,
            }],
            XAxis::Rows { count: rows },
            false,
        )
    }

    fn time_viewport(seconds: Vec<f64>) -> Viewport {
        let values: Vec<f64> = seconds.iter().map(|&s| s * 2.0).collect();
        Viewport::new(
            vec![SeriesView {
                name: "v".to_string(),
                values,
                color: Color32::RED,
            }],
            XAxis::Time { seconds },
            false,
        )
    }

    #[test]
    fn nearest_index_returns_first_local_minimum() {
        let t = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(nearest_index(1.4, &t), 1);
        assert_eq!(nearest_index(1.6, &t), 2);
        assert_eq!(nearest_index(-5.0, &t), 0);
        // Beyond the end the distance never starts increasing.
        assert_eq!(nearest_index(99.0, &t), 4);
    }

    #[test]
    fn row_resolution_rounds_and_clamps() {
        let axis = XAxis::Rows { count: 100 };
        assert_eq!(axis.resolve(10.3), 10);
        assert_eq!(axis.resolve(10.6), 11);
        assert_eq!(axis.resolve(-3.0), 0);
        assert_eq!(axis.resolve(250.0), 99);
    }

    #[test]
    fn degenerate_padding_per_mode() {
        let rows = XAxis::Rows { count: 100 };
        assert_eq!(rows.pad_degenerate(10.0), (9.5, 10.5));

        // 100 points spanning one hour: pad = 3600 / 1000.
        let seconds: Vec<f64> = (0..100).map(|i| i as f64 * 3600.0 / 99.0).collect();
        let time = XAxis::Time { seconds };
        let (a, b) = time.pad_degenerate(1800.0);
        assert!((a - (1800.0 - 3.6)).abs() < 1e-9);
        assert!((b - (1800.0 + 3.6)).abs() < 1e-9);
    }

    #[test]
    fn zoom_in_then_out_restores_the_range() {
        let mut v = row_viewport(1000);
        v.set_cursor(320.0);
        let before = (v.x_min, v.x_max);
        v.zoom_in();
        assert!(v.x_max - v.x_min < before.1 - before.0);
        v.zoom_out();
        assert!((v.x_min - before.0).abs() < 1e-9);
        assert!((v.x_max - before.1).abs() < 1e-9);
    }

    #[test]
    fn zoom_is_anchored_at_the_cursor() {
        let mut v = row_viewport(1000);
        v.set_cursor(100.0);
        v.zoom_in();
        // newMin = anchor + (oldMin - anchor)/2
        let expected_min = 100.0 + (-49.95 - 100.0) / 2.0;
        assert!((v.x_min - expected_min).abs() < 1e-6);
    }

    #[test]
    fn long_slice_is_reduced_and_shrinks_after_zooming_in() {
        let mut v = row_viewport(20_000);
        let full: usize = v.display_series().iter().map(|(_, p)| p.len()).sum();
        assert_eq!(full, crate::processing::downsampling::N_MAX);

        // Zoom deep enough that a short slice is drawn at full resolution,
        // re-sliced from the original series.
        v.set_cursor(10_000.0);
        for _ in 0..4 {
            v.zoom_in();
        }
        let zoomed = &v.display_series()[0].1;
        assert!(zoomed.len() < crate::processing::downsampling::N_MAX);
        for p in zoomed {
            assert_eq!(p[0].fract(), 0.0); // original row positions survive
        }
    }

    #[test]
    fn overlay_hit_prefers_most_recent_entry() {
        let mut v = row_viewport(100);
        v.overlays.push(OverlayRect {
            x1: 10.0,
            x2: 30.0,
            color: Color32::RED,
            entry: 0,
        });
        v.overlays.push(OverlayRect {
            x1: 20.0,
            x2: 40.0,
            color: Color32::BLUE,
            entry: 1,
        });
        assert_eq!(v.hit_overlay(25.0), Some(1));
        assert_eq!(v.hit_overlay(12.0), Some(0));
        assert_eq!(v.hit_overlay(90.0), None);
    }

    #[test]
    fn legend_flips_with_the_cursor_half() {
        let mut v = row_viewport(100);
        v.set_cursor(10.0);
        assert!(!v.legend_left());
        v.set_cursor(90.0);
        assert!(v.legend_left());
    }

    #[test]
    fn empty_viewports_inherit_the_shared_range() {
        let mut viewports = vec![
            Viewport::new(Vec::new(), XAxis::Rows { count: 0 }, false),
            row_viewport(500),
        ];
        viewports[1].set_range(100.0, 200.0);
        align_empty_ranges(&mut viewports);
        assert_eq!(viewports[0].x_min, 100.0);
        assert_eq!(viewports[0].x_max, 200.0);
    }

    #[test]
    fn timestamp_mode_span_uses_real_timestamps() {
        let v = time_viewport(vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(v.span_of((1, 3)), (10.0, 30.0));
    }
}
