/// Point budget per rendered series. Series longer than this are reduced
/// with largest-triangle-three-buckets before plotting.
pub const N_MAX: usize = 4000;

/// Largest-Triangle-Three-Buckets reduction of an `(x, y)` series to
/// `target` points.
///
/// Kept points carry their original x values (row indices or timestamps);
/// no coordinate is ever synthesized, so a selected point can always be
/// mapped back to its canonical row. First and last points are always kept.
pub fn lttb(x: &[f64], y: &[f64], target: usize) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    if n <= target || target < 3 {
        return (x.to_vec(), y.to_vec());
    }

    let mut out_x = Vec::with_capacity(target);
    let mut out_y = Vec::with_capacity(target);
    out_x.push(x[0]);
    out_y.push(y[0]);

    // Interior points fall into target-2 buckets of equal fractional width.
    let bucket_width = (n - 2) as f64 / (target - 2) as f64;
    let bucket_bounds = |b: usize| -> (usize, usize) {
        let start = ((b as f64 * bucket_width) as usize + 1).min(n - 1);
        let end = (((b + 1) as f64 * bucket_width) as usize + 1).clamp(start + 1, n - 1);
        (start, end)
    };

    let mut selected = 0usize;
    for bucket in 0..(target - 2) {
        let (start, end) = bucket_bounds(bucket);

        // Anchor the triangle on the mean of the following bucket.
        let (next_start, next_end) = if bucket + 1 < target - 2 {
            bucket_bounds(bucket + 1)
        } else {
            (n - 1, n)
        };
        let next_end = next_end.max(next_start + 1).min(n);
        let next_len = (next_end - next_start).max(1) as f64;
        let mut mean_x = 0.0;
        let mut mean_y = 0.0;
        for j in next_start..next_end {
            mean_x += x[j];
            mean_y += y[j];
        }
        mean_x /= next_len;
        mean_y /= next_len;

        let ax = x[selected];
        let ay = y[selected];
        let mut best = start;
        let mut best_area = -1.0f64;
        for j in start..end.max(start + 1) {
            let area = ((ax - mean_x) * (y[j] - ay) - (ax - x[j]) * (mean_y - ay)).abs();
            if area > best_area {
                best_area = area;
                best = j;
            }
        }

        out_x.push(x[best]);
        out_y.push(y[best]);
        selected = best;
    }

    out_x.push(x[n - 1]);
    out_y.push(y[n - 1]);
    (out_x, out_y)
}

/// Reduce a series to the rendering budget if it exceeds it.
pub fn reduce_to_budget(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    lttb(x, y, N_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(len: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..len).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..len).map(|i| ((i as f64) * 0.01).sin()).collect();
        (x, y)
    }

    #[test]
    fn long_series_is_reduced_to_exactly_n_max_points() {
        let (x, y) = series(25_000);
        let (dx, dy) = reduce_to_budget(&x, &y);
        assert_eq!(dx.len(), N_MAX);
        assert_eq!(dy.len(), N_MAX);
    }

    #[test]
    fn kept_x_values_are_a_strict_subset_of_the_originals() {
        let (x, y) = series(25_000);
        let (dx, _) = reduce_to_budget(&x, &y);
        // x values are exactly the integer row indices, so integrality means
        // the point was retained and never synthesized.
        for &v in &dx {
            assert_eq!(v.fract(), 0.0);
            assert!(v >= 0.0 && v < 25_000.0);
        }
        // Strictly increasing implies no duplicates: a strict subset.
        assert!(dx.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn endpoints_are_always_retained() {
        let (x, y) = series(10_000);
        let (dx, _) = reduce_to_budget(&x, &y);
        assert_eq!(dx[0], 0.0);
        assert_eq!(*dx.last().unwrap(), 9_999.0);
    }

    #[test]
    fn short_series_passes_through_unchanged() {
        let (x, y) = series(N_MAX);
        let (dx, dy) = reduce_to_budget(&x, &y);
        assert_eq!(dx, x);
        assert_eq!(dy, y);
    }
}
