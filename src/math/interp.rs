//! Grid helpers: nearest-pixel lookup, linear interpolation, window masks.
//!
//! Wavelength grids are assumed to be sorted ascending. Callers validate this when a
//! `Spectrum` is constructed.

/// Index of the grid point closest to `x`.
///
/// Returns `None` for an empty grid.
pub fn nearest_index(grid: &[f64], x: f64) -> Option<usize> {
    if grid.is_empty() {
        return None;
    }
    let pos = grid.partition_point(|&g| g < x);
    if pos == 0 {
        return Some(0);
    }
    if pos >= grid.len() {
        return Some(grid.len() - 1);
    }
    let left = grid[pos - 1];
    let right = grid[pos];
    if (x - left) <= (right - x) {
        Some(pos - 1)
    } else {
        Some(pos)
    }
}

/// Linearly interpolate `(xp, fp)` at `x`.
///
/// Points outside `[xp[0], xp[n-1]]` get `fill`.
pub fn interp_linear(x: f64, xp: &[f64], fp: &[f64], fill: f64) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 || !x.is_finite() {
        return fill;
    }
    if x < xp[0] || x > xp[n - 1] {
        return fill;
    }
    if n == 1 {
        return fp[0];
    }
    let pos = xp[..n].partition_point(|&g| g < x);
    if pos == 0 {
        return fp[0];
    }
    let (x0, x1) = (xp[pos - 1], xp[pos]);
    let (y0, y1) = (fp[pos - 1], fp[pos]);
    if (x1 - x0).abs() < 1e-300 {
        return y0;
    }
    let u = (x - x0) / (x1 - x0);
    y0 + u * (y1 - y0)
}

/// Interpolate onto a whole grid.
pub fn interp_onto(xs: &[f64], xp: &[f64], fp: &[f64], fill: f64) -> Vec<f64> {
    xs.iter().map(|&x| interp_linear(x, xp, fp, fill)).collect()
}

/// `true` where `lo < x < hi` (open interval, matching the window selections used for fitting).
pub fn window_mask(xs: &[f64], lo: f64, hi: f64) -> Vec<bool> {
    xs.iter().map(|&x| x > lo && x < hi).collect()
}

/// Select elements where `mask` is set.
pub fn select<T: Copy>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask.iter())
        .filter_map(|(&v, &m)| if m { Some(v) } else { None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_index_picks_closest() {
        let grid = [1.0, 2.0, 4.0, 8.0];
        assert_eq!(nearest_index(&grid, 0.0), Some(0));
        assert_eq!(nearest_index(&grid, 2.9), Some(1));
        assert_eq!(nearest_index(&grid, 3.1), Some(2));
        assert_eq!(nearest_index(&grid, 100.0), Some(3));
        assert_eq!(nearest_index(&[], 1.0), None);
    }

    #[test]
    fn interp_inside_and_outside() {
        let xp = [0.0, 10.0];
        let fp = [0.0, 100.0];
        assert!((interp_linear(2.5, &xp, &fp, 0.0) - 25.0).abs() < 1e-12);
        assert_eq!(interp_linear(-1.0, &xp, &fp, 0.0), 0.0);
        assert_eq!(interp_linear(11.0, &xp, &fp, -5.0), -5.0);
        assert!((interp_linear(10.0, &xp, &fp, 0.0) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn window_mask_is_open() {
        let m = window_mask(&[4700.0, 4800.0, 5100.0], 4700.0, 5100.0);
        assert_eq!(m, vec![false, true, false]);
    }
}
