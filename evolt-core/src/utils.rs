//! Module containing miscellaneous utility functions.

use crate::imports::*;

/// return max of 2 f64
pub fn max(a: f64, b: f64) -> f64 {
    a.max(b)
}

/// return min of 2 f64
pub fn min(a: f64, b: f64) -> f64 {
    a.min(b)
}

/// Saturate `x` into the symmetric interval `[-theta, theta]`
pub fn sat(x: f64, theta: f64) -> f64 {
    min(theta, max(-theta, x))
}

/// Cumulative trapezoid integral of `y` over `x`, first element zero
pub fn cumtrapz(y: &Array1<f64>, x: &Array1<f64>) -> Array1<f64> {
    assert!(y.len() == x.len());
    let mut out = Array1::zeros(y.len());
    for i in 1..y.len() {
        out[i] = out[i - 1] + 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
    }
    out
}

/// Derivative of `y` w.r.t. `x`: central differences inside, one-sided at the
/// endpoints
pub fn gradient(y: &Array1<f64>, x: &Array1<f64>) -> Array1<f64> {
    assert!(y.len() == x.len());
    let n = y.len();
    let mut out = Array1::zeros(n);
    if n < 2 {
        return out;
    }
    out[0] = (y[1] - y[0]) / (x[1] - x[0]);
    out[n - 1] = (y[n - 1] - y[n - 2]) / (x[n - 1] - x[n - 2]);
    for i in 1..n - 1 {
        out[i] = (y[i + 1] - y[i - 1]) / (x[i + 1] - x[i - 1]);
    }
    out
}

/// Zero-order-hold lookup of `y_old` sampled at `x_old` onto the grid `x_new`.
/// Each output takes the most recent input sample at or before it.
pub fn zoh_resample(
    x_new: &Array1<f64>,
    x_old: &Array1<f64>,
    y_old: &Array1<f64>,
) -> Array1<f64> {
    assert!(x_old.len() == y_old.len());
    let mut out = Array1::zeros(x_new.len());
    let mut j = 0usize;
    for (i, &x) in x_new.iter().enumerate() {
        while j + 1 < x_old.len() && x_old[j + 1] <= x {
            j += 1;
        }
        out[i] = y_old[j];
    }
    out
}

/// Outcome of sampling a residual over a fixed grid, used to bracket the
/// lowest-abscissa sign change. Non-finite samples break bracketing adjacency
/// and are excluded from the extrema.
pub struct SignScan {
    /// grid cell containing the first sign change, if any
    pub bracket: Option<(f64, f64)>,
    /// minimum over finite samples, NAN if none were finite
    pub min: f64,
    /// maximum over finite samples, NAN if none were finite
    pub max: f64,
}

/// Sample `f` at `n` evenly spaced points on `[lo, hi]` and report the first
/// adjacent pair of finite samples with opposite sign, plus finite extrema.
pub fn scan_sign_change<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64, n: usize) -> SignScan {
    assert!(n >= 2);
    let dx = (hi - lo) / (n - 1) as f64;
    let mut bracket: Option<(f64, f64)> = None;
    let mut y_min = f64::NAN;
    let mut y_max = f64::NAN;
    let mut prev: Option<(f64, f64)> = None;
    for k in 0..n {
        let x = lo + dx * k as f64;
        let y = f(x);
        if !y.is_finite() {
            prev = None;
            continue;
        }
        y_min = if y_min.is_nan() { y } else { y_min.min(y) };
        y_max = if y_max.is_nan() { y } else { y_max.max(y) };
        if bracket.is_none() {
            if let Some((x_prev, y_prev)) = prev {
                if y_prev.signum() != y.signum() {
                    bracket = Some((x_prev, x));
                }
            }
        }
        prev = Some((x, y));
    }
    SignScan {
        bracket,
        min: y_min,
        max: y_max,
    }
}

/// Bisection root refinement on `[lo, hi]`, assuming `f` changes sign across
/// the interval. Runs a fixed iteration count so results are deterministic.
pub fn bisect_root<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64, iters: usize) -> f64 {
    let (mut lo, mut hi) = (lo, hi);
    let mut f_lo = f(lo);
    if f_lo == 0.0 {
        return lo;
    }
    for _ in 0..iters {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid);
        if f_mid == 0.0 || !f_mid.is_finite() {
            return mid;
        }
        if (f_lo < 0.0) == (f_mid < 0.0) {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sat_clamps_both_sides() {
        assert_eq!(sat(5.0, 2.0), 2.0);
        assert_eq!(sat(-5.0, 2.0), -2.0);
        assert_eq!(sat(1.5, 2.0), 1.5);
    }

    #[test]
    fn test_cumtrapz_expected_output() {
        let t = Array1::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let y = Array1::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let expected = Array1::from_vec(vec![0.0, 0.5, 2.0, 4.5]);
        assert_eq!(cumtrapz(&y, &t), expected);
    }

    #[test]
    fn test_gradient_of_linear_ramp_is_constant() {
        let t = Array1::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let y = Array1::from_vec(vec![0.0, 2.0, 4.0, 6.0]);
        for g in gradient(&y, &t).iter() {
            assert!((g - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zoh_resample_holds_last_sample() {
        let x_old = Array1::from_vec(vec![0.0, 1.0, 2.0]);
        let y_old = Array1::from_vec(vec![10.0, 20.0, 30.0]);
        let x_new = Array1::from_vec(vec![0.0, 0.5, 1.0, 1.5, 2.5]);
        let expected = Array1::from_vec(vec![10.0, 10.0, 20.0, 20.0, 30.0]);
        assert_eq!(zoh_resample(&x_new, &x_old, &y_old), expected);
    }

    #[test]
    fn test_scan_finds_first_crossing() {
        // crosses at 2.0 and 8.0; the scan must report the low side
        let f = |x: f64| (x - 2.0) * (x - 8.0);
        let scan = scan_sign_change(f, 0.0, 10.0, 101);
        let (lo, hi) = scan.bracket.unwrap();
        assert!(lo < 2.0 && 2.0 <= hi);
    }

    #[test]
    fn test_scan_skips_nan_regions() {
        let f = |x: f64| {
            if x < 3.0 {
                f64::NAN
            } else {
                x - 5.0
            }
        };
        let scan = scan_sign_change(f, 0.0, 10.0, 101);
        let (lo, hi) = scan.bracket.unwrap();
        assert!(lo < 5.0 && 5.0 <= hi);
        assert!(scan.min < 0.0);
    }

    #[test]
    fn test_scan_reports_extrema_without_crossing() {
        let scan = scan_sign_change(|x| x * x + 1.0, -1.0, 1.0, 11);
        assert!(scan.bracket.is_none());
        assert!(scan.min >= 1.0);
    }

    #[test]
    fn test_bisect_refines_root() {
        let f = |x: f64| x * x - 2.0;
        let root = bisect_root(f, 0.0, 2.0, 60);
        assert!((root - 2.0_f64.sqrt()).abs() < 1e-12);
    }
}
