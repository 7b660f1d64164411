//! Rounding helpers matching numpy's `round` and `%g` formatting.

/// Round to a fixed number of decimal places, ties to even.
pub fn round_decimals(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(places);
    (value * scale).round_ties_even() / scale
}

/// Round to a number of significant figures, as `%.{sig_figs}g` would.
pub fn limit_precision(value: f64, sig_figs: usize) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let digits = sig_figs.max(1) - 1;
    format!("{value:.digits$e}").parse().unwrap_or(value)
}

/// [`limit_precision`] over a slice.
pub fn limit_precision_all(values: &[f64], sig_figs: usize) -> Vec<f64> {
    values.iter().map(|&v| limit_precision(v, sig_figs)).collect()
}
