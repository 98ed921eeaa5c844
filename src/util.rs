use rand::Rng;

/// Randomize element order in place (Durstenfeld's variant of Fisher–Yates).
pub fn shuffle<T, R>(items: &mut [T], rng: &mut R)
where
    R: Rng + ?Sized,
{
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

/// Bounds `value` by `min` and `max`.
///
/// Bounds that are absent or not finite are ignored rather than treated as
/// zero. A NaN `value` yields NaN.
pub fn clamp(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    if value.is_nan() {
        return f64::NAN;
    }
    let mut out = value;
    if let Some(lo) = min.filter(|b| b.is_finite()) {
        out = out.max(lo);
    }
    if let Some(hi) = max.filter(|b| b.is_finite()) {
        out = out.min(hi);
    }
    out
}

/// Parses `raw` as a number and clamps it; non-numeric text yields NaN.
pub fn clamp_str(raw: &str, min: Option<f64>, max: Option<f64>) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) => clamp(value, min, max),
        Err(_) => f64::NAN,
    }
}
