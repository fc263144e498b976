/// Arithmetic mean accumulated in `f64`. Empty input yields `NaN`.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    (sum / values.len() as f64) as f32
}

/// Sample standard deviation (n - 1 denominator). Fewer than two samples
/// yield `NaN`.
pub fn sample_stddev(values: &[f32]) -> f32 {
    let n = values.len();
    if n < 2 {
        return f32::NAN;
    }
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1) as f64;
    var.sqrt() as f32
}
