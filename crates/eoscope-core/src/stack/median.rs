/// Median by partial selection; reorders `values`. Even counts average the
/// two central samples. Empty input yields `NaN`.
pub fn median(values: &mut [f32]) -> f32 {
    let n = values.len();
    match n {
        0 => f32::NAN,
        1 => values[0],
        _ if n % 2 == 1 => *values.select_nth_unstable_by(n / 2, |a, b| a.total_cmp(b)).1,
        _ => {
            let mid = n / 2;
            let (lower, upper, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            let upper = *upper;
            let lower_max = lower
                .iter()
                .copied()
                .max_by(|a, b| a.total_cmp(b))
                .unwrap_or(upper);
            ((lower_max as f64 + upper as f64) / 2.0) as f32
        }
    }
}
