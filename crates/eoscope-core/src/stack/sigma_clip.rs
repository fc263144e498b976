use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_CLIP_ITERATIONS, DEFAULT_CLIP_SIGMA};

/// Parameters for sigma-clipped mean stacking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaClipParams {
    /// Maximum number of rejection passes.
    pub iterations: usize,
    /// Samples further than `sigma` standard deviations from the mean are rejected.
    pub sigma: f32,
}

impl Default for SigmaClipParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_CLIP_ITERATIONS,
            sigma: DEFAULT_CLIP_SIGMA,
        }
    }
}

/// Iteratively sigma-clipped mean of `values`.
///
/// `keep` is scratch space and is resized to `values.len()`. Stops early
/// when a pass rejects nothing. If every sample is rejected the plain mean
/// is returned.
pub fn clipped_mean(values: &[f32], params: &SigmaClipParams, keep: &mut Vec<bool>) -> f32 {
    let n = values.len();
    if n == 0 {
        return f32::NAN;
    }
    keep.clear();
    keep.resize(n, true);

    for _ in 0..params.iterations {
        let (mean, stddev) = mean_stddev(values, keep);
        if stddev.is_nan() || stddev <= 1e-12 {
            break;
        }
        let lo = mean - params.sigma as f64 * stddev;
        let hi = mean + params.sigma as f64 * stddev;
        let mut rejected = false;
        for (k, &v) in keep.iter_mut().zip(values) {
            if *k && ((v as f64) < lo || (v as f64) > hi) {
                *k = false;
                rejected = true;
            }
        }
        if !rejected {
            break;
        }
    }

    let (mean, _) = mean_stddev(values, keep);
    if mean.is_nan() {
        super::mean::mean(values)
    } else {
        mean as f32
    }
}

/// Mean and population standard deviation of the kept samples.
fn mean_stddev(values: &[f32], keep: &[bool]) -> (f64, f64) {
    let kept = || values.iter().zip(keep).filter(|&(_, &k)| k).map(|(&v, _)| v as f64);
    let count = kept().count();
    if count == 0 {
        return (f64::NAN, 0.0);
    }
    let mean = kept().sum::<f64>() / count as f64;
    let var = kept().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    (mean, var.sqrt())
}
