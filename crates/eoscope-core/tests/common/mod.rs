use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use eoscope_core::frame::{AmpGeometry, SensorFrame};
use eoscope_core::io::fits::{Bitpix, Header};
use eoscope_core::io::sensor::write_sensor;

/// Seeded generator so noisy fixtures are reproducible.
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Standard normal sample (Box-Muller).
pub fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Sensor frame whose every amplifier is filled with `value`, using the
/// default amplifier layout for `shape`.
pub fn make_frame(n_amps: u8, shape: (usize, usize), value: f32) -> SensorFrame {
    make_frame_with(n_amps, shape, |_, _, _| value)
}

/// Sensor frame with pixel values from `f(amp, row, col)`.
pub fn make_frame_with<F>(n_amps: u8, shape: (usize, usize), f: F) -> SensorFrame
where
    F: Fn(u8, usize, usize) -> f32,
{
    let mut frame = SensorFrame::new(Header::new());
    for amp in 0..n_amps {
        let data = Array2::from_shape_fn(shape, |(r, c)| f(amp, r, c));
        frame.insert_amp(amp, data, AmpGeometry::default_for(shape));
    }
    frame
}

/// Frame of `level + N(0, sigma)` pixels.
pub fn noisy_frame(
    rng: &mut StdRng,
    n_amps: u8,
    shape: (usize, usize),
    level: f64,
    sigma: f64,
) -> SensorFrame {
    let mut frame = SensorFrame::new(Header::new());
    for amp in 0..n_amps {
        let data = Array2::from_shape_simple_fn(shape, || (level + sigma * gaussian(rng)) as f32);
        frame.insert_amp(amp, data, AmpGeometry::default_for(shape));
    }
    frame
}

/// Write `frame` into a directory-catalog tree as
/// `{root}/{run}/{raft}/{slot}/{category}_{index:03}.fits`.
pub fn write_raw(
    root: &Path,
    run: &str,
    raft: &str,
    slot: &str,
    category: &str,
    index: usize,
    frame: &SensorFrame,
) -> PathBuf {
    let path = root
        .join(run)
        .join(raft)
        .join(slot)
        .join(format!("{}_{index:03}.fits", category.to_ascii_lowercase()));
    write_sensor(&path, frame, Bitpix::Float32).expect("write raw frame");
    path
}

/// Write `count` flat-field bias frames of `value` for one sensor.
pub fn write_bias_set(
    root: &Path,
    run: &str,
    raft: &str,
    slot: &str,
    count: usize,
    shape: (usize, usize),
    value: f32,
) -> Vec<PathBuf> {
    (0..count)
        .map(|i| write_raw(root, run, raft, slot, "BIAS", i, &make_frame(2, shape, value)))
        .collect()
}
