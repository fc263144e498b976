#[allow(dead_code)]
mod common;

use approx::assert_relative_eq;
use ndarray::Array2;

use eoscope_core::bias::{correct, debias, row_bias, BiasMethod, OverscanOptions};
use eoscope_core::error::EoError;
use eoscope_core::frame::{AmpGeometry, Region};

/// 60x40 segment: imaging cols 3..20 with signal, overscan cols 20..40
/// carrying `bias(row)`.
fn segment(bias: impl Fn(usize) -> f32, signal: f32) -> (Array2<f32>, AmpGeometry) {
    let geometry = AmpGeometry {
        imaging: Region::new(0..50, 3..20),
        serial_overscan: Region::new(0..50, 20..40),
        parallel_overscan: Region::new(50..60, 3..20),
    };
    let data = Array2::from_shape_fn((60, 40), |(r, c)| {
        let level = bias(r.min(49));
        if (3..20).contains(&c) && r < 50 {
            level + signal
        } else {
            level
        }
    });
    (data, geometry)
}

// ---------------------------------------------------------------------------
// Output shape
// ---------------------------------------------------------------------------

#[test]
fn test_correct_trims_to_imaging() {
    let (raw, geom) = segment(|_| 1000.0, 10.0);
    for method in BiasMethod::ALL {
        let out = correct(&raw, &geom, method, &OverscanOptions::default(), None).unwrap();
        assert_eq!(out.dim(), geom.imaging.shape(), "{method}");
    }
}

#[test]
fn test_debias_keeps_raw_shape() {
    let (raw, geom) = segment(|_| 1000.0, 10.0);
    let out = debias(&raw, &geom, BiasMethod::Row, &OverscanOptions::default()).unwrap();
    assert_eq!(out.dim(), raw.dim());
}

#[test]
fn test_reference_shape_mismatch() {
    let (raw, geom) = segment(|_| 1000.0, 10.0);
    let reference = Array2::zeros((50, 17));
    let err = correct(&raw, &geom, BiasMethod::Mean, &OverscanOptions::default(), Some(&reference))
        .unwrap_err();
    assert!(matches!(err, EoError::ShapeMismatch { .. }));
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

#[test]
fn test_none_is_identity() {
    let (raw, geom) = segment(|_| 1000.0, 10.0);
    let out = correct(&raw, &geom, BiasMethod::None, &OverscanOptions::default(), None).unwrap();
    assert_eq!(out[[0, 0]], 1010.0);
}

#[test]
fn test_mean_removes_constant_offset() {
    let (raw, geom) = segment(|_| 1000.0, 10.0);
    let out = correct(&raw, &geom, BiasMethod::Mean, &OverscanOptions::default(), None).unwrap();
    assert!(out.iter().all(|&v| (v - 10.0).abs() < 1e-3));
}

#[test]
fn test_row_follows_gradient() {
    let (raw, geom) = segment(|r| 1000.0 + 0.5 * r as f32, 10.0);
    let out = correct(&raw, &geom, BiasMethod::Row, &OverscanOptions::default(), None).unwrap();
    assert!(out.iter().all(|&v| (v - 10.0).abs() < 1e-3));
}

#[test]
fn test_row_clamps_outside_overscan_span() {
    let (raw, geom) = segment(|r| 1000.0 + r as f32, 0.0);
    let bias = row_bias(&raw, &geom, BiasMethod::Row, &OverscanOptions::default()).unwrap();
    assert_eq!(bias.len(), 60);
    assert_relative_eq!(bias[59], 1049.0);
}

#[test]
fn test_func_fits_linear_ramp() {
    let (raw, geom) = segment(|r| 900.0 + 2.0 * r as f32, 5.0);
    let out = correct(&raw, &geom, BiasMethod::Func, &OverscanOptions::default(), None).unwrap();
    assert!(out.iter().all(|&v| (v - 5.0).abs() < 1e-2));
}

#[test]
fn test_spline_fits_smooth_curve() {
    let (raw, geom) = segment(|r| 1000.0 + 0.01 * (r as f32).powi(2), 5.0);
    let options = OverscanOptions {
        spline_knot_spacing: 20,
        ..OverscanOptions::default()
    };
    let out = correct(&raw, &geom, BiasMethod::Spline, &options, None).unwrap();
    assert!(out.iter().all(|&v| (v - 5.0).abs() < 1e-2));
}

#[test]
fn test_reference_subtracted_after_overscan() {
    let (raw, geom) = segment(|_| 1000.0, 10.0);
    let reference = Array2::from_elem(raw.dim(), 4.0f32);
    let out = correct(&raw, &geom, BiasMethod::Mean, &OverscanOptions::default(), Some(&reference))
        .unwrap();
    assert!(out.iter().all(|&v| (v - 6.0).abs() < 1e-3));
}

#[test]
fn test_parallel_overscan_step() {
    let (mut raw, geom) = segment(|_| 1000.0, 0.0);
    // column-dependent offset visible in both imaging and parallel overscan
    for ((_, c), v) in raw.indexed_iter_mut() {
        if (3..20).contains(&c) {
            *v += c as f32;
        }
    }
    let options = OverscanOptions {
        parallel: true,
        ..OverscanOptions::default()
    };
    let out = correct(&raw, &geom, BiasMethod::Mean, &options, None).unwrap();
    assert!(out.iter().all(|&v| v.abs() < 1e-3));
}

#[test]
fn test_empty_overscan_is_missing_input() {
    let raw = Array2::from_elem((10, 10), 1.0f32);
    let geom = AmpGeometry {
        imaging: Region::new(0..10, 0..10),
        serial_overscan: Region::new(0..10, 10..10),
        parallel_overscan: Region::new(10..10, 0..10),
    };
    let err = correct(&raw, &geom, BiasMethod::Row, &OverscanOptions::default(), None).unwrap_err();
    assert!(matches!(err, EoError::MissingInput(_)));
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[test]
fn test_method_parsing_is_case_insensitive() {
    assert_eq!("SPLINE".parse::<BiasMethod>().unwrap(), BiasMethod::Spline);
    assert_eq!("Row".parse::<BiasMethod>().unwrap(), BiasMethod::Row);
}

#[test]
fn test_unknown_method() {
    let err = "median".parse::<BiasMethod>().unwrap_err();
    assert!(matches!(err, EoError::InvalidMethod(ref m) if m == "median"));
}

#[test]
fn test_default_geometry_for_full_segment() {
    let geom = AmpGeometry::default_for((2048, 576));
    assert_eq!(geom.imaging.shape(), (2000, 509));
    assert_eq!(geom.serial_overscan.cols, 512..576);
    assert_eq!(geom.parallel_overscan.rows, 2000..2048);
}
