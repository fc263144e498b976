//! Overscan-based bias removal for a single amplifier.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_FUNC_ORDER, DEFAULT_SPLINE_KNOT_SPACING};
use crate::error::{EoError, Result};
use crate::fit::{CubicSpline, Polynomial};
use crate::frame::{AmpGeometry, Region};

/// How the serial overscan is turned into a per-row bias estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasMethod {
    /// No overscan correction.
    None,
    /// Single mean over the whole overscan region.
    Mean,
    /// Per-row overscan mean.
    Row,
    /// Low-order polynomial fitted to the per-row means.
    Func,
    /// Cubic B-spline fitted to the per-row means.
    #[default]
    Spline,
}

impl BiasMethod {
    pub const ALL: [BiasMethod; 5] = [Self::None, Self::Mean, Self::Row, Self::Func, Self::Spline];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mean => "mean",
            Self::Row => "row",
            Self::Func => "func",
            Self::Spline => "spline",
        }
    }
}

impl fmt::Display for BiasMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BiasMethod {
    type Err = EoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EoError::InvalidMethod(s.to_string()))
    }
}

/// Tuning for the overscan models.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverscanOptions {
    /// Polynomial order for [`BiasMethod::Func`].
    pub func_order: usize,
    /// Row spacing between spline knots for [`BiasMethod::Spline`].
    pub spline_knot_spacing: usize,
    /// Also remove the per-column parallel overscan level.
    pub parallel: bool,
}

impl Default for OverscanOptions {
    fn default() -> Self {
        Self {
            func_order: DEFAULT_FUNC_ORDER,
            spline_knot_spacing: DEFAULT_SPLINE_KNOT_SPACING,
            parallel: false,
        }
    }
}

/// Mean of each row of `region` in `raw`, skipping non-finite pixels.
pub fn overscan_row_means(raw: &Array2<f32>, region: &Region) -> Vec<f64> {
    region
        .view(raw)
        .axis_iter(Axis(0))
        .map(|row| finite_mean(row.iter().copied()))
        .collect()
}

fn finite_mean(values: impl Iterator<Item = f32>) -> f64 {
    let (sum, n) = values
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0usize), |(s, n), v| (s + v as f64, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Bias level for every row of the raw amplifier array.
///
/// Rows outside the overscan's row span take the value of the nearest
/// overscan row ([`BiasMethod::Row`]) or the clamped model value.
pub fn row_bias(
    raw: &Array2<f32>,
    geometry: &AmpGeometry,
    method: BiasMethod,
    options: &OverscanOptions,
) -> Result<Vec<f64>> {
    let nrows = raw.nrows();
    if method == BiasMethod::None {
        return Ok(vec![0.0; nrows]);
    }

    let region = geometry.serial_overscan.clamp(raw.dim());
    if region.is_empty() {
        return Err(EoError::MissingInput(format!(
            "serial overscan {} is empty for a {}x{} segment",
            geometry.serial_overscan,
            raw.nrows(),
            raw.ncols()
        )));
    }
    let means = overscan_row_means(raw, &region);
    let first = region.rows.start;
    let last = region.rows.end - 1;

    let bias = match method {
        BiasMethod::None => vec![0.0; nrows],
        BiasMethod::Mean => {
            let level = finite_mean(region.view(raw).iter().copied());
            vec![level; nrows]
        }
        BiasMethod::Row => (0..nrows)
            .map(|r| means[r.clamp(first, last) - first])
            .collect(),
        BiasMethod::Func | BiasMethod::Spline => {
            let (x, y): (Vec<f64>, Vec<f64>) = means
                .iter()
                .enumerate()
                .filter(|(_, m)| m.is_finite())
                .map(|(i, &m)| ((first + i) as f64, m))
                .unzip();
            let model: Box<dyn Fn(f64) -> f64> = if method == BiasMethod::Func {
                let poly = Polynomial::fit(&x, &y, options.func_order).ok_or_else(|| {
                    EoError::MissingInput("too few overscan rows for polynomial fit".into())
                })?;
                Box::new(move |r| poly.eval(r))
            } else {
                let spline = CubicSpline::fit(&x, &y, options.spline_knot_spacing as f64)
                    .ok_or_else(|| {
                        EoError::MissingInput("too few overscan rows for spline fit".into())
                    })?;
                Box::new(move |r| spline.eval(r))
            };
            (0..nrows)
                .map(|r| model(r.clamp(first, last) as f64))
                .collect()
        }
    };
    Ok(bias)
}

/// Remove the overscan bias from the full raw array; the output keeps the
/// raw shape so that stacked references line up with raw frames.
pub fn debias(
    raw: &Array2<f32>,
    geometry: &AmpGeometry,
    method: BiasMethod,
    options: &OverscanOptions,
) -> Result<Array2<f32>> {
    let bias = row_bias(raw, geometry, method, options)?;
    let mut out = raw.clone();
    for (mut row, level) in out.axis_iter_mut(Axis(0)).zip(&bias) {
        let level = *level as f32;
        row.mapv_inplace(|v| v - level);
    }

    if options.parallel && method != BiasMethod::None {
        let region = geometry.parallel_overscan.clamp(out.dim());
        if !region.is_empty() {
            let col_levels: Vec<f64> = region
                .view(&out)
                .axis_iter(Axis(1))
                .map(|col| finite_mean(col.iter().copied()))
                .collect();
            for (offset, level) in col_levels.into_iter().enumerate() {
                if level.is_finite() {
                    let level = level as f32;
                    out.column_mut(region.cols.start + offset)
                        .mapv_inplace(|v| v - level);
                }
            }
        }
    }
    Ok(out)
}

/// Debias, subtract an optional full-shape reference frame, and trim to the
/// imaging region.
pub fn correct(
    raw: &Array2<f32>,
    geometry: &AmpGeometry,
    method: BiasMethod,
    options: &OverscanOptions,
    reference: Option<&Array2<f32>>,
) -> Result<Array2<f32>> {
    if let Some(reference) = reference {
        if reference.dim() != raw.dim() {
            return Err(EoError::ShapeMismatch {
                expected: raw.dim(),
                found: reference.dim(),
            });
        }
    }
    let mut out = debias(raw, geometry, method, options)?;
    if let Some(reference) = reference {
        out -= reference;
    }
    Ok(geometry.imaging.view(&out).to_owned())
}
