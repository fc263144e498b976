//! Least-squares curve fits used by the overscan models.

use nalgebra::{DMatrix, DVector};

/// Solve the normal equations `ata * x = atb`, falling back to an SVD
/// pseudo-inverse when the system is not positive definite.
fn solve_normal(ata: DMatrix<f64>, atb: DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = ata.clone().cholesky() {
        return Some(chol.solve(&atb));
    }
    ata.svd(true, true).solve(&atb, 1e-12).ok()
}

/// Polynomial in a centred and scaled abscissa.
#[derive(Clone, Debug)]
pub struct Polynomial {
    coeffs: Vec<f64>,
    center: f64,
    scale: f64,
}

impl Polynomial {
    /// Fit a polynomial of the given order. Returns `None` when there are
    /// fewer points than coefficients.
    pub fn fit(x: &[f64], y: &[f64], order: usize) -> Option<Self> {
        let n = x.len().min(y.len());
        let m = order + 1;
        if n < m {
            return None;
        }
        let (lo, hi) = x[..n]
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let center = 0.5 * (lo + hi);
        let scale = if hi > lo { 0.5 * (hi - lo) } else { 1.0 };

        let design = DMatrix::from_fn(n, m, |r, c| ((x[r] - center) / scale).powi(c as i32));
        let rhs = DVector::from_column_slice(&y[..n]);
        let coeffs = solve_normal(design.transpose() * &design, design.transpose() * rhs)?;
        Some(Self {
            coeffs: coeffs.iter().copied().collect(),
            center,
            scale,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.scale;
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * t + c)
    }
}

/// Clamped cubic B-spline fitted by least squares.
#[derive(Clone, Debug)]
pub struct CubicSpline {
    knots: Vec<f64>,
    coeffs: Vec<f64>,
}

const DEGREE: usize = 3;

impl CubicSpline {
    /// Fit with interior knots every `knot_spacing` units across the range of
    /// `x`. Returns `None` when the data cannot constrain the basis.
    pub fn fit(x: &[f64], y: &[f64], knot_spacing: f64) -> Option<Self> {
        let n = x.len().min(y.len());
        if n == 0 || knot_spacing <= 0.0 {
            return None;
        }
        let (lo, hi) = x[..n]
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if hi <= lo {
            return None;
        }

        let mut knots = vec![lo; DEGREE + 1];
        let mut k = lo + knot_spacing;
        while k < hi - 0.5 * knot_spacing {
            knots.push(k);
            k += knot_spacing;
        }
        knots.extend(std::iter::repeat(hi).take(DEGREE + 1));
        let nbasis = knots.len() - DEGREE - 1;
        if n < nbasis {
            return None;
        }

        let mut ata = DMatrix::<f64>::zeros(nbasis, nbasis);
        let mut atb = DVector::<f64>::zeros(nbasis);
        let mut spline = Self {
            knots,
            coeffs: vec![0.0; nbasis],
        };
        for (&xi, &yi) in x[..n].iter().zip(&y[..n]) {
            let span = spline.span(xi);
            let basis = spline.basis(span, xi);
            for (a, &ba) in basis.iter().enumerate() {
                let ia = span - DEGREE + a;
                atb[ia] += ba * yi;
                for (b, &bb) in basis.iter().enumerate() {
                    ata[(ia, span - DEGREE + b)] += ba * bb;
                }
            }
        }
        spline.coeffs = solve_normal(ata, atb)?.iter().copied().collect();
        Some(spline)
    }

    /// Evaluate the spline; `x` outside the fitted range is clamped.
    pub fn eval(&self, x: f64) -> f64 {
        let lo = self.knots[0];
        let hi = self.knots[self.knots.len() - 1];
        let x = x.clamp(lo, hi);
        let span = self.span(x);
        self.basis(span, x)
            .iter()
            .enumerate()
            .map(|(a, b)| b * self.coeffs[span - DEGREE + a])
            .sum()
    }

    /// Knot span index `i` with `knots[i] <= x < knots[i + 1]`.
    fn span(&self, x: f64) -> usize {
        let nbasis = self.knots.len() - DEGREE - 1;
        if x >= self.knots[nbasis] {
            return nbasis - 1;
        }
        let mut i = DEGREE;
        while i < nbasis - 1 && x >= self.knots[i + 1] {
            i += 1;
        }
        i
    }

    /// The four non-zero basis functions at `x` (Cox-de Boor).
    fn basis(&self, span: usize, x: f64) -> [f64; DEGREE + 1] {
        let t = &self.knots;
        let mut n = [0.0; DEGREE + 1];
        let mut left = [0.0; DEGREE + 1];
        let mut right = [0.0; DEGREE + 1];
        n[0] = 1.0;
        for j in 1..=DEGREE {
            left[j] = x - t[span + 1 - j];
            right[j] = t[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                let denom = right[r + 1] + left[j - r];
                let temp = if denom == 0.0 { 0.0 } else { n[r] / denom };
                n[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            n[j] = saved;
        }
        n
    }
}
