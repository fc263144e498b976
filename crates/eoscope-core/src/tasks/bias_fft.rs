use ndarray::{ArrayView2, Axis};
use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::bias::correct;
use crate::cell::WorkCell;
use crate::config::AnalysisConfig;
use crate::error::{EoError, Result};
use crate::frame::AmpId;
use crate::io::sensor::read_input;
use crate::iterate::Strategy;
use crate::table::{Column, TableStore};
use crate::task::{Extracted, Task, TaskCategory, TaskContext};

use super::amp_label;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasFftConfig {
    #[serde(flatten)]
    pub base: AnalysisConfig,
}

/// Correlated read noise: the mean power spectrum of imaging rows.
pub struct BiasFftTask {
    config: BiasFftConfig,
}

impl BiasFftTask {
    pub fn new(config: BiasFftConfig) -> Self {
        Self { config }
    }
}

impl Task for BiasFftTask {
    fn name(&self) -> &'static str {
        "BiasFft"
    }

    fn category(&self) -> TaskCategory {
        TaskCategory::Slot
    }

    fn strategy(&self) -> Strategy {
        Strategy::BySlot
    }

    fn config(&self) -> &AnalysisConfig {
        &self.config.base
    }

    fn test_type(&self) -> &'static str {
        "bias"
    }

    fn suffix(&self) -> &'static str {
        "biasfft"
    }

    fn input_categories(&self) -> &'static [&'static str] {
        &["BIAS"]
    }

    fn extract(&self, cell: &WorkCell, _ctx: &mut TaskContext<'_>) -> Result<Extracted> {
        let cfg = &self.config.base;
        let files = cell.files("BIAS")?;
        let mut planner = FftPlanner::new();

        let mut spectra: Vec<(AmpId, Vec<f64>)> = Vec::new();
        let mut ncols = 0;
        for path in files {
            let raw = read_input(path)?;
            for (i, amp) in raw.amp_ids().into_iter().enumerate() {
                let image = correct(raw.amp(amp)?, raw.geometry(amp)?, cfg.bias, &cfg.overscan, None)?;
                ncols = ncols.max(image.ncols());
                let power = row_power_spectrum(image.view(), &mut planner);
                match spectra.get_mut(i) {
                    Some((id, acc)) if *id == amp && acc.len() == power.len() => {
                        acc.iter_mut().zip(&power).for_each(|(a, p)| *a += p);
                    }
                    Some(_) => {
                        return Err(EoError::Mismatch(format!(
                            "{} amplifier {} does not match earlier files",
                            path.display(),
                            amp_label(amp)
                        )));
                    }
                    None => spectra.push((amp, power)),
                }
            }
        }

        let n = files.len() as f64;
        let nfreq = spectra.first().map_or(0, |(_, p)| p.len());
        let freq = (0..nfreq).map(|k| k as f64 / ncols as f64).collect();
        let mut columns = vec![("FREQ".to_string(), Column::Float(freq))];
        for (amp, acc) in spectra {
            columns.push((amp_label(amp), Column::Float(acc.into_iter().map(|v| v / n).collect())));
        }

        let mut tables = TableStore::new();
        tables.make_table("fft", columns)?;
        Ok(Extracted::tables(tables))
    }
}

/// One-sided power spectrum averaged over the rows of `image`, in cycles per
/// pixel bins `0..=ncols/2`. Each row has its mean removed and non-finite
/// pixels zeroed first.
fn row_power_spectrum(image: ArrayView2<'_, f32>, planner: &mut FftPlanner<f64>) -> Vec<f64> {
    let (h, w) = image.dim();
    let nfreq = w / 2 + 1;
    let mut power = vec![0.0f64; nfreq];
    if h == 0 || w == 0 {
        return power;
    }
    let fft = planner.plan_fft_forward(w);

    for row in image.axis_iter(Axis(0)) {
        let finite: Vec<f64> = row.iter().filter(|v| v.is_finite()).map(|&v| v as f64).collect();
        let mean = if finite.is_empty() {
            0.0
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
        let mut data: Vec<Complex<f64>> = row
            .iter()
            .map(|&v| {
                let x = if v.is_finite() { v as f64 - mean } else { 0.0 };
                Complex::new(x, 0.0)
            })
            .collect();
        fft.process(&mut data);
        for (p, c) in power.iter_mut().zip(&data) {
            *p += c.norm_sqr() / w as f64;
        }
    }

    power.iter_mut().for_each(|p| *p /= h as f64);
    power
}
