use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bias::correct;
use crate::cell::WorkCell;
use crate::config::AnalysisConfig;
use crate::consts::DEFAULT_EXPTIME_TOLERANCE;
use crate::error::{EoError, Result};
use crate::frame::SensorFrame;
use crate::io::sensor::read_input;
use crate::iterate::Strategy;
use crate::reference::ReferenceFrame;
use crate::table::{Column, TableStore};
use crate::task::{Extracted, Task, TaskCategory, TaskContext};

use super::{amp_label, pixel_stats, slot_superbias};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatPairConfig {
    #[serde(flatten)]
    pub base: AnalysisConfig,
    /// Largest allowed EXPTIME difference within a pair, in seconds.
    pub exptime_tolerance: f64,
}

impl Default for FlatPairConfig {
    fn default() -> Self {
        Self {
            base: AnalysisConfig::default(),
            exptime_tolerance: DEFAULT_EXPTIME_TOLERANCE,
        }
    }
}

/// Mean signal and shot-noise variance from pairs of flats taken at the
/// same exposure time.
pub struct FlatPairTask {
    config: FlatPairConfig,
}

impl FlatPairTask {
    pub fn new(config: FlatPairConfig) -> Self {
        Self { config }
    }
}

impl Task for FlatPairTask {
    fn name(&self) -> &'static str {
        "FlatPair"
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
        "flat"
    }

    fn suffix(&self) -> &'static str {
        "flat"
    }

    fn input_categories(&self) -> &'static [&'static str] {
        &["FLAT1", "FLAT2"]
    }

    fn extract(&self, cell: &WorkCell, ctx: &mut TaskContext<'_>) -> Result<Extracted> {
        let cfg = &self.config.base;
        let first = cell.files("FLAT1")?;
        let second = cell.files("FLAT2")?;
        if first.len() != second.len() {
            return Err(EoError::Mismatch(format!(
                "{} FLAT1 files but {} FLAT2 files",
                first.len(),
                second.len()
            )));
        }

        let superbias = slot_superbias(&cell.id, cfg, ctx)?;
        if superbias.is_none() {
            debug!(cell = %cell.id, "No superbias; flats corrected by overscan only");
        }

        let mut exptimes = Vec::with_capacity(first.len());
        let mut amp_columns: Vec<(String, Vec<f64>, Vec<f64>)> = Vec::new();
        for (p1, p2) in first.iter().zip(second) {
            let f1 = read_input(p1)?;
            let f2 = read_input(p2)?;
            let t1 = f1.exposure_time().unwrap_or(0.0);
            let t2 = f2.exposure_time().unwrap_or(0.0);
            if (t1 - t2).abs() > self.config.exptime_tolerance {
                return Err(EoError::Mismatch(format!(
                    "flat pair {} / {} has EXPTIME {t1} vs {t2}",
                    p1.display(),
                    p2.display()
                )));
            }
            f1.ensure_same_shape(&f2)?;
            exptimes.push(t1);

            let pair = self.pair_stats(&f1, &f2, superbias.as_deref())?;
            if amp_columns.is_empty() {
                amp_columns = pair
                    .iter()
                    .map(|(label, _, _)| (label.clone(), Vec::new(), Vec::new()))
                    .collect();
            }
            if pair.len() != amp_columns.len() {
                return Err(EoError::Mismatch(format!(
                    "{} has a different amplifier set",
                    p1.display()
                )));
            }
            for ((_, means, vars), (_, mean, var)) in amp_columns.iter_mut().zip(pair) {
                means.push(mean);
                vars.push(var);
            }
        }

        let mut columns = vec![("EXPTIME".to_string(), Column::Float(exptimes))];
        for (label, means, vars) in amp_columns {
            columns.push((format!("{label}_MEAN"), Column::Float(means)));
            columns.push((format!("{label}_VAR"), Column::Float(vars)));
        }
        let mut tables = TableStore::new();
        tables.make_table("flat", columns)?;
        Ok(Extracted::tables(tables))
    }
}

impl FlatPairTask {
    /// `(label, mean signal, half the variance of the difference)` per amplifier.
    fn pair_stats(
        &self,
        f1: &SensorFrame,
        f2: &SensorFrame,
        superbias: Option<&ReferenceFrame>,
    ) -> Result<Vec<(String, f64, f64)>> {
        let cfg = &self.config.base;
        f1.amp_ids()
            .into_iter()
            .map(|amp| {
                let reference = superbias.map(|sb| sb.frame.amp(amp)).transpose()?;
                let c1 = correct(f1.amp(amp)?, f1.geometry(amp)?, cfg.bias, &cfg.overscan, reference)?;
                let c2 = correct(f2.amp(amp)?, f2.geometry(amp)?, cfg.bias, &cfg.overscan, reference)?;
                let s1 = pixel_stats(c1.view());
                let s2 = pixel_stats(c2.view());
                let diff = &c1 - &c2;
                let d = pixel_stats(diff.view());
                Ok((amp_label(amp), (s1.mean + s2.mean) / 2.0, d.std * d.std / 2.0))
            })
            .collect()
    }
}
