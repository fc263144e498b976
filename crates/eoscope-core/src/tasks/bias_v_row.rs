use serde::{Deserialize, Serialize};

use crate::bias::{debias, overscan_row_means};
use crate::cell::WorkCell;
use crate::config::AnalysisConfig;
use crate::error::{EoError, Result};
use crate::io::sensor::read_input;
use crate::iterate::Strategy;
use crate::table::{Column, TableStore};
use crate::task::{Extracted, Task, TaskCategory, TaskContext};

use super::amp_label;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasVRowConfig {
    #[serde(flatten)]
    pub base: AnalysisConfig,
}

/// Residual serial-overscan level per row after bias correction.
pub struct BiasVRowTask {
    config: BiasVRowConfig,
}

impl BiasVRowTask {
    pub fn new(config: BiasVRowConfig) -> Self {
        Self { config }
    }
}

impl Task for BiasVRowTask {
    fn name(&self) -> &'static str {
        "BiasVRow"
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
        "biasval"
    }

    fn input_categories(&self) -> &'static [&'static str] {
        &["BIAS"]
    }

    fn extract(&self, cell: &WorkCell, _ctx: &mut TaskContext<'_>) -> Result<Extracted> {
        let cfg = &self.config.base;
        let files = cell.files("BIAS")?;

        // amp -> per-row sums over files
        let mut sums: Vec<(u8, Vec<f64>)> = Vec::new();
        for path in files {
            let raw = read_input(path)?;
            if !sums.is_empty() && raw.num_amps() != sums.len() {
                return Err(EoError::Mismatch(format!(
                    "{} has {} amplifiers, expected {}",
                    path.display(),
                    raw.num_amps(),
                    sums.len()
                )));
            }
            for (i, amp) in raw.amp_ids().into_iter().enumerate() {
                let geometry = raw.geometry(amp)?;
                let corrected = debias(raw.amp(amp)?, geometry, cfg.bias, &cfg.overscan)?;
                let region = geometry.serial_overscan.clamp(corrected.dim());
                let rows = overscan_row_means(&corrected, &region);
                match sums.get_mut(i) {
                    Some((id, acc)) if *id == amp && acc.len() == rows.len() => {
                        acc.iter_mut().zip(&rows).for_each(|(a, r)| *a += r);
                    }
                    Some(_) => {
                        return Err(EoError::Mismatch(format!(
                            "{} amplifier {} does not match earlier files",
                            path.display(),
                            amp_label(amp)
                        )));
                    }
                    None => sums.push((amp, rows)),
                }
            }
        }

        let n = files.len() as f64;
        let nrows = sums.first().map_or(0, |(_, rows)| rows.len());
        let mut columns = vec![("ROW".to_string(), Column::Int((0..nrows as i64).collect()))];
        for (amp, acc) in sums {
            columns.push((amp_label(amp), Column::Float(acc.into_iter().map(|v| v / n).collect())));
        }

        let mut tables = TableStore::new();
        tables.make_table("biasval", columns)?;
        Ok(Extracted::tables(tables))
    }
}
