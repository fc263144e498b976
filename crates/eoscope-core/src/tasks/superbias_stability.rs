use serde::{Deserialize, Serialize};

use crate::cell::WorkCell;
use crate::config::{AnalysisConfig, PlotConfig};
use crate::error::Result;
use crate::figures::{FigureSink, Histogram};
use crate::iterate::Strategy;
use crate::table::{Column, TableStore};
use crate::task::{Extracted, Task, TaskCategory, TaskContext};

use super::pixel_stats;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperbiasStabilityConfig {
    #[serde(flatten)]
    pub base: AnalysisConfig,
}

/// Superbias level and noise of one sensor tracked across runs.
pub struct SuperbiasStabilityTask {
    config: SuperbiasStabilityConfig,
}

impl SuperbiasStabilityTask {
    pub fn new(config: SuperbiasStabilityConfig) -> Self {
        Self { config }
    }
}

impl Task for SuperbiasStabilityTask {
    fn name(&self) -> &'static str {
        "SuperbiasStability"
    }

    fn category(&self) -> TaskCategory {
        TaskCategory::Summary
    }

    fn strategy(&self) -> Strategy {
        Strategy::SummaryBySlot
    }

    fn config(&self) -> &AnalysisConfig {
        &self.config.base
    }

    fn test_type(&self) -> &'static str {
        "bias"
    }

    fn suffix(&self) -> &'static str {
        "superbias_stability"
    }

    fn extract(&self, cell: &WorkCell, _ctx: &mut TaskContext<'_>) -> Result<Extracted> {
        Ok(Extracted::tables(stability_tables(cell)?))
    }

    fn plot(&self, extracted: &Extracted, figs: &mut dyn FigureSink) -> Result<()> {
        plot_stability("superbias_stability", extracted, figs, &self.config.base.plot)
    }
}

/// Per run and amplifier: mean and standard deviation of the imaging region
/// of every reference frame the cell resolved.
pub(crate) fn stability_tables(cell: &WorkCell) -> Result<TableStore> {
    let mut runs = Vec::new();
    let mut amps = Vec::new();
    let mut means = Vec::new();
    let mut stds = Vec::new();
    for (run, reference) in &cell.references {
        for amp in reference.frame.amp_ids() {
            let stats = pixel_stats(reference.frame.imaging(amp)?);
            runs.push(run.clone());
            amps.push(amp as i64 + 1);
            means.push(stats.mean);
            stds.push(stats.std);
        }
    }

    let mut tables = TableStore::new();
    tables.make_table(
        "stability",
        vec![
            ("RUN".into(), Column::Text(runs)),
            ("AMP".into(), Column::Int(amps)),
            ("MEAN".into(), Column::Float(means)),
            ("STD".into(), Column::Float(stds)),
        ],
    )?;
    Ok(tables)
}

pub(crate) fn plot_stability(
    name: &str,
    extracted: &Extracted,
    figs: &mut dyn FigureSink,
    plot: &PlotConfig,
) -> Result<()> {
    let table = extracted.tables.get("stability")?;
    figs.series(name, table)?;
    if plot.stats_hist {
        let hist = Histogram::build(table.float("MEAN")?.iter().copied(), plot);
        figs.histogram(&format!("{name}_mean"), &hist)?;
    }
    Ok(())
}
