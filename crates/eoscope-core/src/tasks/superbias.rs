use serde::{Deserialize, Serialize};

use crate::cell::WorkCell;
use crate::config::AnalysisConfig;
use crate::error::{EoError, Result};
use crate::figures::FigureSink;
use crate::iterate::Strategy;
use crate::reference::{ReferenceKind, ReferenceOutcome, SourceFiles};
use crate::table::TableStore;
use crate::task::{Extracted, Task, TaskCategory, TaskContext};

use super::amp_stats_table;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperbiasConfig {
    #[serde(flatten)]
    pub base: AnalysisConfig,
}

/// Builds (or loads) the superbias of a sensor and tabulates its levels.
pub struct SuperbiasTask {
    config: SuperbiasConfig,
}

impl SuperbiasTask {
    pub fn new(config: SuperbiasConfig) -> Self {
        Self { config }
    }
}

impl Task for SuperbiasTask {
    fn name(&self) -> &'static str {
        "Superbias"
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
        "superbias_stats"
    }

    fn input_categories(&self) -> &'static [&'static str] {
        &["BIAS"]
    }

    fn produces_reference(&self) -> bool {
        true
    }

    fn extract(&self, cell: &WorkCell, ctx: &mut TaskContext<'_>) -> Result<Extracted> {
        let cfg = &self.config.base;
        let request = cfg.stack_request();
        // Resolved files already carry the nfiles cap; discovery only runs on a miss.
        let outcome = ctx.cache.get_or_build(
            &cell.id,
            ReferenceKind::Superbias,
            &request,
            cfg.build_policy(),
            None,
            |_| {
                Ok(SourceFiles {
                    frames: cell.files("BIAS")?.to_vec(),
                    masks: cell.mask_files.clone(),
                })
            },
        )?;

        let frame = match outcome {
            ReferenceOutcome::Failed(e) => return Err(e),
            other => other.into_frame().ok_or_else(|| {
                EoError::MissingInput(format!("no superbias for {} and skip is set", cell.id))
            })?,
        };

        let mut tables = TableStore::new();
        tables.add_table(amp_stats_table("stats", &frame.frame)?);
        Ok(Extracted::with_frame(tables, frame))
    }

    fn plot(&self, extracted: &Extracted, figs: &mut dyn FigureSink) -> Result<()> {
        if let Some(frame) = &extracted.frame {
            figs.sensor_image("superbias", &frame.frame, &self.config.base.plot)?;
        }
        for table in extracted.tables.tables() {
            figs.series(&format!("superbias_{}", table.name()), table)?;
        }
        Ok(())
    }
}
