use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cell::WorkCell;
use crate::config::AnalysisConfig;
use crate::error::{EoError, Result};
use crate::figures::FigureSink;
use crate::iterate::Strategy;
use crate::reference::{ReferenceKind, ReferenceOutcome, SourceFiles};
use crate::table::TableStore;
use crate::task::{Extracted, Task, TaskCategory, TaskContext};

use super::{amp_stats_table, slot_superbias};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperdarkConfig {
    #[serde(flatten)]
    pub base: AnalysisConfig,
}

/// Stacks dark exposures after removing the sensor's superbias.
pub struct SuperdarkTask {
    config: SuperdarkConfig,
}

impl SuperdarkTask {
    pub fn new(config: SuperdarkConfig) -> Self {
        Self { config }
    }
}

impl Task for SuperdarkTask {
    fn name(&self) -> &'static str {
        "Superdark"
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
        "dark"
    }

    fn suffix(&self) -> &'static str {
        "superdark_stats"
    }

    fn input_categories(&self) -> &'static [&'static str] {
        &["DARK"]
    }

    fn produces_reference(&self) -> bool {
        true
    }

    fn extract(&self, cell: &WorkCell, ctx: &mut TaskContext<'_>) -> Result<Extracted> {
        let cfg = &self.config.base;
        let superbias = slot_superbias(&cell.id, cfg, ctx)?;
        if superbias.is_none() {
            debug!(cell = %cell.id, "No superbias; stacking darks without it");
        }

        let outcome = ctx.cache.get_or_build(
            &cell.id,
            ReferenceKind::Superdark,
            &cfg.stack_request(),
            cfg.build_policy(),
            superbias.as_deref(),
            |_| {
                Ok(SourceFiles {
                    frames: cell.files("DARK")?.to_vec(),
                    masks: cell.mask_files.clone(),
                })
            },
        )?;

        let frame = match outcome {
            ReferenceOutcome::Failed(e) => return Err(e),
            other => other.into_frame().ok_or_else(|| {
                EoError::MissingInput(format!("no superdark for {} and skip is set", cell.id))
            })?,
        };

        let mut tables = TableStore::new();
        tables.add_table(amp_stats_table("stats", &frame.frame)?);
        Ok(Extracted::with_frame(tables, frame))
    }

    fn plot(&self, extracted: &Extracted, figs: &mut dyn FigureSink) -> Result<()> {
        if let Some(frame) = &extracted.frame {
            figs.sensor_image("superdark", &frame.frame, &self.config.base.plot)?;
        }
        Ok(())
    }
}
