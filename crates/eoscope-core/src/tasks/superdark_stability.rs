use serde::{Deserialize, Serialize};

use crate::cell::WorkCell;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::figures::FigureSink;
use crate::iterate::Strategy;
use crate::reference::ReferenceKind;
use crate::task::{Extracted, Task, TaskCategory, TaskContext};

use super::superbias_stability::{plot_stability, stability_tables};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperdarkStabilityConfig {
    #[serde(flatten)]
    pub base: AnalysisConfig,
}

/// Superdark level and noise of one sensor tracked across runs.
pub struct SuperdarkStabilityTask {
    config: SuperdarkStabilityConfig,
}

impl SuperdarkStabilityTask {
    pub fn new(config: SuperdarkStabilityConfig) -> Self {
        Self { config }
    }
}

impl Task for SuperdarkStabilityTask {
    fn name(&self) -> &'static str {
        "SuperdarkStability"
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
        "dark"
    }

    fn suffix(&self) -> &'static str {
        "superdark_stability"
    }

    fn reference_kind(&self) -> ReferenceKind {
        ReferenceKind::Superdark
    }

    fn extract(&self, cell: &WorkCell, _ctx: &mut TaskContext<'_>) -> Result<Extracted> {
        Ok(Extracted::tables(stability_tables(cell)?))
    }

    fn plot(&self, extracted: &Extracted, figs: &mut dyn FigureSink) -> Result<()> {
        plot_stability("superdark_stability", extracted, figs, &self.config.base.plot)
    }
}
