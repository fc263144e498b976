use serde::{Deserialize, Serialize};

use crate::cell::WorkCell;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::iterate::Strategy;
use crate::table::{Column, Table, TableStore};
use crate::task::{Extracted, Task, TaskCategory, TaskContext};

use super::superbias::{SuperbiasConfig, SuperbiasTask};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperbiasStatsConfig {
    #[serde(flatten)]
    pub base: AnalysisConfig,
}

/// Raft table of the superbias statistics of every slot.
pub struct SuperbiasStatsTask {
    config: SuperbiasStatsConfig,
}

impl SuperbiasStatsTask {
    pub fn new(config: SuperbiasStatsConfig) -> Self {
        Self { config }
    }
}

impl Task for SuperbiasStatsTask {
    fn name(&self) -> &'static str {
        "SuperbiasStats"
    }

    fn category(&self) -> TaskCategory {
        TaskCategory::Table
    }

    fn strategy(&self) -> Strategy {
        Strategy::ByRaft
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

    fn upstream(&self) -> Option<Box<dyn Task>> {
        Some(Box::new(SuperbiasTask::new(SuperbiasConfig {
            base: self.config.base.clone(),
        })))
    }

    fn extract(&self, cell: &WorkCell, _ctx: &mut TaskContext<'_>) -> Result<Extracted> {
        let mut per_slot = Vec::with_capacity(cell.files.len());
        for (slot, paths) in &cell.files {
            for path in paths {
                let store = TableStore::load(path)?;
                let stats = store.get("stats")?.clone();
                let n = stats.nrows();
                per_slot.push(stats.with_column("SLOT", Column::Text(vec![slot.clone(); n]))?);
            }
        }

        let refs: Vec<&Table> = per_slot.iter().collect();
        let mut tables = TableStore::new();
        tables.add_table(Table::vstack("stats", &refs)?);
        Ok(Extracted::tables(tables))
    }
}
