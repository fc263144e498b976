use serde::{Deserialize, Serialize};

use crate::cell::WorkCell;
use crate::config::AnalysisConfig;
use crate::error::{EoError, Result};
use crate::iterate::{split_rollup_key, Strategy};
use crate::table::{Column, Table, TableStore};
use crate::task::{Extracted, Task, TaskCategory, TaskContext};

use super::superbias_stats::{SuperbiasStatsConfig, SuperbiasStatsTask};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperbiasSummaryConfig {
    #[serde(flatten)]
    pub base: AnalysisConfig,
}

/// Dataset table of every raft's superbias statistics.
pub struct SuperbiasSummaryTask {
    config: SuperbiasSummaryConfig,
}

impl SuperbiasSummaryTask {
    pub fn new(config: SuperbiasSummaryConfig) -> Self {
        Self { config }
    }
}

impl Task for SuperbiasSummaryTask {
    fn name(&self) -> &'static str {
        "SuperbiasSummary"
    }

    fn category(&self) -> TaskCategory {
        TaskCategory::Summary
    }

    fn strategy(&self) -> Strategy {
        Strategy::Summary
    }

    fn config(&self) -> &AnalysisConfig {
        &self.config.base
    }

    fn test_type(&self) -> &'static str {
        "bias"
    }

    fn suffix(&self) -> &'static str {
        "superbias_summary"
    }

    fn upstream(&self) -> Option<Box<dyn Task>> {
        Some(Box::new(SuperbiasStatsTask::new(SuperbiasStatsConfig {
            base: self.config.base.clone(),
        })))
    }

    fn extract(&self, cell: &WorkCell, _ctx: &mut TaskContext<'_>) -> Result<Extracted> {
        let mut per_raft = Vec::with_capacity(cell.files.len());
        for (key, paths) in &cell.files {
            let (raft, run) = split_rollup_key(key)
                .ok_or_else(|| EoError::Config(format!("malformed rollup key {key:?}")))?;
            for path in paths {
                let store = TableStore::load(path)?;
                let stats = store.get("stats")?.clone();
                let n = stats.nrows();
                per_raft.push(
                    stats
                        .with_column("RAFT", Column::Text(vec![raft.to_string(); n]))?
                        .with_column("RUN", Column::Text(vec![run.to_string(); n]))?,
                );
            }
        }

        let refs: Vec<&Table> = per_raft.iter().collect();
        let mut tables = TableStore::new();
        tables.add_table(Table::vstack("stats", &refs)?);
        Ok(Extracted::tables(tables))
    }
}
