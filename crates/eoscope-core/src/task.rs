use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::FileCatalog;
use crate::cell::{CellId, WorkCell};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::figures::FigureSink;
use crate::iterate::Strategy;
use crate::paths::{plot_base, table_path};
use crate::reference::{ReferenceCache, ReferenceFrame, ReferenceKind};
use crate::table::TableStore;

/// Granularity of a task's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Slot,
    Raft,
    Summary,
    Table,
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot => write!(f, "slot"),
            Self::Raft => write!(f, "raft"),
            Self::Summary => write!(f, "summary"),
            Self::Table => write!(f, "table"),
        }
    }
}

/// Output of the extract phase.
#[derive(Clone, Debug, Default)]
pub struct Extracted {
    pub tables: TableStore,
    /// Reference frame built or loaded for this cell, if the task makes one.
    pub frame: Option<Arc<ReferenceFrame>>,
}

impl Extracted {
    pub fn tables(tables: TableStore) -> Self {
        Self {
            tables,
            frame: None,
        }
    }

    pub fn with_frame(tables: TableStore, frame: Arc<ReferenceFrame>) -> Self {
        Self {
            tables,
            frame: Some(frame),
        }
    }
}

/// Shared services available during extraction.
pub struct TaskContext<'a> {
    pub cache: &'a mut ReferenceCache,
    pub catalog: &'a dyn FileCatalog,
}

/// One kind of analysis.
///
/// `extract` computes tables for a resolved cell and must be deterministic;
/// `plot` turns them into figures and never changes them.
pub trait Task {
    fn name(&self) -> &'static str;

    fn category(&self) -> TaskCategory;

    /// Iteration strategy used when none is requested explicitly.
    fn strategy(&self) -> Strategy;

    fn config(&self) -> &AnalysisConfig;

    /// Test-type directory of the outputs (`bias`, `dark`, `flat`, ...).
    fn test_type(&self) -> &'static str;

    /// File name suffix of the outputs.
    fn suffix(&self) -> &'static str;

    /// Raw exposure categories resolved for slot cells.
    fn input_categories(&self) -> &'static [&'static str] {
        &[]
    }

    /// Lower-level task whose outputs a rollup consumes.
    fn upstream(&self) -> Option<Box<dyn Task>> {
        None
    }

    /// Whether extraction goes through the reference cache, which then
    /// handles skip mode itself.
    fn produces_reference(&self) -> bool {
        false
    }

    /// Reference frame a summary-by-slot cell resolves for each run.
    fn reference_kind(&self) -> ReferenceKind {
        ReferenceKind::Superbias
    }

    fn extract(&self, cell: &WorkCell, ctx: &mut TaskContext<'_>) -> Result<Extracted>;

    /// Default figures: one series per table.
    fn plot(&self, extracted: &Extracted, figs: &mut dyn FigureSink) -> Result<()> {
        for table in extracted.tables.tables() {
            figs.series(&format!("{}_{}", self.name(), table.name()), table)?;
        }
        Ok(())
    }

    fn output_path(&self, cell: &CellId) -> PathBuf {
        table_path(&self.config().outdir, self.test_type(), self.suffix(), cell)
    }

    fn plot_base(&self, cell: &CellId) -> PathBuf {
        plot_base(&self.config().outdir, self.test_type(), self.suffix(), cell)
    }
}
