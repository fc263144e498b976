use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{EoError, Result};
use crate::reference::ReferenceFrame;

/// Identity of one unit of iteration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CellId {
    /// One sensor in one run.
    Slot {
        run: String,
        raft: String,
        slot: String,
    },
    /// One raft in one run.
    Raft { run: String, raft: String },
    /// One sensor across every selected run.
    SlotSeries { raft: String, slot: String },
    /// A whole dataset (run list).
    Dataset { name: String },
}

impl CellId {
    pub fn slot(run: &str, raft: &str, slot: &str) -> Self {
        Self::Slot {
            run: run.to_string(),
            raft: raft.to_string(),
            slot: slot.to_string(),
        }
    }

    pub fn raft(run: &str, raft: &str) -> Self {
        Self::Raft {
            run: run.to_string(),
            raft: raft.to_string(),
        }
    }

    pub fn slot_series(raft: &str, slot: &str) -> Self {
        Self::SlotSeries {
            raft: raft.to_string(),
            slot: slot.to_string(),
        }
    }

    pub fn dataset(name: &str) -> Self {
        Self::Dataset {
            name: name.to_string(),
        }
    }

    /// `(run, raft, slot)` of a slot cell.
    pub fn slot_parts(&self) -> Result<(&str, &str, &str)> {
        match self {
            Self::Slot { run, raft, slot } => Ok((run, raft, slot)),
            other => Err(EoError::Config(format!(
                "{other} is not a single-sensor cell"
            ))),
        }
    }

    /// Raft, slot, run: the iteration order of cells.
    fn sort_key(&self) -> (&str, &str, &str) {
        match self {
            Self::Slot { run, raft, slot } => (raft, slot, run),
            Self::Raft { run, raft } => (raft, "", run),
            Self::SlotSeries { raft, slot } => (raft, slot, ""),
            Self::Dataset { name } => ("", "", name),
        }
    }
}

impl Ord for CellId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl PartialOrd for CellId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot { run, raft, slot } => write!(f, "{raft}/{slot} run {run}"),
            Self::Raft { run, raft } => write!(f, "{raft} run {run}"),
            Self::SlotSeries { raft, slot } => write!(f, "{raft}/{slot} (all runs)"),
            Self::Dataset { name } => write!(f, "dataset {name}"),
        }
    }
}

/// A cell with its inputs resolved, handed to `Task::extract`.
#[derive(Clone, Debug)]
pub struct WorkCell {
    pub id: CellId,
    /// Input files by category (raw cells) or by slot/run key (rollup cells).
    pub files: BTreeMap<String, Vec<PathBuf>>,
    pub mask_files: Vec<PathBuf>,
    /// Reference frames by run, for slot-series cells.
    pub references: BTreeMap<String, Arc<ReferenceFrame>>,
}

impl WorkCell {
    pub fn new(id: CellId) -> Self {
        Self {
            id,
            files: BTreeMap::new(),
            mask_files: Vec::new(),
            references: BTreeMap::new(),
        }
    }

    /// Files of one category; absent or empty is a `MissingInput`.
    pub fn files(&self, key: &str) -> Result<&[PathBuf]> {
        match self.files.get(key) {
            Some(paths) if !paths.is_empty() => Ok(paths),
            _ => Err(EoError::MissingInput(format!("no {key} files for {}", self.id))),
        }
    }
}
