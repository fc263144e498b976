//! Work-cell enumeration and the single task driver.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{read_runlist, runlist_path, FileCatalog};
use crate::cell::{CellId, WorkCell};
use crate::consts::ALL_SLOTS;
use crate::error::{EoError, Result};
use crate::figures::FigureSink;
use crate::reference::ReferenceOutcome;
use crate::table::TableStore;
use crate::task::{Extracted, Task, TaskContext};
use crate::tasks::catalog_reference;

/// How cells are formed and their inputs resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// One cell per (run, raft, slot); inputs are raw files.
    BySlot,
    /// One cell per (run, raft); inputs are the upstream slot outputs.
    ByRaft,
    /// One cell per (raft, slot) across all runs; inputs are per-run reference frames.
    SummaryBySlot,
    /// One cell for the dataset; inputs are the upstream raft outputs.
    Summary,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BySlot => "by-slot",
            Self::ByRaft => "by-raft",
            Self::SummaryBySlot => "summary-by-slot",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = EoError;

    fn from_str(s: &str) -> Result<Self> {
        [Self::BySlot, Self::ByRaft, Self::SummaryBySlot, Self::Summary]
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EoError::InvalidMethod(s.to_string()))
    }
}

/// Which runs, rafts and slots a task invocation covers.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    /// Explicit run ids. Mutually exclusive with `dataset`.
    pub runs: Vec<String>,
    /// Dataset whose run list supplies `(raft, run)` pairs.
    pub dataset: Option<String>,
    /// Run-list file; defaults to `{dataset}_runs.txt`.
    pub runlist: Option<PathBuf>,
    /// Restrict to these rafts; otherwise every raft the catalog or run list names.
    pub rafts: Option<Vec<String>>,
    /// Restrict to these slots; otherwise all nine.
    pub slots: Option<Vec<String>>,
}

impl Selection {
    pub fn runs(runs: &[&str]) -> Self {
        Self {
            runs: runs.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn dataset(name: &str) -> Self {
        Self {
            dataset: Some(name.to_string()),
            ..Self::default()
        }
    }

    fn slots(&self) -> Vec<String> {
        match &self.slots {
            Some(slots) => slots.clone(),
            None => ALL_SLOTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn raft_allowed(&self, raft: &str) -> bool {
        self.rafts
            .as_ref()
            .map_or(true, |rafts| rafts.iter().any(|r| r == raft))
    }
}

/// Counts reported by [`run_task`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    /// Cells skipped because inputs were absent.
    pub missing: usize,
    /// Cells whose inputs were present but unusable.
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.processed + self.missing + self.failed
    }
}

/// Progress feedback for a task run. All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    /// A task is about to process `total_cells` cells.
    fn begin_task(&self, _task: &str, _total_cells: usize) {}

    /// `cells_done` cells have been handled, the last one being `cell`.
    fn advance(&self, _cells_done: usize, _cell: &CellId) {}

    fn finish_task(&self) {}
}

/// Reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Resolved run/raft layout of a selection.
struct Plan {
    /// run -> rafts
    runs: BTreeMap<String, BTreeSet<String>>,
    slots: Vec<String>,
    dataset: String,
}

impl Plan {
    fn new(task: &dyn Task, selection: &Selection, catalog: &dyn FileCatalog) -> Result<Self> {
        let cfg = task.config();
        if !selection.runs.is_empty() && selection.dataset.is_some() {
            return Err(EoError::Config(
                "select either explicit runs or a dataset, not both".into(),
            ));
        }

        let mut runs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        if let Some(dataset) = &selection.dataset {
            let path = selection
                .runlist
                .clone()
                .unwrap_or_else(|| runlist_path(dataset));
            for (raft, run) in read_runlist(&path)? {
                if selection.raft_allowed(&raft) {
                    runs.entry(run).or_default().insert(raft);
                }
            }
        } else if selection.runs.is_empty() {
            return Err(EoError::Config("no runs selected".into()));
        } else {
            for run in &selection.runs {
                let rafts = match &selection.rafts {
                    Some(rafts) => rafts.clone(),
                    None => catalog.rafts(run)?,
                };
                runs.entry(run.clone()).or_default().extend(rafts);
            }
        }

        let dataset = selection
            .dataset
            .clone()
            .or_else(|| cfg.dataset.clone())
            .unwrap_or_else(|| "custom".to_string());
        Ok(Self {
            runs,
            slots: selection.slots(),
            dataset,
        })
    }

    fn cells(&self, strategy: Strategy) -> Vec<CellId> {
        let mut cells = Vec::new();
        match strategy {
            Strategy::BySlot => {
                for (run, rafts) in &self.runs {
                    for raft in rafts {
                        for slot in &self.slots {
                            cells.push(CellId::slot(run, raft, slot));
                        }
                    }
                }
            }
            Strategy::ByRaft => {
                for (run, rafts) in &self.runs {
                    for raft in rafts {
                        cells.push(CellId::raft(run, raft));
                    }
                }
            }
            Strategy::SummaryBySlot => {
                let rafts: BTreeSet<&String> = self.runs.values().flatten().collect();
                for raft in rafts {
                    for slot in &self.slots {
                        cells.push(CellId::slot_series(raft, slot));
                    }
                }
            }
            Strategy::Summary => cells.push(CellId::dataset(&self.dataset)),
        }
        cells.sort();
        cells
    }

    fn runs_with_raft<'a>(&'a self, raft: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.runs
            .iter()
            .filter(move |(_, rafts)| rafts.contains(raft))
            .map(|(run, _)| run.as_str())
    }
}

/// Key of a rollup input: raft first so that map order is raft, then run.
pub fn rollup_key(raft: &str, run: &str) -> String {
    format!("{raft} {run}")
}

/// Inverse of [`rollup_key`]: `(raft, run)`.
pub fn split_rollup_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(' ')
}

/// Run `task` over every cell of `selection` using `strategy`.
///
/// Cell-local errors are logged and counted; any other error aborts the run.
/// Tables are persisted after extraction succeeds, then plotted when plotting
/// is enabled. Plot failures are logged only.
pub fn run_task(
    task: &dyn Task,
    strategy: Strategy,
    selection: &Selection,
    ctx: &mut TaskContext<'_>,
    figs: &mut dyn FigureSink,
    reporter: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let plan = Plan::new(task, selection, ctx.catalog)?;
    let cells = plan.cells(strategy);
    info!(
        task = task.name(),
        %strategy,
        cells = cells.len(),
        "Starting task"
    );
    reporter.begin_task(task.name(), cells.len());

    let mut summary = RunSummary::default();
    for (i, id) in cells.iter().enumerate() {
        match process_cell(task, strategy, &plan, id, ctx, figs) {
            Ok(()) => summary.processed += 1,
            Err(e) if e.is_cell_local() => {
                warn!(task = task.name(), cell = %id, "{e}");
                if matches!(e, EoError::MissingInput(_)) {
                    summary.missing += 1;
                } else {
                    summary.failed += 1;
                }
            }
            Err(e) => {
                reporter.finish_task();
                return Err(e);
            }
        }
        reporter.advance(i + 1, id);
    }
    reporter.finish_task();

    info!(
        task = task.name(),
        processed = summary.processed,
        missing = summary.missing,
        failed = summary.failed,
        "Task complete"
    );
    Ok(summary)
}

fn process_cell(
    task: &dyn Task,
    strategy: Strategy,
    plan: &Plan,
    id: &CellId,
    ctx: &mut TaskContext<'_>,
    figs: &mut dyn FigureSink,
) -> Result<()> {
    let cfg = task.config();
    let output = task.output_path(id);

    let extracted = if cfg.skip && !task.produces_reference() && output.exists() {
        debug!(cell = %id, path = %output.display(), "Reusing existing output");
        Extracted::tables(TableStore::load(&output)?)
    } else {
        let cell = resolve(task, strategy, plan, id, ctx)?;
        let extracted = task.extract(&cell, ctx)?;
        if !extracted.tables.is_empty() {
            extracted.tables.persist(&output)?;
            debug!(cell = %id, path = %output.display(), "Wrote tables");
        }
        extracted
    };

    if cfg.plot.enabled {
        let plotted = task
            .plot(&extracted, figs)
            .and_then(|()| figs.save(&task.plot_base(id)));
        if let Err(e) = plotted {
            warn!(task = task.name(), cell = %id, "Plotting failed: {e}");
        }
    }
    Ok(())
}

/// Gather the inputs of one cell.
fn resolve(
    task: &dyn Task,
    strategy: Strategy,
    plan: &Plan,
    id: &CellId,
    ctx: &mut TaskContext<'_>,
) -> Result<WorkCell> {
    let cfg = task.config();
    let mut cell = WorkCell::new(id.clone());

    match (strategy, id) {
        (Strategy::BySlot, CellId::Slot { run, raft, slot }) => {
            for &category in task.input_categories() {
                let mut files = ctx.catalog.files(run, raft, slot, category)?;
                if let Some(cap) = cfg.nfiles {
                    files.truncate(cap);
                }
                cell.files.insert(category.to_string(), files);
            }
            if cfg.mask {
                cell.mask_files = ctx.catalog.mask_files(run, raft, slot)?;
            }
        }
        (Strategy::ByRaft, CellId::Raft { run, raft }) => {
            let upstream = upstream_of(task)?;
            for slot in &plan.slots {
                let path = upstream.output_path(&CellId::slot(run, raft, slot));
                if path.exists() {
                    cell.files.insert(slot.clone(), vec![path]);
                } else {
                    debug!(cell = %id, slot = %slot, "No upstream output for slot");
                }
            }
            if cell.files.is_empty() {
                return Err(EoError::MissingInput(format!(
                    "no {} outputs for {id}",
                    upstream.name()
                )));
            }
        }
        (Strategy::SummaryBySlot, CellId::SlotSeries { raft, slot }) => {
            let kind = task.reference_kind();
            let request = cfg.stack_request();
            for run in plan.runs_with_raft(raft) {
                let slot_cell = CellId::slot(run, raft, slot);
                match catalog_reference(&slot_cell, kind, &request, cfg, ctx)? {
                    ReferenceOutcome::Failed(e) => {
                        debug!(cell = %slot_cell, %kind, "No reference frame: {e}");
                    }
                    other => {
                        if let Some(frame) = other.into_frame() {
                            cell.references.insert(run.to_string(), frame);
                        }
                    }
                }
            }
            if cell.references.is_empty() {
                return Err(EoError::MissingInput(format!("no {kind} frames for {id}")));
            }
        }
        (Strategy::Summary, CellId::Dataset { .. }) => {
            let upstream = upstream_of(task)?;
            for (run, rafts) in &plan.runs {
                for raft in rafts {
                    let path = upstream.output_path(&CellId::raft(run, raft));
                    if path.exists() {
                        cell.files.insert(rollup_key(raft, run), vec![path]);
                    } else {
                        warn!(raft = %raft, run = %run, "No {} output; leaving it out of the summary", upstream.name());
                    }
                }
            }
            if cell.files.is_empty() {
                return Err(EoError::MissingInput(format!(
                    "no {} outputs for {id}",
                    upstream.name()
                )));
            }
        }
        (strategy, id) => {
            return Err(EoError::Config(format!(
                "cell {id} does not belong to strategy {strategy}"
            )));
        }
    }
    Ok(cell)
}

fn upstream_of(task: &dyn Task) -> Result<Box<dyn Task>> {
    task.upstream().ok_or_else(|| {
        EoError::Config(format!("{} has no upstream task to roll up", task.name()))
    })
}
