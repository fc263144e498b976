#[allow(dead_code)]
mod common;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use eoscope_core::bias::BiasMethod;
use eoscope_core::catalog::{read_runlist, DirectoryCatalog};
use eoscope_core::cell::CellId;
use eoscope_core::config::AnalysisConfig;
use eoscope_core::error::EoError;
use eoscope_core::figures::{ManifestFigures, NullFigures};
use eoscope_core::iterate::{run_task, ProgressReporter, RunSummary, Selection, Strategy};
use eoscope_core::paths::table_path;
use eoscope_core::reference::ReferenceCache;
use eoscope_core::table::{Column, TableStore};
use eoscope_core::task::{Task, TaskContext};
use eoscope_core::tasks::{
    BiasFftConfig, BiasFftTask, BiasVRowConfig, BiasVRowTask, FlatPairConfig, FlatPairTask,
    SuperbiasConfig, SuperbiasStabilityConfig, SuperbiasStabilityTask, SuperbiasStatsConfig,
    SuperbiasStatsTask, SuperbiasSummaryConfig, SuperbiasSummaryTask, SuperbiasTask,
    SuperdarkStabilityConfig, SuperdarkStabilityTask,
};

use common::{make_frame, make_frame_with, write_bias_set, write_raw};

const SHAPE: (usize, usize) = (60, 40);

struct Workspace {
    dir: TempDir,
    catalog: DirectoryCatalog,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let catalog = DirectoryCatalog::new(dir.path().join("raw"));
        Self { dir, catalog }
    }

    fn raw(&self) -> &Path {
        self.catalog.root()
    }

    fn outdir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn config(&self) -> AnalysisConfig {
        AnalysisConfig {
            outdir: self.outdir(),
            bias: BiasMethod::None,
            ..AnalysisConfig::default()
        }
    }

    fn run(&self, task: &dyn Task, selection: &Selection) -> eoscope_core::error::Result<RunSummary> {
        self.run_with(task, task.strategy(), selection, &NoReport)
    }

    fn run_with(
        &self,
        task: &dyn Task,
        strategy: Strategy,
        selection: &Selection,
        reporter: &dyn ProgressReporter,
    ) -> eoscope_core::error::Result<RunSummary> {
        let cfg = task.config();
        let mut cache = ReferenceCache::new(cfg.outdir.clone(), cfg.bitpix);
        let mut ctx = TaskContext {
            cache: &mut cache,
            catalog: &self.catalog,
        };
        run_task(task, strategy, selection, &mut ctx, &mut NullFigures, reporter)
    }
}

struct NoReport;
impl ProgressReporter for NoReport {}

#[derive(Default)]
struct Recorder {
    cells: Mutex<Vec<String>>,
}

impl ProgressReporter for Recorder {
    fn advance(&self, _cells_done: usize, cell: &CellId) {
        self.cells.lock().unwrap().push(cell.to_string());
    }
}

fn slots(names: &[&str]) -> Option<Vec<String>> {
    Some(names.iter().map(|s| s.to_string()).collect())
}

// ---------------------------------------------------------------------------
// Cell ordering and error accounting
// ---------------------------------------------------------------------------

#[test]
fn test_cells_ordered_by_raft_slot_run() {
    let ws = Workspace::new();
    for run in ["r2", "r1"] {
        for slot in ["S11", "S00"] {
            write_bias_set(ws.raw(), run, "R22", slot, 3, SHAPE, 1000.0);
        }
    }
    write_bias_set(ws.raw(), "r1", "R10", "S00", 3, SHAPE, 1000.0);

    let task = SuperbiasTask::new(SuperbiasConfig { base: ws.config() });
    let selection = Selection {
        slots: slots(&["S11", "S00"]),
        ..Selection::runs(&["r2", "r1"])
    };
    let recorder = Recorder::default();
    let summary = ws
        .run_with(&task, Strategy::BySlot, &selection, &recorder)
        .unwrap();

    assert_eq!(
        *recorder.cells.lock().unwrap(),
        vec![
            "R10/S00 run r1",
            "R10/S11 run r1",
            "R22/S00 run r1",
            "R22/S00 run r2",
            "R22/S11 run r1",
            "R22/S11 run r2",
        ]
    );
    assert_eq!(
        summary,
        RunSummary {
            processed: 5,
            missing: 1,
            failed: 0
        }
    );
    let stats = TableStore::load(&task.output_path(&CellId::slot("r1", "R22", "S00"))).unwrap();
    let mean = stats.get("stats").unwrap().float("MEAN").unwrap();
    assert_eq!(mean, &[1000.0, 1000.0]);
}

#[test]
fn test_insufficient_input_is_counted_as_failed() {
    let ws = Workspace::new();
    write_bias_set(ws.raw(), "r1", "R22", "S00", 2, SHAPE, 1000.0);
    let task = SuperbiasTask::new(SuperbiasConfig { base: ws.config() });
    let selection = Selection {
        slots: slots(&["S00"]),
        ..Selection::runs(&["r1"])
    };
    let summary = ws.run(&task, &selection).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 0);
    assert!(!task.output_path(&CellId::slot("r1", "R22", "S00")).exists());
}

#[test]
fn test_unreadable_input_spoils_only_its_cell() {
    let ws = Workspace::new();
    write_bias_set(ws.raw(), "r1", "R22", "S00", 3, SHAPE, 1000.0);
    write_bias_set(ws.raw(), "r1", "R22", "S02", 3, SHAPE, 1000.0);
    write_bias_set(ws.raw(), "r1", "R22", "S01", 2, SHAPE, 1000.0);
    std::fs::write(ws.raw().join("r1/R22/S01/bias_002.fits"), b"not a fits file").unwrap();

    let selection = Selection {
        slots: slots(&["S00", "S01", "S02"]),
        ..Selection::runs(&["r1"])
    };
    let per_file = BiasVRowTask::new(BiasVRowConfig { base: ws.config() });
    let summary = ws.run(&per_file, &selection).unwrap();
    assert_eq!((summary.processed, summary.failed), (2, 1));

    let stacked = SuperbiasTask::new(SuperbiasConfig { base: ws.config() });
    let summary = ws.run(&stacked, &selection).unwrap();
    assert_eq!((summary.processed, summary.failed), (2, 1));
    assert!(!stacked.output_path(&CellId::slot("r1", "R22", "S01")).exists());
    assert!(stacked.output_path(&CellId::slot("r1", "R22", "S02")).exists());
}

#[test]
fn test_mismatched_frame_shape_spoils_only_its_cell() {
    let ws = Workspace::new();
    write_bias_set(ws.raw(), "r1", "R22", "S00", 2, SHAPE, 1000.0);
    write_raw(ws.raw(), "r1", "R22", "S00", "BIAS", 2, &make_frame(2, (50, 40), 1000.0));
    write_bias_set(ws.raw(), "r1", "R22", "S11", 3, SHAPE, 1000.0);

    let task = SuperbiasTask::new(SuperbiasConfig { base: ws.config() });
    let selection = Selection {
        slots: slots(&["S00", "S11"]),
        ..Selection::runs(&["r1"])
    };
    let summary = ws.run(&task, &selection).unwrap();
    assert_eq!((summary.processed, summary.failed), (1, 1));
}

#[test]
fn test_runs_and_dataset_are_exclusive() {
    let ws = Workspace::new();
    let task = SuperbiasTask::new(SuperbiasConfig { base: ws.config() });
    let selection = Selection {
        dataset: Some("ds".into()),
        ..Selection::runs(&["r1"])
    };
    assert!(matches!(ws.run(&task, &selection), Err(EoError::Config(_))));
}

// ---------------------------------------------------------------------------
// Skip mode
// ---------------------------------------------------------------------------

#[test]
fn test_skip_reuses_existing_tables() {
    let ws = Workspace::new();
    let files = write_bias_set(ws.raw(), "r1", "R22", "S00", 3, SHAPE, 1000.0);
    let selection = Selection {
        slots: slots(&["S00"]),
        ..Selection::runs(&["r1"])
    };
    let task = BiasVRowTask::new(BiasVRowConfig { base: ws.config() });
    assert_eq!(ws.run(&task, &selection).unwrap().processed, 1);

    for f in files {
        std::fs::remove_file(f).unwrap();
    }
    let again = ws.run(&task, &selection).unwrap();
    assert_eq!(again.missing, 1);

    let skipping = BiasVRowTask::new(BiasVRowConfig {
        base: AnalysisConfig {
            skip: true,
            ..ws.config()
        },
    });
    assert_eq!(ws.run(&skipping, &selection).unwrap().processed, 1);
}

// ---------------------------------------------------------------------------
// Slot tasks
// ---------------------------------------------------------------------------

#[test]
fn test_bias_v_row_table() {
    let ws = Workspace::new();
    for i in 0..2 {
        let frame = make_frame_with(2, SHAPE, |_, r, _| 1000.0 + r as f32 + i as f32);
        write_raw(ws.raw(), "r1", "R22", "S00", "BIAS", i, &frame);
    }
    let task = BiasVRowTask::new(BiasVRowConfig { base: ws.config() });
    let selection = Selection {
        slots: slots(&["S00"]),
        ..Selection::runs(&["r1"])
    };
    ws.run(&task, &selection).unwrap();

    let store = TableStore::load(&task.output_path(&CellId::slot("r1", "R22", "S00"))).unwrap();
    let table = store.get("biasval").unwrap();
    assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["ROW", "AMP01", "AMP02"]);
    // serial overscan spans the imaging rows only
    assert_eq!(table.nrows(), 30);
    let amp1 = table.float("AMP01").unwrap();
    assert!((amp1[10] - 1010.5).abs() < 1e-6);
}

#[test]
fn test_bias_fft_table() {
    let ws = Workspace::new();
    write_bias_set(ws.raw(), "r1", "R22", "S00", 2, SHAPE, 1000.0);
    let task = BiasFftTask::new(BiasFftConfig { base: ws.config() });
    let selection = Selection {
        slots: slots(&["S00"]),
        ..Selection::runs(&["r1"])
    };
    assert_eq!(ws.run(&task, &selection).unwrap().processed, 1);

    let store = TableStore::load(&task.output_path(&CellId::slot("r1", "R22", "S00"))).unwrap();
    let table = store.get("fft").unwrap();
    assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["FREQ", "AMP01", "AMP02"]);
    let freq = table.float("FREQ").unwrap();
    assert_eq!(freq[0], 0.0);
    assert!(freq.iter().all(|&f| f <= 0.5));
    assert!(table.float("AMP01").unwrap().iter().all(|&p| p < 1e-9));
}

fn write_flat_pair(ws: &Workspace, index: usize, t1: f64, t2: f64) {
    for (category, t, level) in [("FLAT1", t1, 5000.0f32), ("FLAT2", t2, 5010.0)] {
        let mut frame = make_frame(2, SHAPE, level);
        frame.header.set_float("EXPTIME", t);
        write_raw(ws.raw(), "r1", "R22", "S00", category, index, &frame);
    }
}

#[test]
fn test_flat_pair_table() {
    let ws = Workspace::new();
    write_flat_pair(&ws, 0, 1.0, 1.0);
    write_flat_pair(&ws, 1, 2.0, 2.0);
    let task = FlatPairTask::new(FlatPairConfig {
        base: ws.config(),
        ..FlatPairConfig::default()
    });
    let selection = Selection {
        slots: slots(&["S00"]),
        ..Selection::runs(&["r1"])
    };
    assert_eq!(ws.run(&task, &selection).unwrap().processed, 1);

    let store = TableStore::load(&task.output_path(&CellId::slot("r1", "R22", "S00"))).unwrap();
    let table = store.get("flat").unwrap();
    assert_eq!(table.float("EXPTIME").unwrap(), &[1.0, 2.0]);
    assert_eq!(table.float("AMP01_MEAN").unwrap(), &[5005.0, 5005.0]);
    assert_eq!(table.float("AMP02_VAR").unwrap(), &[0.0, 0.0]);
}

#[test]
fn test_flat_pair_exptime_mismatch() {
    let ws = Workspace::new();
    write_flat_pair(&ws, 0, 1.0, 1.5);
    let task = FlatPairTask::new(FlatPairConfig {
        base: ws.config(),
        ..FlatPairConfig::default()
    });
    let selection = Selection {
        slots: slots(&["S00"]),
        ..Selection::runs(&["r1"])
    };
    let summary = ws.run(&task, &selection).unwrap();
    assert_eq!(summary.failed, 1);
}

// ---------------------------------------------------------------------------
// Rollups
// ---------------------------------------------------------------------------

fn write_runlist(ws: &Workspace, lines: &str) -> PathBuf {
    let path = ws.dir.path().join("ds_runs.txt");
    std::fs::write(&path, lines).unwrap();
    path
}

#[test]
fn test_runlist_parsing() {
    let ws = Workspace::new();
    let path = write_runlist(&ws, "R22-Dev r1\n# comment line here\nR10 r2\n\nbad\n");
    let pairs = read_runlist(&path).unwrap();
    assert_eq!(
        pairs,
        vec![
            ("R22".to_string(), "r1".to_string()),
            ("R10".to_string(), "r2".to_string())
        ]
    );
}

#[test]
fn test_superbias_chain_to_summary() {
    let ws = Workspace::new();
    for run in ["r1", "r2"] {
        for slot in ["S00", "S11"] {
            write_bias_set(ws.raw(), run, "R22", slot, 3, SHAPE, 1000.0);
        }
    }
    let selection = Selection {
        slots: slots(&["S00", "S11"]),
        ..Selection::runs(&["r1", "r2"])
    };
    let cfg = AnalysisConfig {
        dataset: Some("ds".into()),
        ..ws.config()
    };

    let superbias = SuperbiasTask::new(SuperbiasConfig { base: cfg.clone() });
    assert_eq!(ws.run(&superbias, &selection).unwrap().processed, 4);
    let stats = SuperbiasStatsTask::new(SuperbiasStatsConfig { base: cfg.clone() });
    assert_eq!(ws.run(&stats, &selection).unwrap().processed, 2);

    let raft_table = TableStore::load(&stats.output_path(&CellId::raft("r1", "R22"))).unwrap();
    let slots_col = raft_table.get("stats").unwrap().text("SLOT").unwrap().to_vec();
    assert_eq!(slots_col, vec!["S00", "S00", "S11", "S11"]);

    let summary = SuperbiasSummaryTask::new(SuperbiasSummaryConfig { base: cfg.clone() });
    assert_eq!(ws.run(&summary, &selection).unwrap().processed, 1);
    let out = TableStore::load(&summary.output_path(&CellId::dataset("ds"))).unwrap();
    let table = out.get("stats").unwrap();
    assert_eq!(table.nrows(), 8);
    assert_eq!(table.text("RUN").unwrap()[..4], ["r1", "r1", "r1", "r1"]);
    assert_eq!(table.text("RAFT").unwrap()[7], "R22");
}

#[test]
fn test_summary_schema_mismatch_writes_nothing() {
    let ws = Workspace::new();
    let cfg = ws.config();
    let runlist = write_runlist(&ws, "R22 r1\nR22 r2\n");

    let upstream = SuperbiasStatsTask::new(SuperbiasStatsConfig { base: cfg.clone() });
    let mut good = TableStore::new();
    good.make_table("stats", vec![("MEAN".into(), Column::Float(vec![1.0]))])
        .unwrap();
    good.persist(&upstream.output_path(&CellId::raft("r1", "R22"))).unwrap();
    let mut bad = TableStore::new();
    bad.make_table("stats", vec![("MEAN".into(), Column::Int(vec![1]))])
        .unwrap();
    bad.persist(&upstream.output_path(&CellId::raft("r2", "R22"))).unwrap();

    let task = SuperbiasSummaryTask::new(SuperbiasSummaryConfig { base: cfg.clone() });
    let selection = Selection {
        runlist: Some(runlist),
        ..Selection::dataset("ds")
    };
    let err = ws.run(&task, &selection).unwrap_err();
    assert!(matches!(err, EoError::SchemaMismatch(_)));
    let out = table_path(&cfg.outdir, "bias", "superbias_summary", &CellId::dataset("ds"));
    assert!(!out.exists());
}

#[test]
fn test_summary_without_upstream_is_missing() {
    let ws = Workspace::new();
    let runlist = write_runlist(&ws, "R22 r1\n");
    let task = SuperbiasSummaryTask::new(SuperbiasSummaryConfig { base: ws.config() });
    let selection = Selection {
        runlist: Some(runlist),
        ..Selection::dataset("ds")
    };
    assert_eq!(ws.run(&task, &selection).unwrap().missing, 1);
}

#[test]
fn test_superbias_stability_across_runs() {
    let ws = Workspace::new();
    write_bias_set(ws.raw(), "r1", "R22", "S00", 3, SHAPE, 1000.0);
    write_bias_set(ws.raw(), "r2", "R22", "S00", 3, SHAPE, 1002.0);
    let task = SuperbiasStabilityTask::new(SuperbiasStabilityConfig { base: ws.config() });
    let selection = Selection {
        slots: slots(&["S00", "S11"]),
        ..Selection::runs(&["r1", "r2"])
    };
    let summary = ws.run(&task, &selection).unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.missing, 1);

    let store = TableStore::load(&task.output_path(&CellId::slot_series("R22", "S00"))).unwrap();
    let table = store.get("stability").unwrap();
    assert_eq!(table.text("RUN").unwrap(), &["r1", "r1", "r2", "r2"]);
    assert_eq!(table.float("MEAN").unwrap(), &[1000.0, 1000.0, 1002.0, 1002.0]);
}

#[test]
fn test_superdark_stability_across_runs() {
    let ws = Workspace::new();
    for (run, dark_level) in [("r1", 1005.0), ("r2", 1010.0)] {
        write_bias_set(ws.raw(), run, "R22", "S00", 3, SHAPE, 1000.0);
        for i in 0..3 {
            write_raw(ws.raw(), run, "R22", "S00", "DARK", i, &make_frame(2, SHAPE, dark_level));
        }
    }
    let task = SuperdarkStabilityTask::new(SuperdarkStabilityConfig { base: ws.config() });
    let selection = Selection {
        slots: slots(&["S00"]),
        ..Selection::runs(&["r1", "r2"])
    };
    assert_eq!(ws.run(&task, &selection).unwrap().processed, 1);

    let output = task.output_path(&CellId::slot_series("R22", "S00"));
    assert!(output.to_string_lossy().contains("superdark_stability"));
    let store = TableStore::load(&output).unwrap();
    let table = store.get("stability").unwrap();
    assert_eq!(table.text("RUN").unwrap(), &["r1", "r1", "r2", "r2"]);
    // superbias removed from each run's darks
    assert_eq!(table.float("MEAN").unwrap(), &[5.0, 5.0, 10.0, 10.0]);
}

#[test]
fn test_superdark_stability_without_darks_is_missing() {
    let ws = Workspace::new();
    write_bias_set(ws.raw(), "r1", "R22", "S00", 3, SHAPE, 1000.0);
    let task = SuperdarkStabilityTask::new(SuperdarkStabilityConfig { base: ws.config() });
    let selection = Selection {
        slots: slots(&["S00"]),
        ..Selection::runs(&["r1"])
    };
    assert_eq!(ws.run(&task, &selection).unwrap().missing, 1);
}

// ---------------------------------------------------------------------------
// Figures
// ---------------------------------------------------------------------------

#[test]
fn test_plot_phase_writes_figure_data() {
    let ws = Workspace::new();
    write_bias_set(ws.raw(), "r1", "R22", "S00", 3, SHAPE, 1000.0);
    let mut cfg = ws.config();
    cfg.plot.enabled = true;
    let task = SuperbiasTask::new(SuperbiasConfig { base: cfg.clone() });
    let selection = Selection {
        slots: slots(&["S00"]),
        ..Selection::runs(&["r1"])
    };

    let mut cache = ReferenceCache::new(cfg.outdir.clone(), cfg.bitpix);
    let mut ctx = TaskContext {
        cache: &mut cache,
        catalog: &ws.catalog,
    };
    let mut figs = ManifestFigures::new();
    run_task(&task, Strategy::BySlot, &selection, &mut ctx, &mut figs, &NoReport).unwrap();

    assert_eq!(figs.written().len(), 1);
    let store = TableStore::load(&figs.written()[0]).unwrap();
    assert!(store.names().contains(&"superbias_AMP01"));
    assert!(store.names().contains(&"superbias_stats"));
}
