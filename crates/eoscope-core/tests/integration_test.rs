#[allow(dead_code)]
mod common;

use std::cell::Cell;

use tempfile::TempDir;

use eoscope_core::bias::BiasMethod;
use eoscope_core::catalog::{reference_sources, DirectoryCatalog};
use eoscope_core::cell::CellId;
use eoscope_core::config::AnalysisConfig;
use eoscope_core::figures::NullFigures;
use eoscope_core::iterate::{run_task, NoOpReporter, Selection};
use eoscope_core::reference::{ReferenceCache, ReferenceKind, ReferenceOutcome};
use eoscope_core::registry::TaskRegistry;
use eoscope_core::stack::StackStatistic;
use eoscope_core::table::TableStore;
use eoscope_core::task::TaskContext;

use common::{noisy_frame, rng, write_raw};

/// Full-size amplifier segment: 2000x509 imaging plus overscans.
const SEGMENT: (usize, usize) = (2048, 576);
const LEVEL: f64 = 1000.0;
const NOISE: f64 = 5.0;
const NFILES: usize = 5;

fn write_bias_exposures(root: &std::path::Path) {
    let mut r = rng(42);
    for i in 0..NFILES {
        let frame = noisy_frame(&mut r, 2, SEGMENT, LEVEL, NOISE);
        write_raw(root, "r1", "R22", "S11", "BIAS", i, &frame);
    }
}

fn config(dir: &TempDir) -> AnalysisConfig {
    AnalysisConfig {
        outdir: dir.path().join("analysis"),
        bias: BiasMethod::None,
        stat: StackStatistic::Median,
        ..AnalysisConfig::default()
    }
}

#[test]
fn test_superbias_end_to_end() {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("raw");
    write_bias_exposures(&raw);
    let catalog = DirectoryCatalog::new(&raw);
    let cfg = config(&dir);
    let cell = CellId::slot("r1", "R22", "S11");
    let request = cfg.stack_request();

    // Build through the cache.
    let discovered = Cell::new(0);
    let mut cache = ReferenceCache::new(cfg.outdir.clone(), cfg.bitpix);
    let outcome = cache
        .get_or_build(
            &cell,
            ReferenceKind::Superbias,
            &request,
            cfg.build_policy(),
            None,
            |c| {
                discovered.set(discovered.get() + 1);
                reference_sources(&catalog, c, "BIAS", false)
            },
        )
        .unwrap();
    let superbias = match outcome {
        ReferenceOutcome::Built(frame) => frame,
        other => panic!("expected a fresh build, got {other:?}"),
    };
    assert_eq!(discovered.get(), 1);
    assert_eq!(superbias.frame.num_amps(), 2);

    let tolerance = 3.0 * NOISE / (NFILES as f64).sqrt();
    for amp in superbias.frame.amp_ids() {
        let imaging = superbias.frame.imaging(amp).unwrap();
        assert_eq!(imaging.dim(), (2000, 509));
        let mean = imaging.iter().map(|&v| v as f64).sum::<f64>() / imaging.len() as f64;
        assert!(
            (mean - LEVEL).abs() < tolerance,
            "amp {amp}: mean {mean} not within {tolerance} of {LEVEL}"
        );
        let var = imaging
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / imaging.len() as f64;
        assert!(var.sqrt() < NOISE, "median stack should reduce the noise");
    }

    // A fresh cache must find the artifact on disk without touching the sources.
    let mut cache = ReferenceCache::new(cfg.outdir.clone(), cfg.bitpix);
    let outcome = cache
        .get_or_build(
            &cell,
            ReferenceKind::Superbias,
            &request,
            cfg.build_policy(),
            None,
            |c| {
                discovered.set(discovered.get() + 1);
                reference_sources(&catalog, c, "BIAS", false)
            },
        )
        .unwrap();
    assert!(matches!(outcome, ReferenceOutcome::Loaded(_)));
    assert_eq!(discovered.get(), 1);
    let reloaded = outcome.frame().unwrap();
    assert_eq!(reloaded.frame.amps, superbias.frame.amps);
}

#[test]
fn test_registry_driven_superbias_run() {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("raw");
    write_bias_exposures(&raw);
    let catalog = DirectoryCatalog::new(&raw);
    let cfg = config(&dir);

    let registry = TaskRegistry::with_builtin_tasks().unwrap();
    let task = registry.build("Superbias", &cfg).unwrap();
    let selection = Selection {
        slots: Some(vec!["S11".into()]),
        ..Selection::runs(&["r1"])
    };
    let mut cache = ReferenceCache::new(cfg.outdir.clone(), cfg.bitpix);
    let mut ctx = TaskContext {
        cache: &mut cache,
        catalog: &catalog,
    };
    let summary = run_task(
        task.as_ref(),
        task.strategy(),
        &selection,
        &mut ctx,
        &mut NullFigures,
        &NoOpReporter,
    )
    .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.total(), 1);

    let path = task.output_path(&CellId::slot("r1", "R22", "S11"));
    assert!(path.ends_with("tables/R22/bias/R22-r1-S11_superbias_stats.fits"));
    let store = TableStore::load(&path).unwrap();
    let stats = store.get("stats").unwrap();
    assert_eq!(stats.nrows(), 2);
    for &median in stats.float("MEDIAN").unwrap() {
        assert!((median - LEVEL).abs() < 1.0);
    }
    assert!(cfg
        .outdir
        .join("superbias/R22/R22-r1-S11_superbias_b-none.fits")
        .exists());
}
