//! Concrete analyses built on the task framework.

pub mod bias_fft;
pub mod bias_v_row;
pub mod flat_pair;
pub mod superbias;
pub mod superbias_stability;
pub mod superbias_stats;
pub mod superbias_summary;
pub mod superdark;
pub mod superdark_stability;

use std::sync::Arc;

use ndarray::ArrayView2;

use crate::catalog::reference_sources;
use crate::cell::CellId;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::frame::{AmpId, SensorFrame};
use crate::iterate::Strategy;
use crate::reference::{ReferenceFrame, ReferenceKind, ReferenceOutcome};
use crate::registry::TaskDescriptor;
use crate::stack::median::median;
use crate::stack::StackRequest;
use crate::table::{Column, Table};
use crate::task::{TaskCategory, TaskContext};

pub use bias_fft::{BiasFftConfig, BiasFftTask};
pub use bias_v_row::{BiasVRowConfig, BiasVRowTask};
pub use flat_pair::{FlatPairConfig, FlatPairTask};
pub use superbias::{SuperbiasConfig, SuperbiasTask};
pub use superbias_stability::{SuperbiasStabilityConfig, SuperbiasStabilityTask};
pub use superbias_stats::{SuperbiasStatsConfig, SuperbiasStatsTask};
pub use superbias_summary::{SuperbiasSummaryConfig, SuperbiasSummaryTask};
pub use superdark::{SuperdarkConfig, SuperdarkTask};
pub use superdark_stability::{SuperdarkStabilityConfig, SuperdarkStabilityTask};

/// Descriptors of every built-in task, in registration order.
pub fn builtin() -> Vec<TaskDescriptor> {
    vec![
        TaskDescriptor {
            name: "Superbias",
            category: TaskCategory::Slot,
            strategy: Strategy::BySlot,
            config_type: "SuperbiasConfig",
            description: "Stack bias frames into a superbias and tabulate per-amp statistics",
            build: |cfg| Box::new(SuperbiasTask::new(SuperbiasConfig { base: cfg.clone() })),
        },
        TaskDescriptor {
            name: "Superdark",
            category: TaskCategory::Slot,
            strategy: Strategy::BySlot,
            config_type: "SuperdarkConfig",
            description: "Stack superbias-subtracted dark frames into a superdark",
            build: |cfg| Box::new(SuperdarkTask::new(SuperdarkConfig { base: cfg.clone() })),
        },
        TaskDescriptor {
            name: "BiasVRow",
            category: TaskCategory::Slot,
            strategy: Strategy::BySlot,
            config_type: "BiasVRowConfig",
            description: "Serial overscan level versus row, averaged over bias frames",
            build: |cfg| Box::new(BiasVRowTask::new(BiasVRowConfig { base: cfg.clone() })),
        },
        TaskDescriptor {
            name: "BiasFft",
            category: TaskCategory::Slot,
            strategy: Strategy::BySlot,
            config_type: "BiasFftConfig",
            description: "Mean row power spectrum of corrected bias frames",
            build: |cfg| Box::new(BiasFftTask::new(BiasFftConfig { base: cfg.clone() })),
        },
        TaskDescriptor {
            name: "FlatPair",
            category: TaskCategory::Slot,
            strategy: Strategy::BySlot,
            config_type: "FlatPairConfig",
            description: "Signal and difference variance of flat pairs",
            build: |cfg| {
                Box::new(FlatPairTask::new(FlatPairConfig {
                    base: cfg.clone(),
                    ..FlatPairConfig::default()
                }))
            },
        },
        TaskDescriptor {
            name: "SuperbiasStats",
            category: TaskCategory::Table,
            strategy: Strategy::ByRaft,
            config_type: "SuperbiasStatsConfig",
            description: "Collect per-slot superbias statistics into one raft table",
            build: |cfg| {
                Box::new(SuperbiasStatsTask::new(SuperbiasStatsConfig { base: cfg.clone() }))
            },
        },
        TaskDescriptor {
            name: "SuperbiasStability",
            category: TaskCategory::Summary,
            strategy: Strategy::SummaryBySlot,
            config_type: "SuperbiasStabilityConfig",
            description: "Superbias level and noise per amp across runs",
            build: |cfg| {
                Box::new(SuperbiasStabilityTask::new(SuperbiasStabilityConfig {
                    base: cfg.clone(),
                }))
            },
        },
        TaskDescriptor {
            name: "SuperbiasSummary",
            category: TaskCategory::Summary,
            strategy: Strategy::Summary,
            config_type: "SuperbiasSummaryConfig",
            description: "Stack raft superbias statistics across a dataset",
            build: |cfg| {
                Box::new(SuperbiasSummaryTask::new(SuperbiasSummaryConfig {
                    base: cfg.clone(),
                }))
            },
        },
        TaskDescriptor {
            name: "SuperdarkStability",
            category: TaskCategory::Summary,
            strategy: Strategy::SummaryBySlot,
            config_type: "SuperdarkStabilityConfig",
            description: "Superdark level and noise per amp across runs",
            build: |cfg| {
                Box::new(SuperdarkStabilityTask::new(SuperdarkStabilityConfig {
                    base: cfg.clone(),
                }))
            },
        },
    ]
}

/// Reference frame of `kind` for a slot cell, with sources discovered through
/// the catalog. A superdark is stacked on top of the slot's superbias when
/// one is available.
pub(crate) fn catalog_reference(
    id: &CellId,
    kind: ReferenceKind,
    request: &StackRequest,
    cfg: &AnalysisConfig,
    ctx: &mut TaskContext<'_>,
) -> Result<ReferenceOutcome> {
    let base = match kind {
        ReferenceKind::Superbias => None,
        ReferenceKind::Superdark => slot_superbias(id, cfg, ctx)?,
    };
    let catalog = ctx.catalog;
    ctx.cache.get_or_build(
        id,
        kind,
        request,
        cfg.build_policy(),
        base.as_deref(),
        |c| reference_sources(catalog, c, kind.source_category(), request.use_mask),
    )
}

/// Median superbias of a slot cell, for tasks that subtract it. A cache
/// failure yields `None`.
pub(crate) fn slot_superbias(
    id: &CellId,
    cfg: &AnalysisConfig,
    ctx: &mut TaskContext<'_>,
) -> Result<Option<Arc<ReferenceFrame>>> {
    let outcome = catalog_reference(id, ReferenceKind::Superbias, &cfg.superbias_request(), cfg, ctx)?;
    Ok(outcome.into_frame())
}

/// Column name prefix for one amplifier (1-based, like segment numbering).
pub(crate) fn amp_label(amp: AmpId) -> String {
    format!("AMP{:02}", amp as u32 + 1)
}

/// Summary statistics of the finite pixels of an imaging region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PixelStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

pub(crate) fn pixel_stats(view: ArrayView2<'_, f32>) -> PixelStats {
    let mut values: Vec<f32> = view.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return PixelStats {
            mean: f64::NAN,
            median: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
        };
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let min = values.iter().copied().fold(f32::INFINITY, f32::min) as f64;
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    PixelStats {
        mean,
        median: median(&mut values) as f64,
        std: var.sqrt(),
        min,
        max,
    }
}

/// Table of per-amplifier imaging statistics of `frame`.
pub(crate) fn amp_stats_table(name: &str, frame: &SensorFrame) -> Result<Table> {
    let mut amps = Vec::new();
    let mut stats = Vec::new();
    for amp in frame.amp_ids() {
        amps.push(amp as i64 + 1);
        stats.push(pixel_stats(frame.imaging(amp)?));
    }
    Table::new(
        name,
        vec![
            ("AMP".into(), Column::Int(amps)),
            ("MEAN".into(), Column::Float(stats.iter().map(|s| s.mean).collect())),
            ("MEDIAN".into(), Column::Float(stats.iter().map(|s| s.median).collect())),
            ("STD".into(), Column::Float(stats.iter().map(|s| s.std).collect())),
            ("MIN".into(), Column::Float(stats.iter().map(|s| s.min).collect())),
            ("MAX".into(), Column::Float(stats.iter().map(|s| s.max).collect())),
        ],
    )
}
