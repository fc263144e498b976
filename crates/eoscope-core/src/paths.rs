//! Output file naming.

use std::path::{Path, PathBuf};

use crate::cell::CellId;
use crate::reference::ReferenceKind;
use crate::stack::{StackRequest, StackStatistic};

fn output_stem(outdir: &Path, file_type: &str, test_type: &str, suffix: &str, cell: &CellId) -> PathBuf {
    match cell {
        CellId::Slot { run, raft, slot } => outdir
            .join(file_type)
            .join(raft)
            .join(test_type)
            .join(format!("{raft}-{run}-{slot}_{suffix}")),
        CellId::Raft { run, raft } => outdir
            .join(file_type)
            .join(raft)
            .join(test_type)
            .join(format!("{raft}-{run}-RFT_{suffix}")),
        CellId::SlotSeries { raft, slot } => outdir
            .join(file_type)
            .join(raft)
            .join(test_type)
            .join(format!("{raft}-{slot}_{suffix}")),
        CellId::Dataset { name } => outdir
            .join(file_type)
            .join("summary")
            .join(test_type)
            .join(format!("{name}_{suffix}")),
    }
}

/// Table file for `cell`.
pub fn table_path(outdir: &Path, test_type: &str, suffix: &str, cell: &CellId) -> PathBuf {
    let mut path = output_stem(outdir, "tables", test_type, suffix, cell).into_os_string();
    path.push(".fits");
    path.into()
}

/// Base name (no extension) for figures of `cell`.
pub fn plot_base(outdir: &Path, test_type: &str, suffix: &str, cell: &CellId) -> PathBuf {
    output_stem(outdir, "plots", test_type, suffix, cell)
}

/// Reference-frame file for one sensor.
///
/// Only the statistic and bias method enter the name; median is the
/// unlabelled default.
pub fn reference_path(
    outdir: &Path,
    kind: ReferenceKind,
    request: &StackRequest,
    run: &str,
    raft: &str,
    slot: &str,
) -> PathBuf {
    let label = match request.statistic {
        StackStatistic::Median => kind.as_str().to_string(),
        other => other.to_string(),
    };
    outdir.join(kind.as_str()).join(raft).join(format!(
        "{raft}-{run}-{slot}_{label}_b-{}.fits",
        request.bias_method
    ))
}
