//! Discovery of raw exposure files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cell::CellId;
use crate::error::{EoError, Result};
use crate::reference::SourceFiles;

/// Answers "which files of this category belong to this sensor in this run".
pub trait FileCatalog {
    /// Rafts that have data for `run`, sorted.
    fn rafts(&self, run: &str) -> Result<Vec<String>>;

    /// Files of `category` (e.g. `BIAS`, `DARK`, `FLAT`) for one sensor, sorted.
    fn files(&self, run: &str, raft: &str, slot: &str, category: &str) -> Result<Vec<PathBuf>>;

    /// Defect mask files for one sensor.
    fn mask_files(&self, run: &str, raft: &str, slot: &str) -> Result<Vec<PathBuf>> {
        self.files(run, raft, slot, "MASK")
    }
}

/// Catalog over a directory tree laid out as
/// `{root}/{run}/{raft}/{slot}/{category}_*.fits` with lower-case categories.
#[derive(Clone, Debug)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds the files of one sensor.
    pub fn slot_dir(&self, run: &str, raft: &str, slot: &str) -> PathBuf {
        self.root.join(run).join(raft).join(slot)
    }
}

impl FileCatalog for DirectoryCatalog {
    fn rafts(&self, run: &str) -> Result<Vec<String>> {
        let dir = self.root.join(run);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut rafts = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                rafts.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        rafts.sort();
        Ok(rafts)
    }

    fn files(&self, run: &str, raft: &str, slot: &str, category: &str) -> Result<Vec<PathBuf>> {
        let dir = self.slot_dir(run, raft, slot);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}_", category.to_ascii_lowercase());
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let matches = path.file_name().and_then(|n| n.to_str()).is_some_and(|name| {
                name.starts_with(&prefix) && name.ends_with(".fits")
            });
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        debug!(run, raft, slot, category, count = files.len(), "Resolved input files");
        Ok(files)
    }
}

/// Read a run list: one `raft run` pair per line. Lines that do not hold
/// exactly two tokens are ignored, and a `-Dev` suffix on the raft name is
/// dropped. Returns `(raft, run)` pairs in file order.
pub fn read_runlist(path: &Path) -> Result<Vec<(String, String)>> {
    let text = fs::read_to_string(path).map_err(|e| {
        EoError::Config(format!("cannot read run list {}: {e}", path.display()))
    })?;
    let pairs = text
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [raft, run] => Some((raft.replace("-Dev", ""), run.to_string())),
                _ => None,
            }
        })
        .collect();
    Ok(pairs)
}

/// Conventional run-list file name for a dataset.
pub fn runlist_path(dataset: &str) -> PathBuf {
    PathBuf::from(format!("{dataset}_runs.txt"))
}

/// Source files for building a reference frame of `category` for a slot cell.
pub fn reference_sources(
    catalog: &dyn FileCatalog,
    cell: &CellId,
    category: &str,
    with_masks: bool,
) -> Result<SourceFiles> {
    let (run, raft, slot) = cell.slot_parts()?;
    let masks = if with_masks {
        catalog.mask_files(run, raft, slot)?
    } else {
        Vec::new()
    };
    Ok(SourceFiles {
        frames: catalog.files(run, raft, slot, category)?,
        masks,
    })
}
