//! Lazily built, persisted superbias/superdark frames.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bias::debias;
use crate::cell::CellId;
use crate::error::{EoError, Result};
use crate::frame::{PixelMask, SensorFrame};
use crate::io::fits::Bitpix;
use crate::io::sensor::{read_input, read_mask, read_sensor, write_sensor};
use crate::paths::reference_path;
use crate::stack::{stack, MaskSet, StackRequest};

/// Which calibration a reference frame holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Superbias,
    Superdark,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superbias => "superbias",
            Self::Superdark => "superdark",
        }
    }

    /// Raw exposure category the reference is stacked from.
    pub fn source_category(self) -> &'static str {
        match self {
            Self::Superbias => "BIAS",
            Self::Superdark => "DARK",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stacked sensor frame tagged with how and where it was made.
#[derive(Clone, Debug)]
pub struct ReferenceFrame {
    pub frame: SensorFrame,
    pub kind: ReferenceKind,
    pub request: StackRequest,
    pub cell: CellId,
    pub path: PathBuf,
}

/// Build behaviour for one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildPolicy {
    /// Ignore existing artifacts and rebuild.
    pub force_rebuild: bool,
    /// Never build; return what already exists, if anything.
    pub skip: bool,
}

/// Inputs of a reference build, as returned by the discovery callback.
#[derive(Clone, Debug, Default)]
pub struct SourceFiles {
    pub frames: Vec<PathBuf>,
    pub masks: Vec<PathBuf>,
}

/// Result of a cache lookup.
#[derive(Debug)]
pub enum ReferenceOutcome {
    /// Found in memory or on disk.
    Loaded(Arc<ReferenceFrame>),
    /// Stacked, persisted and read back.
    Built(Arc<ReferenceFrame>),
    /// Building was suppressed; carries the existing artifact if there is one.
    Skipped(Option<Arc<ReferenceFrame>>),
    /// Building was attempted and gave up for this cell. Always a
    /// cell-local error.
    Failed(EoError),
}

impl ReferenceOutcome {
    pub fn frame(&self) -> Option<&Arc<ReferenceFrame>> {
        match self {
            Self::Loaded(f) | Self::Built(f) => Some(f),
            Self::Skipped(f) => f.as_ref(),
            Self::Failed(_) => None,
        }
    }

    pub fn into_frame(self) -> Option<Arc<ReferenceFrame>> {
        match self {
            Self::Loaded(f) | Self::Built(f) => Some(f),
            Self::Skipped(f) => f,
            Self::Failed(_) => None,
        }
    }
}

/// Process-wide store of reference frames, keyed by output path.
pub struct ReferenceCache {
    outdir: PathBuf,
    bitpix: Bitpix,
    memo: HashMap<PathBuf, Arc<ReferenceFrame>>,
}

impl ReferenceCache {
    pub fn new(outdir: impl Into<PathBuf>, bitpix: Bitpix) -> Self {
        Self {
            outdir: outdir.into(),
            bitpix,
            memo: HashMap::new(),
        }
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    /// Number of frames held in memory.
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    pub fn path_for(&self, cell: &CellId, kind: ReferenceKind, request: &StackRequest) -> Result<PathBuf> {
        let (run, raft, slot) = cell.slot_parts()?;
        Ok(reference_path(&self.outdir, kind, request, run, raft, slot))
    }

    /// Return the reference frame for `(cell, kind, request)`, building it
    /// from the files `discover` reports when it does not exist yet.
    ///
    /// `base` is subtracted from every debiased source frame before stacking
    /// (the superbias when building a superdark). Cell-local failures come
    /// back as [`ReferenceOutcome::Failed`]; I/O and format errors propagate.
    pub fn get_or_build<F>(
        &mut self,
        cell: &CellId,
        kind: ReferenceKind,
        request: &StackRequest,
        policy: BuildPolicy,
        base: Option<&ReferenceFrame>,
        discover: F,
    ) -> Result<ReferenceOutcome>
    where
        F: FnOnce(&CellId) -> Result<SourceFiles>,
    {
        let path = self.path_for(cell, kind, request)?;

        if !policy.force_rebuild {
            if let Some(frame) = self.lookup(&path, cell, kind, request)? {
                return Ok(ReferenceOutcome::Loaded(frame));
            }
        }
        if policy.skip {
            debug!(cell = %cell, %kind, "Skip set, not building reference frame");
            let existing = self.lookup(&path, cell, kind, request)?;
            return Ok(ReferenceOutcome::Skipped(existing));
        }

        match self.build(&path, cell, kind, request, base, discover) {
            Ok(frame) => Ok(ReferenceOutcome::Built(frame)),
            Err(e) if e.is_cell_local() => {
                warn!(cell = %cell, %kind, "Cannot build reference frame: {e}");
                Ok(ReferenceOutcome::Failed(e))
            }
            Err(e) => Err(e),
        }
    }

    fn lookup(
        &mut self,
        path: &Path,
        cell: &CellId,
        kind: ReferenceKind,
        request: &StackRequest,
    ) -> Result<Option<Arc<ReferenceFrame>>> {
        if let Some(frame) = self.memo.get(path) {
            return Ok(Some(Arc::clone(frame)));
        }
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "Loading reference frame");
        let frame = self.load(path, cell, kind, request)?;
        Ok(Some(frame))
    }

    fn load(
        &mut self,
        path: &Path,
        cell: &CellId,
        kind: ReferenceKind,
        request: &StackRequest,
    ) -> Result<Arc<ReferenceFrame>> {
        let frame = Arc::new(ReferenceFrame {
            frame: read_sensor(path)?,
            kind,
            request: request.clone(),
            cell: cell.clone(),
            path: path.to_path_buf(),
        });
        self.memo.insert(path.to_path_buf(), Arc::clone(&frame));
        Ok(frame)
    }

    fn build<F>(
        &mut self,
        path: &Path,
        cell: &CellId,
        kind: ReferenceKind,
        request: &StackRequest,
        base: Option<&ReferenceFrame>,
        discover: F,
    ) -> Result<Arc<ReferenceFrame>>
    where
        F: FnOnce(&CellId) -> Result<SourceFiles>,
    {
        let sources = discover(cell)?;
        let mut files = sources.frames;
        if let Some(cap) = request.max_inputs {
            files.truncate(cap);
        }
        let needed = request.min_input_count.max(1);
        if files.len() < needed {
            return Err(EoError::InsufficientInput {
                needed,
                found: files.len(),
            });
        }

        info!(cell = %cell, %kind, inputs = files.len(), statistic = %request.statistic, "Building reference frame");
        let frames = files
            .iter()
            .map(|p| load_corrected(p, request, base))
            .collect::<Result<Vec<_>>>()?;

        let mask = if request.use_mask && !sources.masks.is_empty() {
            let masks = sources
                .masks
                .iter()
                .map(|p| read_mask(p))
                .collect::<Result<Vec<_>>>()?;
            Some(PixelMask::union(&masks)?)
        } else {
            None
        };

        let mut stacked = stack(
            &frames,
            request.statistic,
            mask.as_ref().map(MaskSet::Shared),
            &request.params(),
        )?;
        stacked.header.set_str("IMAGETYP", kind.as_str());
        stacked.header.set_str("STACKSTA", request.statistic.as_str());
        stacked.header.set_str("BIASMETH", request.bias_method.as_str());
        stacked.header.set_int("NINPUTS", frames.len() as i64);

        write_sensor(path, &stacked, self.bitpix)?;
        info!(path = %path.display(), "Wrote reference frame");
        self.load(path, cell, kind, request)
    }
}

/// Read one raw exposure, debias every amplifier at full raw shape and
/// subtract `base` when given.
fn load_corrected(path: &Path, request: &StackRequest, base: Option<&ReferenceFrame>) -> Result<SensorFrame> {
    let raw = read_input(path)?;
    let mut out = SensorFrame::new(raw.header.clone());
    for (&amp, data) in &raw.amps {
        let geometry = raw.geometry(amp)?;
        let mut corrected = debias(data, geometry, request.bias_method, &request.overscan)?;
        if let Some(base) = base {
            let reference = base.frame.amp(amp)?;
            if reference.dim() != corrected.dim() {
                return Err(EoError::ShapeMismatch {
                    expected: corrected.dim(),
                    found: reference.dim(),
                });
            }
            corrected -= reference;
        }
        out.insert_amp(amp, corrected, geometry.clone());
    }
    Ok(out)
}
