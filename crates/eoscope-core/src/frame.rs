use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use ndarray::{s, Array2, ArrayView2};

use crate::consts::{
    DEFAULT_PARALLEL_OVERSCAN_ROWS, DEFAULT_PRESCAN_COLS, DEFAULT_SERIAL_OVERSCAN_COLS,
};
use crate::error::{EoError, Result};
use crate::io::fits::Header;

/// Amplifier index within a sensor, in extension order (0-based).
pub type AmpId = u8;

/// Rectangular pixel region in zero-based array coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl Region {
    pub fn new(rows: Range<usize>, cols: Range<usize>) -> Self {
        Self { rows, cols }
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }

    /// Shrink the region so it fits inside an array of the given shape.
    pub fn clamp(&self, (nrows, ncols): (usize, usize)) -> Self {
        let rows = self.rows.start.min(nrows)..self.rows.end.min(nrows);
        let cols = self.cols.start.min(ncols)..self.cols.end.min(ncols);
        Self { rows, cols }
    }

    /// Borrow this region of `data`. The region is clamped to the array first.
    pub fn view<'a, T>(&self, data: &'a Array2<T>) -> ArrayView2<'a, T> {
        let r = self.clamp(data.dim());
        data.slice(s![r.rows.start..r.rows.end, r.cols.start..r.cols.end])
    }

    /// Parse a FITS section string such as `[11:522,1:2002]`.
    ///
    /// Sections are one-based, inclusive, column range first.
    pub fn parse_section(text: &str) -> Result<Self> {
        let inner = text
            .trim()
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .ok_or_else(|| EoError::InvalidFits(format!("malformed section {text:?}")))?;
        let (cols, rows) = inner
            .split_once(',')
            .ok_or_else(|| EoError::InvalidFits(format!("malformed section {text:?}")))?;
        Ok(Self {
            rows: parse_axis(rows, text)?,
            cols: parse_axis(cols, text)?,
        })
    }

    /// Format as a FITS section string (inverse of [`Region::parse_section`]).
    pub fn to_section(&self) -> String {
        format!(
            "[{}:{},{}:{}]",
            self.cols.start + 1,
            self.cols.end,
            self.rows.start + 1,
            self.rows.end
        )
    }
}

fn parse_axis(axis: &str, text: &str) -> Result<Range<usize>> {
    let bad = || EoError::InvalidFits(format!("malformed section {text:?}"));
    let (lo, hi) = axis.split_once(':').ok_or_else(bad)?;
    let lo: usize = lo.trim().parse().map_err(|_| bad())?;
    let hi: usize = hi.trim().parse().map_err(|_| bad())?;
    if lo == 0 || hi < lo {
        return Err(bad());
    }
    Ok(lo - 1..hi)
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_section())
    }
}

/// Readout layout of one amplifier segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmpGeometry {
    pub imaging: Region,
    pub serial_overscan: Region,
    pub parallel_overscan: Region,
}

impl AmpGeometry {
    /// Default layout for a raw segment of the given shape: a few prescan
    /// columns, serial overscan on the right, parallel overscan at the top.
    pub fn default_for((nrows, ncols): (usize, usize)) -> Self {
        let prescan = DEFAULT_PRESCAN_COLS.min(ncols);
        let serial = DEFAULT_SERIAL_OVERSCAN_COLS.min(ncols.saturating_sub(prescan) / 2);
        let parallel = DEFAULT_PARALLEL_OVERSCAN_ROWS.min(nrows / 2);
        let last_col = ncols - serial;
        let last_row = nrows - parallel;
        Self {
            imaging: Region::new(0..last_row, prescan..last_col),
            serial_overscan: Region::new(0..last_row, last_col..ncols),
            parallel_overscan: Region::new(last_row..nrows, prescan..last_col),
        }
    }

    /// Geometry from `DATASEC`/`BIASSEC`/`PARSEC` header cards, falling back to
    /// [`AmpGeometry::default_for`] when `DATASEC` is absent.
    pub fn from_header(header: &Header, shape: (usize, usize)) -> Result<Self> {
        let Some(datasec) = header.get_str("DATASEC") else {
            return Ok(Self::default_for(shape));
        };
        let (nrows, ncols) = shape;
        let imaging = Region::parse_section(datasec)?.clamp(shape);
        let serial_overscan = match header.get_str("BIASSEC") {
            Some(biassec) => Region::parse_section(biassec)?.clamp(shape),
            None => Region::new(imaging.rows.clone(), imaging.cols.end..ncols),
        };
        let parallel_overscan = match header.get_str("PARSEC") {
            Some(parsec) => Region::parse_section(parsec)?.clamp(shape),
            None => Region::new(imaging.rows.end..nrows, imaging.cols.clone()),
        };
        Ok(Self {
            imaging,
            serial_overscan,
            parallel_overscan,
        })
    }

    /// Cards describing this geometry, written alongside each amplifier image.
    pub fn to_header(&self) -> Header {
        let mut header = Header::new();
        header.set_str("DATASEC", &self.imaging.to_section());
        if !self.serial_overscan.is_empty() {
            header.set_str("BIASSEC", &self.serial_overscan.to_section());
        }
        if !self.parallel_overscan.is_empty() {
            header.set_str("PARSEC", &self.parallel_overscan.to_section());
        }
        header
    }
}

/// One readout of a multi-amplifier sensor.
///
/// Pixel values are raw ADU as `f32`. Frames are treated as immutable once
/// loaded; code that needs to modify pixels works on a clone.
#[derive(Clone, Debug, Default)]
pub struct SensorFrame {
    pub amps: BTreeMap<AmpId, Array2<f32>>,
    pub geometry: BTreeMap<AmpId, AmpGeometry>,
    /// Primary header cards of the source file.
    pub header: Header,
}

impl SensorFrame {
    pub fn new(header: Header) -> Self {
        Self {
            amps: BTreeMap::new(),
            geometry: BTreeMap::new(),
            header,
        }
    }

    pub fn insert_amp(&mut self, amp: AmpId, data: Array2<f32>, geometry: AmpGeometry) {
        self.amps.insert(amp, data);
        self.geometry.insert(amp, geometry);
    }

    pub fn amp_ids(&self) -> Vec<AmpId> {
        self.amps.keys().copied().collect()
    }

    pub fn num_amps(&self) -> usize {
        self.amps.len()
    }

    pub fn amp(&self, amp: AmpId) -> Result<&Array2<f32>> {
        self.amps
            .get(&amp)
            .ok_or_else(|| EoError::MissingInput(format!("amplifier {amp}")))
    }

    pub fn geometry(&self, amp: AmpId) -> Result<&AmpGeometry> {
        self.geometry
            .get(&amp)
            .ok_or_else(|| EoError::MissingInput(format!("geometry for amplifier {amp}")))
    }

    /// Imaging-region view of one amplifier.
    pub fn imaging(&self, amp: AmpId) -> Result<ArrayView2<'_, f32>> {
        let data = self.amp(amp)?;
        Ok(self.geometry(amp)?.imaging.view(data))
    }

    /// Check that `other` has the same amplifiers with the same shapes.
    pub fn ensure_same_shape(&self, other: &SensorFrame) -> Result<()> {
        if self.amps.len() != other.amps.len() {
            return Err(EoError::ShapeMismatch {
                expected: (self.amps.len(), 0),
                found: (other.amps.len(), 0),
            });
        }
        for (amp, data) in &self.amps {
            let found = other.amp(*amp).map(|d| d.dim()).map_err(|_| EoError::ShapeMismatch {
                expected: data.dim(),
                found: (0, 0),
            })?;
            if found != data.dim() {
                return Err(EoError::ShapeMismatch {
                    expected: data.dim(),
                    found,
                });
            }
        }
        Ok(())
    }

    /// Exposure time in seconds from the `EXPTIME` card.
    pub fn exposure_time(&self) -> Option<f64> {
        self.header.get_float("EXPTIME")
    }
}

/// Per-amplifier pixel mask; `true` marks a pixel excluded from stacking.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PixelMask {
    pub amps: BTreeMap<AmpId, Array2<bool>>,
}

impl PixelMask {
    /// Mask every pixel that is non-zero in `frame`.
    pub fn from_frame(frame: &SensorFrame) -> Self {
        let amps = frame
            .amps
            .iter()
            .map(|(amp, data)| (*amp, data.mapv(|v| v != 0.0)))
            .collect();
        Self { amps }
    }

    /// Logical OR of several masks. Amplifier shapes must agree.
    pub fn union(masks: &[PixelMask]) -> Result<Self> {
        let mut out = PixelMask::default();
        for mask in masks {
            for (amp, bits) in &mask.amps {
                match out.amps.get_mut(amp) {
                    Some(acc) => {
                        if acc.dim() != bits.dim() {
                            return Err(EoError::ShapeMismatch {
                                expected: acc.dim(),
                                found: bits.dim(),
                            });
                        }
                        acc.zip_mut_with(bits, |a, &b| *a |= b);
                    }
                    None => {
                        out.amps.insert(*amp, bits.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn amp(&self, amp: AmpId) -> Option<&Array2<bool>> {
        self.amps.get(&amp)
    }

    pub fn count_masked(&self) -> usize {
        self.amps
            .values()
            .map(|bits| bits.iter().filter(|&&b| b).count())
            .sum()
    }
}
