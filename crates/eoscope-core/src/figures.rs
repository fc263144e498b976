//! Boundary to the figure renderer.
//!
//! Tasks hand frames, histograms and tables to a [`FigureSink`]. Rendering is
//! not done here: [`NullFigures`] discards everything and [`ManifestFigures`]
//! records the plotted data as FITS tables next to the analysis outputs.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::PlotConfig;
use crate::error::Result;
use crate::frame::SensorFrame;
use crate::table::{Column, Table, TableStore};

/// Fixed-width histogram.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    pub lo: f64,
    pub hi: f64,
    pub counts: Vec<u64>,
    pub underflow: u64,
    pub overflow: u64,
    /// Mean removed from every value before binning (0 when not requested).
    pub offset: f64,
}

impl Histogram {
    /// Bin the finite values. The range is `vmin..vmax` when configured,
    /// otherwise the data range.
    pub fn build(values: impl IntoIterator<Item = f64>, config: &PlotConfig) -> Self {
        let mut data: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        let offset = if config.subtract_mean && !data.is_empty() {
            data.iter().sum::<f64>() / data.len() as f64
        } else {
            0.0
        };
        if offset != 0.0 {
            data.iter_mut().for_each(|v| *v -= offset);
        }

        let data_lo = data.iter().copied().fold(f64::INFINITY, f64::min);
        let data_hi = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lo = config.vmin.unwrap_or(if data_lo.is_finite() { data_lo } else { 0.0 });
        let mut hi = config.vmax.unwrap_or(if data_hi.is_finite() { data_hi } else { 1.0 });
        if hi <= lo {
            hi = lo + 1.0;
        }

        let nbins = config.nbins.max(1);
        let width = (hi - lo) / nbins as f64;
        let mut hist = Self {
            lo,
            hi,
            counts: vec![0; nbins],
            underflow: 0,
            overflow: 0,
            offset,
        };
        for v in data {
            if v < lo {
                hist.underflow += 1;
            } else if v > hi {
                hist.overflow += 1;
            } else {
                let bin = (((v - lo) / width) as usize).min(nbins - 1);
                hist.counts[bin] += 1;
            }
        }
        hist
    }

    pub fn edges(&self) -> Vec<f64> {
        let n = self.counts.len();
        let width = (self.hi - self.lo) / n as f64;
        (0..=n).map(|i| self.lo + width * i as f64).collect()
    }

    /// Values that fell inside the range.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn to_table(&self, name: &str) -> Result<Table> {
        let edges = self.edges();
        Table::new(
            name,
            vec![
                ("LO".into(), Column::Float(edges[..edges.len() - 1].to_vec())),
                ("HI".into(), Column::Float(edges[1..].to_vec())),
                (
                    "COUNT".into(),
                    Column::Int(self.counts.iter().map(|&c| c as i64).collect()),
                ),
            ],
        )
    }
}

/// Receives the plot phase output of a task.
pub trait FigureSink {
    /// Per-amplifier image of a sensor frame.
    fn sensor_image(&mut self, name: &str, frame: &SensorFrame, config: &PlotConfig) -> Result<()>;

    fn histogram(&mut self, name: &str, hist: &Histogram) -> Result<()>;

    /// Line plot of every numeric column of `table`.
    fn series(&mut self, name: &str, table: &Table) -> Result<()>;

    /// Flush everything received since the last call, using `base` as the
    /// file stem. Returns the files written.
    fn save(&mut self, base: &Path) -> Result<Vec<PathBuf>>;
}

/// Sink that drops every figure.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullFigures;

impl FigureSink for NullFigures {
    fn sensor_image(&mut self, _name: &str, _frame: &SensorFrame, _config: &PlotConfig) -> Result<()> {
        Ok(())
    }

    fn histogram(&mut self, _name: &str, _hist: &Histogram) -> Result<()> {
        Ok(())
    }

    fn series(&mut self, _name: &str, _table: &Table) -> Result<()> {
        Ok(())
    }

    fn save(&mut self, _base: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Sink that stores plotted data as tables in `{base}_figs.fits`.
#[derive(Debug, Default)]
pub struct ManifestFigures {
    pending: TableStore,
    written: Vec<PathBuf>,
}

impl ManifestFigures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every file written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl FigureSink for ManifestFigures {
    fn sensor_image(&mut self, name: &str, frame: &SensorFrame, config: &PlotConfig) -> Result<()> {
        for amp in frame.amp_ids() {
            let pixels = frame.imaging(amp)?;
            let hist = Histogram::build(pixels.iter().map(|&v| v as f64), config);
            self.pending
                .add_table(hist.to_table(&format!("{name}_AMP{:02}", amp + 1))?);
        }
        Ok(())
    }

    fn histogram(&mut self, name: &str, hist: &Histogram) -> Result<()> {
        self.pending.add_table(hist.to_table(name)?);
        Ok(())
    }

    fn series(&mut self, name: &str, table: &Table) -> Result<()> {
        let columns = table
            .columns()
            .iter()
            .filter(|(_, c)| !matches!(c, Column::Text(_)))
            .cloned()
            .collect();
        self.pending.make_table(name, columns)?;
        Ok(())
    }

    fn save(&mut self, base: &Path) -> Result<Vec<PathBuf>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let mut path = base.as_os_str().to_owned();
        path.push("_figs.fits");
        let path = PathBuf::from(path);
        std::mem::take(&mut self.pending).persist(&path)?;
        debug!(path = %path.display(), "Wrote figure data");
        self.written.push(path.clone());
        Ok(vec![path])
    }
}
