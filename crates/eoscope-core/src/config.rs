use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bias::{BiasMethod, OverscanOptions};
use crate::consts::{DEFAULT_MIN_INPUT_COUNT, DEFAULT_NBINS, DEFAULT_OUTDIR};
use crate::io::fits::Bitpix;
use crate::reference::BuildPolicy;
use crate::stack::{SigmaClipParams, StackRequest, StackStatistic};

/// Options forwarded to the figure sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Run the plot phase at all.
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmax: Option<f64>,
    pub nbins: usize,
    /// Subtract the per-amplifier mean before histogramming.
    pub subtract_mean: bool,
    /// Also produce per-amplifier statistics histograms.
    pub stats_hist: bool,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            vmin: None,
            vmax: None,
            nbins: DEFAULT_NBINS,
            subtract_mean: false,
            stats_hist: false,
        }
    }
}

/// Settings shared by every analysis task. Task configs embed this by value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub outdir: PathBuf,
    pub bias: BiasMethod,
    pub stat: StackStatistic,
    /// Exclude pixels flagged in the cell's mask files.
    pub mask: bool,
    /// Reuse existing outputs and never build reference frames.
    pub skip: bool,
    /// Rebuild reference frames even when they exist.
    pub force: bool,
    /// Use at most this many input files per cell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nfiles: Option<usize>,
    /// Encoding of persisted reference frames.
    pub bitpix: Bitpix,
    pub min_inputs: usize,
    /// Dataset name used for summary outputs and run lists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    pub clip: SigmaClipParams,
    pub overscan: OverscanOptions,
    pub plot: PlotConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            outdir: PathBuf::from(DEFAULT_OUTDIR),
            bias: BiasMethod::default(),
            stat: StackStatistic::default(),
            mask: false,
            skip: false,
            force: false,
            nfiles: None,
            bitpix: Bitpix::default(),
            min_inputs: DEFAULT_MIN_INPUT_COUNT,
            dataset: None,
            clip: SigmaClipParams::default(),
            overscan: OverscanOptions::default(),
            plot: PlotConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Stack request built from these settings.
    pub fn stack_request(&self) -> StackRequest {
        StackRequest {
            statistic: self.stat,
            bias_method: self.bias,
            overscan: self.overscan.clone(),
            use_mask: self.mask,
            min_input_count: self.min_inputs,
            clip: self.clip.clone(),
            max_inputs: self.nfiles,
        }
    }

    /// Request for the superbias subtracted from other exposures. Always the
    /// median stack, whatever statistic the current task uses.
    pub fn superbias_request(&self) -> StackRequest {
        StackRequest {
            statistic: StackStatistic::Median,
            ..self.stack_request()
        }
    }

    pub fn build_policy(&self) -> BuildPolicy {
        BuildPolicy {
            force_rebuild: self.force,
            skip: self.skip,
        }
    }
}
