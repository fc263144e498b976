//! Per-pixel combination of co-registered sensor frames.

pub mod mean;
pub mod median;
pub mod sigma_clip;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bias::{BiasMethod, OverscanOptions};
use crate::consts::{DEFAULT_MIN_INPUT_COUNT, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{EoError, Result};
use crate::frame::{AmpId, PixelMask, SensorFrame};

pub use sigma_clip::SigmaClipParams;

/// Statistic used to combine the samples at each pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatistic {
    Mean,
    #[default]
    Median,
    ClippedMean,
    Stdev,
}

impl StackStatistic {
    pub const ALL: [StackStatistic; 4] = [Self::Mean, Self::Median, Self::ClippedMean, Self::Stdev];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::ClippedMean => "clipped_mean",
            Self::Stdev => "stdev",
        }
    }
}

impl fmt::Display for StackStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackStatistic {
    type Err = EoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "clipped_mean" | "clipped-mean" | "meanclip" => Ok(Self::ClippedMean),
            "stdev" | "std" | "stddev" => Ok(Self::Stdev),
            _ => Err(EoError::InvalidMethod(s.to_string())),
        }
    }
}

/// Engine parameters that do not change the meaning of the statistic.
#[derive(Clone, Debug, PartialEq)]
pub struct StackParams {
    pub min_input_count: usize,
    pub clip: SigmaClipParams,
}

impl Default for StackParams {
    fn default() -> Self {
        Self {
            min_input_count: DEFAULT_MIN_INPUT_COUNT,
            clip: SigmaClipParams::default(),
        }
    }
}

/// Everything that determines the content of a stacked reference frame.
///
/// Two requests that compare equal produce identical frames from the same
/// inputs; the output path of a reference is derived from this.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackRequest {
    pub statistic: StackStatistic,
    pub bias_method: BiasMethod,
    pub overscan: OverscanOptions,
    /// Exclude pixels flagged by the cell's mask files.
    pub use_mask: bool,
    pub min_input_count: usize,
    pub clip: SigmaClipParams,
    /// Use at most this many input files.
    pub max_inputs: Option<usize>,
}

impl Default for StackRequest {
    fn default() -> Self {
        Self {
            statistic: StackStatistic::default(),
            bias_method: BiasMethod::default(),
            overscan: OverscanOptions::default(),
            use_mask: false,
            min_input_count: DEFAULT_MIN_INPUT_COUNT,
            clip: SigmaClipParams::default(),
            max_inputs: None,
        }
    }
}

impl StackRequest {
    pub fn params(&self) -> StackParams {
        StackParams {
            min_input_count: self.min_input_count,
            clip: self.clip.clone(),
        }
    }
}

/// Masks applied while stacking.
#[derive(Clone, Copy, Debug)]
pub enum MaskSet<'a> {
    /// One mask applied to every frame.
    Shared(&'a PixelMask),
    /// One mask per input frame, in frame order.
    PerFrame(&'a [PixelMask]),
}

impl<'a> MaskSet<'a> {
    fn for_frame(&self, amp: AmpId, index: usize) -> Option<&'a Array2<bool>> {
        match self {
            Self::Shared(mask) => mask.amp(amp),
            Self::PerFrame(masks) => masks.get(index).and_then(|m| m.amp(amp)),
        }
    }
}

/// Combine `frames` pixel by pixel.
///
/// All frames must have the same amplifiers with the same shapes. Masked
/// samples are dropped; a pixel with no unmasked samples becomes `NaN`.
/// The output carries the first frame's header and geometry. Results do
/// not depend on the number of worker threads.
pub fn stack(
    frames: &[SensorFrame],
    statistic: StackStatistic,
    mask: Option<MaskSet<'_>>,
    params: &StackParams,
) -> Result<SensorFrame> {
    let needed = params.min_input_count.max(1);
    if frames.len() < needed {
        return Err(EoError::InsufficientInput {
            needed,
            found: frames.len(),
        });
    }
    let first = &frames[0];
    for frame in &frames[1..] {
        first.ensure_same_shape(frame)?;
    }
    if let Some(MaskSet::PerFrame(masks)) = mask {
        if masks.len() != frames.len() {
            return Err(EoError::Mismatch(format!(
                "{} masks supplied for {} frames",
                masks.len(),
                frames.len()
            )));
        }
    }

    let mut out = SensorFrame::new(first.header.clone());
    for (&amp, data) in &first.amps {
        let dim = data.dim();
        let views: Vec<ArrayView2<'_, f32>> = frames
            .iter()
            .map(|f| f.amp(amp).map(|a| a.view()))
            .collect::<Result<_>>()?;
        let masks: Vec<Option<ArrayView2<'_, bool>>> = (0..frames.len())
            .map(|i| {
                let m = mask.and_then(|set| set.for_frame(amp, i));
                match m {
                    Some(bits) if bits.dim() != dim => Err(EoError::ShapeMismatch {
                        expected: dim,
                        found: bits.dim(),
                    }),
                    other => Ok(other.map(|b| b.view())),
                }
            })
            .collect::<Result<_>>()?;

        let combined = combine_amp(&views, &masks, dim, statistic, &params.clip)?;
        out.insert_amp(amp, combined, first.geometry(amp)?.clone());
    }
    debug!(
        frames = frames.len(),
        amps = out.num_amps(),
        %statistic,
        "Stacked sensor frames"
    );
    Ok(out)
}

fn combine_amp(
    views: &[ArrayView2<'_, f32>],
    masks: &[Option<ArrayView2<'_, bool>>],
    (h, w): (usize, usize),
    statistic: StackStatistic,
    clip: &SigmaClipParams,
) -> Result<Array2<f32>> {
    let n = views.len();
    let combine_row = |row: usize| -> Vec<f32> {
        let mut samples = Vec::with_capacity(n);
        let mut keep = Vec::with_capacity(n);
        let mut row_result = vec![0.0f32; w];
        for (col, result) in row_result.iter_mut().enumerate() {
            samples.clear();
            for (view, mask) in views.iter().zip(masks) {
                if mask.as_ref().is_some_and(|m| m[[row, col]]) {
                    continue;
                }
                samples.push(view[[row, col]]);
            }
            *result = reduce(&mut samples, statistic, clip, &mut keep);
        }
        row_result
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        (0..h).into_par_iter().map(combine_row).collect()
    } else {
        (0..h).map(combine_row).collect()
    };

    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    let found = flat.len();
    Array2::from_shape_vec((h, w), flat).map_err(|_| EoError::ShapeMismatch {
        expected: (h, w),
        found: (found / w.max(1), w),
    })
}

fn reduce(
    samples: &mut [f32],
    statistic: StackStatistic,
    clip: &SigmaClipParams,
    keep: &mut Vec<bool>,
) -> f32 {
    if samples.is_empty() {
        return f32::NAN;
    }
    match statistic {
        StackStatistic::Mean => mean::mean(samples),
        StackStatistic::Median => median::median(samples),
        StackStatistic::ClippedMean => sigma_clip::clipped_mean(samples, clip, keep),
        StackStatistic::Stdev => mean::sample_stddev(samples),
    }
}
