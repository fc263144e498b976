/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Reference frames are never stacked from fewer frames than this.
pub const DEFAULT_MIN_INPUT_COUNT: usize = 3;

/// Default sigma threshold for clipped-mean stacking.
pub const DEFAULT_CLIP_SIGMA: f32 = 3.0;

/// Default number of rejection passes for clipped-mean stacking.
pub const DEFAULT_CLIP_ITERATIONS: usize = 3;

/// Slots of a science raft, in readout order.
pub const ALL_SLOTS: [&str; 9] = ["S00", "S01", "S02", "S10", "S11", "S12", "S20", "S21", "S22"];

/// Serial prescan columns in the default amplifier layout.
pub const DEFAULT_PRESCAN_COLS: usize = 3;

/// Serial overscan columns in the default amplifier layout.
pub const DEFAULT_SERIAL_OVERSCAN_COLS: usize = 64;

/// Parallel overscan rows in the default amplifier layout.
pub const DEFAULT_PARALLEL_OVERSCAN_ROWS: usize = 48;

/// Polynomial order used by the FUNC overscan model.
pub const DEFAULT_FUNC_ORDER: usize = 1;

/// Row spacing between interior knots of the SPLINE overscan model.
pub const DEFAULT_SPLINE_KNOT_SPACING: usize = 100;

/// Default histogram bin count handed to the figure collaborator.
pub const DEFAULT_NBINS: usize = 100;

/// Default output directory root.
pub const DEFAULT_OUTDIR: &str = "analysis";

/// Largest EXPTIME difference (seconds) tolerated inside a flat pair.
pub const DEFAULT_EXPTIME_TOLERANCE: f64 = 1e-3;

/// FITS logical record size in bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header card size in bytes.
pub const FITS_CARD_SIZE: usize = 80;
