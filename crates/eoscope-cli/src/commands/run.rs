use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use eoscope_core::bias::BiasMethod;
use eoscope_core::catalog::DirectoryCatalog;
use eoscope_core::cell::CellId;
use eoscope_core::config::AnalysisConfig;
use eoscope_core::figures::{FigureSink, ManifestFigures, NullFigures};
use eoscope_core::iterate::{run_task, ProgressReporter, Selection, Strategy};
use eoscope_core::reference::ReferenceCache;
use eoscope_core::registry::TaskRegistry;
use eoscope_core::stack::StackStatistic;
use eoscope_core::task::TaskContext;

use crate::summary::{print_run_header, print_run_summary};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum BiasArg {
    None,
    Mean,
    Row,
    Func,
    Spline,
}

impl From<BiasArg> for BiasMethod {
    fn from(arg: BiasArg) -> Self {
        match arg {
            BiasArg::None => BiasMethod::None,
            BiasArg::Mean => BiasMethod::Mean,
            BiasArg::Row => BiasMethod::Row,
            BiasArg::Func => BiasMethod::Func,
            BiasArg::Spline => BiasMethod::Spline,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum StatArg {
    Mean,
    Median,
    #[value(alias = "clipped_mean")]
    ClippedMean,
    Stdev,
}

impl From<StatArg> for StackStatistic {
    fn from(arg: StatArg) -> Self {
        match arg {
            StatArg::Mean => StackStatistic::Mean,
            StatArg::Median => StackStatistic::Median,
            StatArg::ClippedMean => StackStatistic::ClippedMean,
            StatArg::Stdev => StackStatistic::Stdev,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum StrategyArg {
    BySlot,
    ByRaft,
    SummaryBySlot,
    Summary,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::BySlot => Strategy::BySlot,
            StrategyArg::ByRaft => Strategy::ByRaft,
            StrategyArg::SummaryBySlot => Strategy::SummaryBySlot,
            StrategyArg::Summary => Strategy::Summary,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Task name (see `eoscope list`)
    pub task: String,

    /// Analysis config file (TOML); command-line flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root of the raw data tree ({root}/{run}/{raft}/{slot}/...)
    #[arg(long, default_value = ".")]
    pub data: PathBuf,

    /// Run id(s), comma-separated
    #[arg(long = "run", value_delimiter = ',')]
    pub runs: Vec<String>,

    /// Dataset whose run list selects the runs
    #[arg(long)]
    pub dataset: Option<String>,

    /// Run-list file (default: {dataset}_runs.txt)
    #[arg(long)]
    pub runlist: Option<PathBuf>,

    /// Raft(s), comma-separated
    #[arg(long, value_delimiter = ',')]
    pub raft: Vec<String>,

    /// Slot(s), comma-separated
    #[arg(long, value_delimiter = ',')]
    pub slot: Vec<String>,

    /// Overscan bias method
    #[arg(long, value_enum)]
    pub bias: Option<BiasArg>,

    /// Stack statistic
    #[arg(long, value_enum)]
    pub stat: Option<StatArg>,

    /// Iteration strategy override
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Exclude masked pixels
    #[arg(long)]
    pub mask: bool,

    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Use at most this many input files per cell
    #[arg(long)]
    pub nfiles: Option<usize>,

    /// Reuse existing outputs, never build reference frames
    #[arg(long)]
    pub skip: bool,

    /// Rebuild reference frames even if they exist
    #[arg(long)]
    pub force: bool,

    /// Produce figure data
    #[arg(long)]
    pub plot: bool,

    /// Histogram lower bound
    #[arg(long)]
    pub vmin: Option<f64>,

    /// Histogram upper bound
    #[arg(long)]
    pub vmax: Option<f64>,

    /// Histogram bin count
    #[arg(long)]
    pub nbins: Option<usize>,
}

/// Progress bar driven by the task driver.
struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_task(&self, task: &str, total_cells: usize) {
        self.bar.set_length(total_cells as u64);
        self.bar.set_prefix(task.to_string());
    }

    fn advance(&self, cells_done: usize, cell: &CellId) {
        self.bar.set_position(cells_done as u64);
        self.bar.set_message(cell.to_string());
    }

    fn finish_task(&self) {
        self.bar.finish_with_message("done");
    }
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = build_config(args)?;
    let registry = TaskRegistry::with_builtin_tasks()?;
    let task = registry.build(&args.task, &config)?;
    let strategy = args.strategy.map_or_else(|| task.strategy(), Strategy::from);

    let selection = Selection {
        runs: args.runs.clone(),
        dataset: args.dataset.clone(),
        runlist: args.runlist.clone(),
        rafts: (!args.raft.is_empty()).then(|| args.raft.clone()),
        slots: (!args.slot.is_empty()).then(|| args.slot.clone()),
    };

    print_run_header(task.as_ref(), strategy, &config, &args.data);

    let catalog = DirectoryCatalog::new(&args.data);
    let mut cache = ReferenceCache::new(config.outdir.clone(), config.bitpix);
    let mut ctx = TaskContext {
        cache: &mut cache,
        catalog: &catalog,
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:18} [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    let reporter = BarReporter { bar: pb };

    let mut manifest = ManifestFigures::new();
    let mut null = NullFigures;
    let figs: &mut dyn FigureSink = if config.plot.enabled {
        &mut manifest
    } else {
        &mut null
    };

    let summary = run_task(task.as_ref(), strategy, &selection, &mut ctx, figs, &reporter)
        .with_context(|| format!("Task {} aborted", task.name()))?;

    print_run_summary(&summary, manifest.written());
    if summary.failed > 0 {
        bail!("{} cell(s) failed", summary.failed);
    }
    Ok(())
}

fn build_config(args: &RunArgs) -> Result<AnalysisConfig> {
    let mut config: AnalysisConfig = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        debug!(path = %config_path.display(), "Loaded analysis config");
        toml::from_str(&contents).context("Invalid analysis config")?
    } else {
        AnalysisConfig::default()
    };

    if let Some(bias) = args.bias {
        config.bias = bias.into();
    }
    if let Some(stat) = args.stat {
        config.stat = stat.into();
    }
    if let Some(ref outdir) = args.outdir {
        config.outdir = outdir.clone();
    }
    if args.nfiles.is_some() {
        config.nfiles = args.nfiles;
    }
    if args.dataset.is_some() {
        config.dataset = args.dataset.clone();
    }
    config.mask |= args.mask;
    config.skip |= args.skip;
    config.force |= args.force;
    config.plot.enabled |= args.plot;
    if args.vmin.is_some() {
        config.plot.vmin = args.vmin;
    }
    if args.vmax.is_some() {
        config.plot.vmax = args.vmax;
    }
    if let Some(nbins) = args.nbins {
        config.plot.nbins = nbins;
    }
    Ok(config)
}
