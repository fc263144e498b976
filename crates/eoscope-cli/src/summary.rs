use std::path::{Path, PathBuf};

use console::Style;
use eoscope_core::config::AnalysisConfig;
use eoscope_core::iterate::{RunSummary, Strategy};
use eoscope_core::task::Task;

struct Styles {
    title: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    good: Style,
    warn: Style,
    bad: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            good: Style::new().green().bold(),
            warn: Style::new().yellow().bold(),
            bad: Style::new().red().bold(),
        }
    }
}

fn flag(s: &Styles, on: bool) -> String {
    if on {
        s.method.apply_to("on").to_string()
    } else {
        s.disabled.apply_to("off").to_string()
    }
}

pub fn print_run_header(task: &dyn Task, strategy: Strategy, config: &AnalysisConfig, data: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to(format!("eoscope {}", task.name())));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(16)));
    println!();

    println!("  {:<14}{}", s.label.apply_to("Data"), s.path.apply_to(data.display()));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.outdir.display())
    );
    println!("  {:<14}{}", s.label.apply_to("Category"), s.value.apply_to(task.category()));
    println!("  {:<14}{}", s.label.apply_to("Strategy"), s.method.apply_to(strategy));
    println!("  {:<14}{}", s.label.apply_to("Bias"), s.method.apply_to(config.bias));
    println!("  {:<14}{}", s.label.apply_to("Statistic"), s.method.apply_to(config.stat));
    if let Some(n) = config.nfiles {
        println!("  {:<14}{}", s.label.apply_to("Max files"), s.value.apply_to(n));
    }
    println!("  {:<14}{}", s.label.apply_to("Mask"), flag(&s, config.mask));
    println!("  {:<14}{}", s.label.apply_to("Skip"), flag(&s, config.skip));
    println!("  {:<14}{}", s.label.apply_to("Force"), flag(&s, config.force));
    println!("  {:<14}{}", s.label.apply_to("Plot"), flag(&s, config.plot.enabled));
    println!();
}

pub fn print_run_summary(summary: &RunSummary, figures: &[PathBuf]) {
    let s = Styles::new();

    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Processed"),
        s.good.apply_to(summary.processed)
    );
    let missing = if summary.missing > 0 { &s.warn } else { &s.value };
    println!("  {:<14}{}", s.label.apply_to("Missing"), missing.apply_to(summary.missing));
    let failed = if summary.failed > 0 { &s.bad } else { &s.value };
    println!("  {:<14}{}", s.label.apply_to("Failed"), failed.apply_to(summary.failed));
    if !figures.is_empty() {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Figures"),
            s.value.apply_to(format!("{} file(s)", figures.len()))
        );
    }
    println!();
}
