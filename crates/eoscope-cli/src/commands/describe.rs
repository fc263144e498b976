use anyhow::Result;
use clap::{Args, ValueEnum};
use eoscope_core::registry::TaskRegistry;

#[derive(Clone, Copy, ValueEnum)]
pub enum DescribeFormat {
    Markdown,
    Csv,
}

#[derive(Args)]
pub struct DescribeArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "markdown")]
    pub format: DescribeFormat,
}

pub fn run(args: &DescribeArgs) -> Result<()> {
    let registry = TaskRegistry::with_builtin_tasks()?;
    let text = match args.format {
        DescribeFormat::Markdown => registry.describe_markdown(),
        DescribeFormat::Csv => registry.describe_csv()?,
    };
    print!("{text}");
    Ok(())
}
