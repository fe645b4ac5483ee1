//! Command-line arguments.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "traceline",
    about = "Column-level data lineage for T-SQL scripts",
    version
)]
pub struct Args {
    /// SQL files to analyze. Reads stdin when empty.
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Remove orphan nodes and re-intern strings before output.
    #[arg(long)]
    pub compact: bool,

    /// Analyze files in parallel with the batch driver.
    #[arg(long)]
    pub batch: bool,

    /// JSON file with known table schemas (array of {name, columns}).
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Wall-clock budget per script, in seconds.
    #[arg(long, default_value_t = 30)]
    pub time_budget: u64,

    /// Maximum syntax fragments visited per script.
    #[arg(long, default_value_t = 50_000)]
    pub max_fragments: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Full graph as JSON.
    Json,
    /// One summary line per input.
    Summary,
}
