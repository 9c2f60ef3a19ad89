use crate::core::rank::DEFAULT_TOP_K;
use crate::core::reader::DEFAULT_CHUNK_SIZE;
use crate::report::histogram::{DEFAULT_BINS, DEFAULT_SAMPLE};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kira-exprstats",
    version,
    about = "Per-gene mean/median/variance over a gene-expression matrix"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    Run(RunArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Expression matrix (TSV, optionally gzipped); `-` reads stdin.
    pub input: PathBuf,

    #[arg(long)]
    pub out: PathBuf,

    /// Output file prefix; defaults to the input file stem.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    #[arg(long, value_enum, default_value_t = DelimiterArg::Tab)]
    pub delimiter: DelimiterArg,

    #[arg(long, default_value_t = DEFAULT_BINS)]
    pub bins: usize,

    /// Rows sampled for the histogram.
    #[arg(long, default_value_t = DEFAULT_SAMPLE)]
    pub hist_sample: usize,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = PlotFormatArg::Svg)]
    pub plot_format: PlotFormatArg,

    #[arg(long, default_value_t = false)]
    pub no_zip: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DelimiterArg {
    #[value(name = "tab")]
    Tab,
    #[value(name = "comma")]
    Comma,
}

impl DelimiterArg {
    pub fn byte(self) -> u8 {
        match self {
            DelimiterArg::Tab => b'\t',
            DelimiterArg::Comma => b',',
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PlotFormatArg {
    #[value(name = "svg")]
    Svg,
    /// SVG plus a PDF conversion.
    #[value(name = "pdf")]
    Pdf,
}
