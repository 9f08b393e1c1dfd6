use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "qgram-rank",
    version,
    about = "Count and rank q-grams of sequence collections"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    Rank(RankArgs),
}

#[derive(Parser)]
pub struct RankArgs {
    /// Plain or gzip-compressed files, one sequence per line
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[arg(short, long)]
    pub q: usize,

    #[arg(long, default_value_t = num_cpus::get())]
    pub threads: usize,

    #[arg(long, default_value_t = 50)]
    pub top: usize,

    /// `dna`, `protein`, or a group spec such as `Aa|Cc|Gg|Tt`
    #[arg(long, default_value = "dna")]
    pub alphabet: String,

    /// Background corpus for ratio keys
    #[arg(long, num_args = 1..)]
    pub background: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = KeyArg::Count)]
    pub key: KeyArg,

    #[arg(long, default_value_t = 1 << 16)]
    pub min_shard_windows: usize,

    /// Fail on symbols outside the alphabet instead of splitting at them
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KeyArg {
    #[value(name = "count")]
    Count,
    #[value(name = "log2-ratio")]
    Log2Ratio,
}
