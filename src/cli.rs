use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "md-segment")]
#[command(about = "Segments page-annotated markdown into sections and extracted tables")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output directory for generated artifacts
    #[arg(short, long, global = true, default_value = "./output")]
    pub output: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Segment markdown into a section tree and a table catalogue
    Segment(SegmentArgs),

    /// Segment, then send each extracted table to the table interpreter
    Interpret(InterpretArgs),

    /// Report segmentation statistics without writing artifacts
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
pub struct SegmentArgs {
    /// Input sources (file paths, URLs, or directories of .md files)
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Maximum chunk length in characters for leaf segments
    #[arg(long, default_value = "1500")]
    pub max_chunk_len: usize,

    /// Page index assumed before the first PAGE_INDEX marker
    #[arg(long, default_value = "0")]
    pub seed_page: usize,
}

#[derive(Args)]
pub struct InterpretArgs {
    /// Input sources (file paths, URLs, or directories of .md files)
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// API key for the table interpreter (falls back to OPENAI_API_KEY)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub base_url: String,

    /// Model used for table interpretation
    #[arg(long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// Per-call timeout in seconds
    #[arg(long, default_value = "120")]
    pub timeout: u64,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Input sources (file paths, URLs, or directories of .md files)
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Write the analysis as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Show per-section detail
    #[arg(long)]
    pub detailed: bool,
}
