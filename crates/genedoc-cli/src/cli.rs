use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "genedoc",
    about = "genedoc -- build, diff, and publish merged gene documents",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Pipeline configuration file.
    #[arg(short, long, global = true, default_value = "genedoc.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// Progress lines go to stderr when stdout carries JSON.
    pub fn status_to_stderr(self) -> bool {
        self == Self::Json
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Register source descriptors and build configs from a TOML file
    Register(RegisterArgs),
    /// Build a new generation, or resume the latest run
    Build(BuildArgs),
    /// Compute the change set between the published collection and a generation
    Diff(DiffArgs),
    /// Apply a change set file to the published collection
    Apply(ApplyArgs),
    /// Diff, apply, and verify against the latest successful generation
    Sync(BuildNameArgs),
    /// Show the run history of a build
    Runs(BuildNameArgs),
    /// List stored generations of a build
    Generations(BuildNameArgs),
    /// Count published documents per generation timestamp
    Timestamps(BuildNameArgs),
    /// List published documents stamped within a time range
    History(HistoryArgs),
    /// Write `<id> TAB <timestamp>` for every published document
    DumpTimestamps(DumpArgs),
}

#[derive(Args)]
pub struct RegisterArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct BuildArgs {
    pub build: String,
    /// Resume the latest run at this 1-based non-root source.
    #[arg(long)]
    pub restart_at: Option<usize>,
    /// Merge on a pool of this many threads.
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Cut each source into explicit merge tasks (needs --workers).
    #[arg(long)]
    pub tasks: bool,
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Args)]
pub struct DiffArgs {
    pub build: String,
    /// Generation to compare; defaults to the latest successful build.
    #[arg(long)]
    pub new: Option<String>,
    /// Write the change set here as JSON.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct ApplyArgs {
    pub changes: PathBuf,
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Args)]
pub struct BuildNameArgs {
    pub build: String,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub build: String,
    /// Only documents stamped after this RFC 3339 timestamp.
    #[arg(long)]
    pub after: Option<String>,
    /// Only documents stamped before this RFC 3339 timestamp.
    #[arg(long)]
    pub before: Option<String>,
}

#[derive(Args)]
pub struct DumpArgs {
    pub build: String,
    /// Output file; stdout when omitted.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}
