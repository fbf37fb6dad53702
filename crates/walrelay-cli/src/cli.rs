use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "walrelay",
    about = "walrelay — inter-cluster WAL replication reader",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file (a `[source]` table).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Tail a live WAL group directory and print ship-ready batches
    Tail(TailArgs),
    /// Replay a finite (recovered) WAL group directory and exit
    Replay(ReplayArgs),
}

#[derive(Args)]
pub struct TailArgs {
    /// Directory holding the group's .wal files
    pub dir: PathBuf,

    /// Replicate only these column families (repeatable)
    #[arg(long = "family")]
    pub families: Vec<String>,

    /// Replicate only these tables (repeatable)
    #[arg(long = "table")]
    pub tables: Vec<String>,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Directory holding the group's .wal files
    pub dir: PathBuf,

    /// Replicate only these column families (repeatable)
    #[arg(long = "family")]
    pub families: Vec<String>,

    /// Replicate only these tables (repeatable)
    #[arg(long = "table")]
    pub tables: Vec<String>,

    /// Discard zero-length head files left by an unclean writer shutdown
    #[arg(long)]
    pub autorecovery: bool,
}
