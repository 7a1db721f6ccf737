//! voicecheck - watch speaker verification run over a voice session.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod audio;
mod commands;

use commands::{ConfigCommand, RunCommand, SimilarityCommand};

/// voicecheck - continuous speaker verification for voice sessions.
///
/// Replays a recorded session (or the live microphone) through the
/// verification engine and prints every engine event as it happens.
///
/// Configuration is stored in ~/.voicecheck/voicecheck/ and supports
/// multiple contexts, similar to kubectl's context management.
#[derive(Parser)]
#[command(name = "voicecheck")]
#[command(about = "Continuous speaker verification CLI")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.voicecheck/voicecheck/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Context name to use
    #[arg(short = 'c', long, global = true)]
    pub context: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage CLI configuration
    Config(ConfigCommand),
    /// Run a verification session
    Run(RunCommand),
    /// Compare the loudness profile of two recordings
    Similarity(SimilarityCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Config(cmd) => cmd.run(&cli).await,
        Commands::Run(cmd) => cmd.run(&cli).await,
        Commands::Similarity(cmd) => cmd.run(&cli).await,
    }
}
