//! Utility functions for CLI commands.

use voicecheck_cli::config::ACCESS_KEY_ENV;
use voicecheck_cli::{Config, Output, OutputFormat, load_config};
use voicecheck_engine::EngineConfig;

use crate::Cli;

const APP_NAME: &str = "voicecheck";

/// Gets the global configuration.
pub fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    load_config(APP_NAME, cli.config.as_deref())
}

/// Resolves the engine configuration for this invocation: selected
/// context, then the access-key environment override.
pub fn get_engine_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let cfg = get_config(cli)?;
    cfg.engine_config(cli.context.as_deref(), std::env::var(ACCESS_KEY_ENV).ok())
}

/// Output writer honoring `--json` and `-o`.
pub fn output(cli: &Cli) -> anyhow::Result<Output> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Yaml
    };
    Output::new(format, cli.output.as_deref())
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints info message.
pub fn print_info(msg: &str) {
    eprintln!("\x1b[34mℹ\x1b[0m {}", msg);
}

/// Prints warning message.
pub fn print_warning(msg: &str) {
    eprintln!("\x1b[33m⚠\x1b[0m {}", msg);
}
