//! Configuration management commands.

use clap::{Args, Subcommand};

use voicecheck_cli::Context as CliContext;
use voicecheck_engine::EngineConfig;

use super::{get_config, output, print_success, print_warning};
use crate::Cli;

/// Manage CLI configuration.
///
/// Each context is a complete engine configuration. Keys not present in
/// the file take the engine defaults.
///
/// Configuration is stored in ~/.voicecheck/voicecheck/config.yaml
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Write a context with default settings
    Init {
        /// Context name
        #[arg(default_value = "default")]
        name: String,
        /// Biometric backend access key
        #[arg(long)]
        access_key: Option<String>,
        /// Match threshold
        #[arg(long)]
        threshold: Option<f32>,
        /// Overwrite an existing context
        #[arg(long)]
        force: bool,
    },
    /// Set the current context
    #[command(name = "use-context")]
    UseContext {
        /// Context name
        name: String,
    },
    /// Delete a context
    #[command(name = "delete-context")]
    DeleteContext {
        /// Context name
        name: String,
    },
    /// List all contexts
    #[command(name = "list-contexts", alias = "get-contexts")]
    ListContexts,
    /// Print the configuration with access keys masked
    Show,
}

impl ConfigCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::Init {
                name,
                access_key,
                threshold,
                force,
            } => {
                let mut cfg = get_config(cli)?;
                if cfg.get_context(name).is_some() && !force {
                    anyhow::bail!("context '{}' already exists, use --force to overwrite", name);
                }

                let mut engine = EngineConfig::default();
                engine.access_key = access_key.clone();
                if let Some(t) = threshold {
                    engine.match_threshold = *t;
                }
                if engine.access_key().is_none() {
                    print_warning("no access key set, verification will be disabled");
                }

                cfg.add_context(
                    name,
                    CliContext {
                        engine,
                        ..Default::default()
                    },
                )?;
                print_success(&format!(
                    "Context \"{}\" written to {}",
                    name,
                    cfg.path().display()
                ));
                Ok(())
            }

            ConfigSubcommand::UseContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.use_context(name)?;
                print_success(&format!("Switched to context \"{}\"", name));
                Ok(())
            }

            ConfigSubcommand::DeleteContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.delete_context(name)?;
                print_success(&format!("Context \"{}\" deleted", name));
                Ok(())
            }

            ConfigSubcommand::ListContexts => {
                let cfg = get_config(cli)?;
                if cfg.contexts.is_empty() {
                    println!("No contexts configured");
                    return Ok(());
                }

                println!("{:<8} {:<20} {:<10} {}", "CURRENT", "NAME", "THRESHOLD", "ACCESS_KEY");
                for name in cfg.list_contexts() {
                    let Some(ctx) = cfg.get_context(name) else {
                        continue;
                    };
                    let current = if cfg.current_context == name { "*" } else { "" };
                    let key = if ctx.engine.access_key().is_some() { "set" } else { "-" };
                    println!(
                        "{:<8} {:<20} {:<10} {}",
                        current, name, ctx.engine.match_threshold, key
                    );
                }
                Ok(())
            }

            ConfigSubcommand::Show => {
                let cfg = get_config(cli)?;
                output(cli)?.write(&cfg.masked())
            }
        }
    }
}
