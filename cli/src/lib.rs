//! CLI utilities for voicecheck.
//!
//! Configuration lives in `~/.voicecheck/{app_name}/config.yaml` and holds
//! named contexts, each one a full engine configuration.

pub mod config;
pub mod output;
pub mod script;

pub use config::{Config, Context, load_config, mask_api_key};
pub use output::{Output, OutputFormat};
pub use script::{Script, ScriptError, ScriptStep, load_script};
