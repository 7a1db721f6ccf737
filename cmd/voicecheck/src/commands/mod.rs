//! CLI commands module.

mod config;
mod run;
mod similarity;
mod util;

pub use config::ConfigCommand;
pub use run::RunCommand;
pub use similarity::SimilarityCommand;

pub(crate) use util::*;
