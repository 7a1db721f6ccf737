//! Audio inputs for the CLI.

#[cfg(feature = "cpal-audio")]
pub mod mic;
pub mod wav;

pub use wav::{Recording, load_wav, replay};
