//! Command-line interface for scanscribe.

mod commands;
pub mod icons;

pub use commands::{is_verbose, run};
