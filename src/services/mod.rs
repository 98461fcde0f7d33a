//! Service layer for scanscribe.
//!
//! This module contains domain logic separated from UI concerns.
//! Services can be used by the CLI, a web server, or other interfaces.

pub mod extraction;

pub use extraction::{ExtractionService, ImageInput};
