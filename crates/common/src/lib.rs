//! Common utilities and types shared across the POS telemetry crates.

pub mod environment;
pub mod error;
pub mod logging;
pub mod resources;

pub use environment::Environment;
pub use error::{Error, Result};
