//! ingestd library crate.

/// Process manager, records and capability adapters.
pub mod core;

/// CLI argument parsing and handlers (only when the `cli` feature is enabled).
#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "cli")]
pub mod app;

mod config;
mod error;
mod logging;

pub use config::*;
pub use error::*;
pub use logging::LoggingConfig;
