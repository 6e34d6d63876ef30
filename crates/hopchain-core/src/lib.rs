//! Core types and constants shared across hopchain crates.
//!
//! This crate provides:
//! - Default configuration values
//! - Error class constants for structured logging
//! - The bidirectional relay used by every forwarding session

pub mod defaults;
pub mod errors;
pub mod io;

// Re-export commonly used items at crate root
pub use defaults::*;
pub use errors::*;

/// Project name.
pub const PROJECT_NAME: &str = "hopchain";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
