//! scopeconf CLI library
//!
//! Exposes the CLI entry point so the binary stays a one-line shim.

mod cli;

pub use cli::run;
