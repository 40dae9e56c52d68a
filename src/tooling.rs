//! Tooling & Integration Layer
//!
//! Command-line entry points over the adapter: a watch loop over the event
//! pipeline, link store inspection and effective configuration.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
