//! CLI module for the Halldyll infra orchestrator.
//!
//! This module provides the command-line interface for rendering
//! descriptors, running the HTTP service, and driving session lifecycles
//! from a terminal.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, SessionArgs};
pub use output::OutputFormatter;
