//! External tool execution.
//!
//! This module provides:
//! - Invocation and output types
//! - The [`CommandRunner`] and [`OutputSink`] seams used by the lifecycle layer
//! - [`ProcessSupervisor`], the runner backed by real child processes

mod runner;
mod supervisor;
mod types;

pub use runner::{CommandRunner, OutputSink};
pub use supervisor::{ProcessSupervisor, MAX_LINE_BYTES, MAX_STDERR_BYTES};
pub use types::{ExitInfo, Invocation, OutputChunk, OutputStream};
