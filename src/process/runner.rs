//! Seams between the lifecycle controller and process execution.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{ExitInfo, Invocation, OutputChunk};

/// Receiver of output lines.
///
/// Called once per line in arrival order. Implementations must return
/// promptly: the supervisor drains the child's pipes on the same loop.
pub trait OutputSink: Send + Sync {
    /// Handles one line of output.
    fn on_output(&self, chunk: OutputChunk);
}

impl<F> OutputSink for F
where
    F: Fn(OutputChunk) + Send + Sync,
{
    fn on_output(&self, chunk: OutputChunk) {
        self(chunk);
    }
}

/// Something that can run an invocation to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the invocation, forwarding every output line to `sink`.
    ///
    /// Resolves `Ok` only when the command exits with code 0.
    async fn run(&self, invocation: &Invocation, sink: &dyn OutputSink) -> Result<ExitInfo>;
}
