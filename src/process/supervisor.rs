//! Supervision of the external provisioning tool.
//!
//! One child per invocation. Both pipes are drained concurrently by two
//! reader tasks that feed a single bounded channel, so lines reach the sink
//! in arrival order and neither pipe can fill up and stall the child.

use async_trait::async_trait;
use chrono::Utc;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{InfraError, ProcessError, Result};

use super::runner::{CommandRunner, OutputSink};
use super::types::{ExitInfo, Invocation, OutputChunk, OutputStream};

/// Upper bound on captured standard error kept for failure messages.
pub const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Longest line forwarded as one chunk; longer lines are split.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Consecutive read failures after which a pipe is abandoned.
const MAX_READ_ERRORS: u32 = 16;

/// Default capacity of the channel between pipe readers and the sink.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Runs commands as child processes and streams their output.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    channel_capacity: usize,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    /// Creates a supervisor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Runs `invocation` to completion.
    ///
    /// Every line of output is passed to `sink` before this resolves.
    ///
    /// # Errors
    ///
    /// Returns `Spawn` if the program cannot be started and `Execution` if it
    /// exits with a non-zero code or is killed by a signal.
    pub async fn execute(&self, invocation: &Invocation, sink: &dyn OutputSink) -> Result<ExitInfo> {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            "Running '{}' in {}",
            invocation.command_line(),
            invocation.working_dir.display()
        );

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&invocation.program, &e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InfraError::internal("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| InfraError::internal("child stderr was not captured"))?;

        let (tx, mut rx) = mpsc::channel(self.channel_capacity);
        let readers = [
            tokio::spawn(read_lines(stdout, OutputStream::Stdout, tx.clone())),
            tokio::spawn(read_lines(stderr, OutputStream::Stderr, tx)),
        ];

        let mut tail = StderrTail::new(MAX_STDERR_BYTES);
        let mut stdout_lines = 0usize;
        let mut stderr_lines = 0usize;

        while let Some(chunk) = rx.recv().await {
            match chunk.stream {
                OutputStream::Stdout => stdout_lines += 1,
                OutputStream::Stderr => {
                    stderr_lines += 1;
                    tail.push(&chunk.line);
                }
            }
            sink.on_output(chunk);
        }

        for reader in readers {
            match reader.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error reading output of '{}': {e}", invocation.program),
                Err(e) => warn!("Output reader for '{}' failed: {e}", invocation.program),
            }
        }

        let status = child.wait().await?;
        let duration = clock.elapsed();

        if status.success() {
            info!(
                "'{}' finished in {:.1}s ({stdout_lines} stdout, {stderr_lines} stderr lines)",
                invocation.program,
                duration.as_secs_f64()
            );
            return Ok(ExitInfo {
                code: 0,
                started_at,
                duration,
                stdout_lines,
                stderr_lines,
            });
        }

        let code = status.code();
        warn!(
            "'{}' failed after {:.1}s with {status}",
            invocation.program,
            duration.as_secs_f64()
        );
        Err(ProcessError::Execution {
            program: invocation.program.clone(),
            code,
            stderr: tail.into_string(),
        }
        .into())
    }
}

#[async_trait]
impl CommandRunner for ProcessSupervisor {
    async fn run(&self, invocation: &Invocation, sink: &dyn OutputSink) -> Result<ExitInfo> {
        self.execute(invocation, sink).await
    }
}

fn spawn_error(program: &str, error: &std::io::Error) -> InfraError {
    let message = match error.kind() {
        std::io::ErrorKind::NotFound => format!("program not found ({error})"),
        std::io::ErrorKind::PermissionDenied => format!("permission denied ({error})"),
        _ => error.to_string(),
    };
    ProcessError::Spawn {
        program: program.to_string(),
        message,
    }
    .into()
}

/// Forwards one pipe line by line until end of file.
///
/// Bytes are decoded lossily. Once the receiver is gone, or a read fails, the
/// pipe is still drained so the child never blocks on a full pipe. Gives up
/// only after `MAX_READ_ERRORS` consecutive failed reads.
async fn read_lines<R>(
    pipe: R,
    stream: OutputStream,
    tx: mpsc::Sender<OutputChunk>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    let mut forwarding = true;
    let mut failures = 0u32;

    loop {
        buf.clear();
        let limit = u64::try_from(MAX_LINE_BYTES).unwrap_or(u64::MAX);
        let read = match (&mut reader).take(limit).read_until(b'\n', &mut buf).await {
            Ok(read) => {
                failures = 0;
                read
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_READ_ERRORS {
                    return Err(e);
                }
                if forwarding {
                    warn!("Failed reading {stream}: {e}; draining without forwarding");
                    forwarding = false;
                }
                continue;
            }
        };
        if read == 0 {
            return Ok(());
        }
        if !forwarding {
            continue;
        }

        let line = String::from_utf8_lossy(trim_newline(&buf)).into_owned();
        if tx.send(OutputChunk { stream, line }).await.is_err() {
            debug!("Receiver for {stream} closed, discarding remaining output");
            forwarding = false;
        }
    }
}

fn trim_newline(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

/// Rolling capture of the last bytes written to standard error.
struct StderrTail {
    text: String,
    limit: usize,
}

impl StderrTail {
    const fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
        }
    }

    fn push(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
        if self.text.len() > self.limit {
            let mut cut = self.text.len() - self.limit;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    fn into_string(self) -> String {
        self.text
    }
}
