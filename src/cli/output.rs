//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, Descriptor, RenderedConfig, ValidationResult};
use crate::process::OutputStream;
use crate::session::{OperationRecord, SessionSnapshot, SessionStatus};
use crate::stream::FeedEvent;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Operation history row for table display.
#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Exit")]
    exit_code: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the output format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats one feed event as a single line.
    #[must_use]
    pub fn format_event(&self, event: &FeedEvent) -> String {
        match self.format {
            OutputFormat::Json => event.to_json(),
            OutputFormat::Text => match event {
                FeedEvent::Log {
                    line,
                    stream: Some(OutputStream::Stdout),
                } => line.clone(),
                FeedEvent::Log {
                    line,
                    stream: Some(OutputStream::Stderr),
                } => line.yellow().to_string(),
                FeedEvent::Log { line, stream: None } => line.dimmed().to_string(),
                FeedEvent::Error { message } => format!("{} {message}", "✗".red()),
                FeedEvent::Done { status } => {
                    format!("{} Finished: {}", "✓".green(), Self::format_status_label(*status))
                }
            },
        }
    }

    /// Formats a session's status and recent history.
    #[must_use]
    pub fn format_status(&self, snapshot: &SessionSnapshot) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&StatusJson::from(snapshot))
                .unwrap_or_default(),
            OutputFormat::Text => Self::format_status_text(snapshot),
        }
    }

    fn format_status_text(snapshot: &SessionSnapshot) -> String {
        let mut output = String::new();

        let _ = write!(
            output,
            "\nSession: {}\n   Status: {}\n   Directory: {}\n",
            snapshot.session_id,
            Self::format_status_label(snapshot.status),
            snapshot.working_dir.display()
        );
        let _ = writeln!(output, "   Log lines: {}", snapshot.logs.len());
        if snapshot.dropped_logs > 0 {
            let _ = writeln!(output, "   Evicted log lines: {}", snapshot.dropped_logs);
        }

        if !snapshot.history.is_empty() {
            output.push('\n');
            let rows: Vec<HistoryRow> = snapshot.history.iter().map(Self::history_row).collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if let Some(error) = &snapshot.last_error {
            let _ = write!(output, "\n{} Last error: {}\n", "✗".red(), Self::truncate(error, 200));
        }

        output
    }

    /// Formats a validation summary.
    #[must_use]
    pub fn format_validation(&self, descriptor: &Descriptor, result: &ValidationResult) -> String {
        let services: Vec<&str> = descriptor.services.enabled().iter().map(|s| s.key()).collect();
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "valid": result.is_valid(),
                "name": descriptor.name,
                "region": descriptor.region(),
                "target": descriptor.environment.target.to_string(),
                "stage": descriptor.environment.stage,
                "services": services,
                "warnings": result.warnings,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("{} Descriptor is valid\n", "✓".green());
                let _ = writeln!(output, "\n   Name: {}", descriptor.name);
                let _ = writeln!(output, "   Region: {}", descriptor.region().unwrap_or("-"));
                let _ = writeln!(output, "   Target: {}", descriptor.environment.target);
                let _ = writeln!(output, "   Stage: {}", descriptor.environment.stage);
                let services = if services.is_empty() {
                    String::from("none")
                } else {
                    services.join(", ")
                };
                let _ = writeln!(output, "   Services: {services}");

                if !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats the summary printed after writing a rendered configuration.
    #[must_use]
    pub fn format_rendered(&self, rendered: &RenderedConfig, target: &str) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "path": target,
                "fingerprint": rendered.fingerprint,
                "services": rendered.services.iter().map(|s| s.key()).collect::<Vec<_>>(),
            }))
            .unwrap_or_default(),
            OutputFormat::Text => format!(
                "{} Wrote {target} ({} service(s), fingerprint {})",
                "✓".green(),
                rendered.services.len(),
                ConfigHasher::new().short_hash(&rendered.fingerprint)
            ),
        }
    }

    /// Formats a session status with color.
    fn format_status_label(status: SessionStatus) -> String {
        match status {
            SessionStatus::Initialized | SessionStatus::Planned | SessionStatus::Applied => {
                status.as_str().green().to_string()
            }
            SessionStatus::Destroyed => status.as_str().blue().to_string(),
            SessionStatus::Error => status.as_str().red().to_string(),
            SessionStatus::Idle => status.as_str().dimmed().to_string(),
            SessionStatus::Initializing
            | SessionStatus::Planning
            | SessionStatus::Applying
            | SessionStatus::Destroying => status.as_str().yellow().to_string(),
        }
    }

    fn history_row(record: &OperationRecord) -> HistoryRow {
        let elapsed = record.finished_at - record.started_at;
        HistoryRow {
            operation: record.operation.to_string(),
            started: record.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration: format!("{:.1}s", elapsed.num_milliseconds() as f64 / 1000.0),
            result: if record.success {
                "ok".green().to_string()
            } else {
                "failed".red().to_string()
            },
            exit_code: record
                .exit_code
                .map_or_else(|| String::from("-"), |c| c.to_string()),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_chars: usize) -> String {
        if s.chars().count() <= max_chars {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct StatusJson<'a> {
    session_id: &'a str,
    status: SessionStatus,
    log_lines: usize,
    last_error: Option<&'a str>,
    history: &'a [OperationRecord],
}

impl<'a> From<&'a SessionSnapshot> for StatusJson<'a> {
    fn from(snapshot: &'a SessionSnapshot) -> Self {
        Self {
            session_id: &snapshot.session_id,
            status: snapshot.status,
            log_lines: snapshot.logs.len(),
            last_error: snapshot.last_error.as_deref(),
            history: &snapshot.history,
        }
    }
}
