//! Feed events.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::process::OutputStream;
use crate::session::SessionStatus;

/// One message on an operation's feed.
///
/// Serializes to a single-key JSON object: `{"log": ..}`, `{"error": ..}` or
/// `{"status": ..}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// One output line. `stream` is `None` for lines the publisher inserts.
    Log {
        /// The line.
        line: String,
        /// Origin of the line.
        stream: Option<OutputStream>,
    },
    /// The operation failed. Terminal.
    Error {
        /// Failure message.
        message: String,
    },
    /// The operation succeeded. Terminal.
    Done {
        /// Status the session ended in.
        status: SessionStatus,
    },
}

impl FeedEvent {
    /// Creates a log event for a line read from the tool.
    #[must_use]
    pub fn output(line: impl Into<String>, stream: OutputStream) -> Self {
        Self::Log {
            line: line.into(),
            stream: Some(stream),
        }
    }

    /// Creates a log event not produced by the tool.
    #[must_use]
    pub fn notice(line: impl Into<String>) -> Self {
        Self::Log {
            line: line.into(),
            stream: None,
        }
    }

    /// Creates an error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true for `error` and `done`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done { .. })
    }

    /// Returns the single-line JSON payload.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

impl Serialize for FeedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Log { line, .. } => map.serialize_entry("log", line)?,
            Self::Error { message } => map.serialize_entry("error", message)?,
            Self::Done { status } => map.serialize_entry("status", status)?,
        }
        map.end()
    }
}

/// Text of the synthetic line reporting lines a slow subscriber missed.
#[must_use]
pub fn omitted_notice(count: u64) -> String {
    let noun = if count == 1 { "line" } else { "lines" };
    format!("[{count} {noun} omitted from live feed; full log available via status]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        assert_eq!(
            FeedEvent::output("Plan: 1 to add", OutputStream::Stdout).to_json(),
            r#"{"log":"Plan: 1 to add"}"#
        );
        assert_eq!(FeedEvent::error("boom").to_json(), r#"{"error":"boom"}"#);
        assert_eq!(
            FeedEvent::Done {
                status: SessionStatus::Planned
            }
            .to_json(),
            r#"{"status":"planned"}"#
        );
    }

    #[test]
    fn test_multiline_payload_stays_on_one_line() {
        let json = FeedEvent::error("first\nsecond").to_json();
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_omitted_notice() {
        assert!(omitted_notice(1).starts_with("[1 line omitted"));
        assert!(omitted_notice(3).starts_with("[3 lines omitted"));
    }
}
