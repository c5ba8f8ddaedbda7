//! Per-operation feed between a running operation and one subscriber.
//!
//! Output lines are offered with a non-blocking send so a slow subscriber
//! never stalls the process supervisor. Lines that do not fit are counted and
//! reported with a single notice once the subscriber catches up; the session
//! log keeps everything. Slots for the final notice and the terminal event
//! are reserved when the feed is created, so the terminal event always fits.

use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError, OwnedPermit};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::process::OutputStream;
use crate::session::SessionStatus;

use super::events::{omitted_notice, FeedEvent};

/// Slots held back from output lines: one omission notice, one terminal event.
const RESERVED_SLOTS: usize = 2;

/// Sending half of a feed.
#[derive(Debug)]
pub struct FeedPublisher {
    session_id: String,
    tx: mpsc::Sender<FeedEvent>,
    notice_slot: Option<OwnedPermit<FeedEvent>>,
    terminal_slot: Option<OwnedPermit<FeedEvent>>,
    omitted: AtomicU64,
    disconnected: AtomicBool,
}

/// Receiving half of a feed.
#[derive(Debug)]
pub struct EventFeed {
    inner: ReceiverStream<FeedEvent>,
}

/// Creates a connected publisher and feed.
///
/// `capacity` bounds the buffered output lines; the reserved slots come on
/// top of it.
#[must_use]
pub fn channel(session_id: &str, capacity: usize) -> (FeedPublisher, EventFeed) {
    let (tx, rx) = mpsc::channel(capacity.max(1).saturating_add(RESERVED_SLOTS));
    let notice_slot = tx.clone().try_reserve_owned().ok();
    let terminal_slot = tx.clone().try_reserve_owned().ok();
    (
        FeedPublisher {
            session_id: session_id.to_string(),
            tx,
            notice_slot,
            terminal_slot,
            omitted: AtomicU64::new(0),
            disconnected: AtomicBool::new(false),
        },
        EventFeed {
            inner: ReceiverStream::new(rx),
        },
    )
}

impl FeedPublisher {
    /// Returns true once the subscriber has gone away.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed) || self.tx.is_closed()
    }

    /// Number of lines dropped and not yet reported.
    #[must_use]
    pub fn omitted(&self) -> u64 {
        self.omitted.load(Ordering::Relaxed)
    }

    /// Offers one output line without waiting.
    pub fn publish_line(&self, line: &str, stream: OutputStream) {
        if self.is_disconnected() {
            return;
        }

        let pending = self.omitted();
        if pending > 0 {
            match self.tx.try_send(FeedEvent::notice(omitted_notice(pending))) {
                Ok(()) => {
                    self.omitted.fetch_sub(pending, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    self.omitted.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    self.mark_disconnected();
                    return;
                }
            }
        }

        match self.tx.try_send(FeedEvent::output(line, stream)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.omitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => self.mark_disconnected(),
        }
    }

    /// Delivers the terminal event and closes the feed.
    ///
    /// `Ok` carries the final status (`done`), `Err` the failure message
    /// (`error`). Never waits on the subscriber. Returns false if the
    /// subscriber was gone.
    pub fn finish(mut self, outcome: Result<SessionStatus, String>) -> bool {
        if self.is_disconnected() {
            return false;
        }

        let pending = self.omitted();
        if pending > 0 {
            self.send_reserved(FeedEvent::notice(omitted_notice(pending)), false);
        }

        let event = match outcome {
            Ok(status) => FeedEvent::Done { status },
            Err(message) => FeedEvent::error(message),
        };
        self.send_reserved(event, true)
    }

    /// Sends through a reserved slot, falling back to a plain offer.
    fn send_reserved(&mut self, event: FeedEvent, terminal: bool) -> bool {
        let slot = if terminal {
            self.terminal_slot.take()
        } else {
            self.notice_slot.take()
        };
        if let Some(permit) = slot {
            drop(permit.send(event));
            return true;
        }
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Feed event for session {} not delivered: {e}", self.session_id);
                false
            }
        }
    }

    fn mark_disconnected(&self) {
        if !self.disconnected.swap(true, Ordering::Relaxed) {
            debug!(
                "Subscriber for session {} disconnected; operation continues",
                self.session_id
            );
        }
    }
}

impl Drop for FeedPublisher {
    fn drop(&mut self) {
        if self.terminal_slot.is_some() && !self.is_disconnected() {
            debug!("Feed for session {} dropped without a result", self.session_id);
            self.send_reserved(
                FeedEvent::error("operation ended without reporting a result"),
                true,
            );
        }
    }
}

impl EventFeed {
    /// Waits for the next event; `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.inner.next().await
    }

    /// Drains the feed up to and including its terminal event.
    pub async fn collect_events(mut self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

impl Stream for EventFeed {
    type Item = FeedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(events: &[FeedEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                FeedEvent::Log { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_event() {
        let (publisher, feed) = channel("s1", 16);
        publisher.publish_line("A", OutputStream::Stdout);
        publisher.publish_line("B", OutputStream::Stderr);
        assert!(publisher.finish(Ok(SessionStatus::Planned)));

        let events = feed.collect_events().await;
        assert_eq!(lines(&events), vec!["A", "B"]);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(
            events.last(),
            Some(&FeedEvent::Done {
                status: SessionStatus::Planned
            })
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_gets_omission_notice() {
        let (publisher, mut feed) = channel("s1", 2);
        for i in 0..5 {
            publisher.publish_line(&format!("line {i}"), OutputStream::Stdout);
        }
        assert_eq!(publisher.omitted(), 3);

        assert_eq!(
            feed.recv().await,
            Some(FeedEvent::output("line 0", OutputStream::Stdout))
        );
        assert_eq!(
            feed.recv().await,
            Some(FeedEvent::output("line 1", OutputStream::Stdout))
        );
        publisher.publish_line("line 5", OutputStream::Stdout);
        assert_eq!(publisher.omitted(), 0);

        assert!(publisher.finish(Err(String::from("failed"))));
        let rest = feed.collect_events().await;

        assert_eq!(lines(&rest), vec![omitted_notice(3), String::from("line 5")]);
        assert_eq!(rest.last(), Some(&FeedEvent::error("failed")));
    }

    #[tokio::test]
    async fn test_terminal_event_fits_in_full_feed() {
        let (publisher, feed) = channel("s1", 1);
        publisher.publish_line("A", OutputStream::Stdout);
        publisher.publish_line("B", OutputStream::Stdout);
        assert_eq!(publisher.omitted(), 1);
        assert!(publisher.finish(Ok(SessionStatus::Applied)));

        let events = feed.collect_events().await;
        assert_eq!(lines(&events), vec![String::from("A"), omitted_notice(1)]);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(
            events.last(),
            Some(&FeedEvent::Done {
                status: SessionStatus::Applied
            })
        );
    }

    #[tokio::test]
    async fn test_disconnected_subscriber_does_not_fail_publisher() {
        let (publisher, feed) = channel("s1", 2);
        drop(feed);
        publisher.publish_line("ignored", OutputStream::Stdout);
        assert!(publisher.is_disconnected());
        assert!(!publisher.finish(Ok(SessionStatus::Applied)));
    }

    #[tokio::test]
    async fn test_dropped_publisher_reports_error() {
        let (publisher, feed) = channel("s1", 4);
        drop(publisher);
        let events = feed.collect_events().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FeedEvent::Error { .. }));
    }
}
