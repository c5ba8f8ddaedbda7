//! Live feeds of operation progress.

mod events;
mod publisher;

pub use events::{omitted_notice, FeedEvent};
pub use publisher::{channel, EventFeed, FeedPublisher};
