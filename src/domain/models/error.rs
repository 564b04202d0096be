use std::time::Duration;

use thiserror::Error;

/// Typed failures surfaced by the conversation feed. Backends and the
/// application layer keep using `anyhow`; these are what the view inspects.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("message is missing an id")]
    MissingId,

    #[error("message {0} is missing a timestamp")]
    MissingTimestamp(String),

    #[error("fetching older messages failed: {0}")]
    Fetch(String),

    #[error("fetching older messages timed out after {0:?}")]
    FetchTimeout(Duration),

    #[error("message text cannot be empty")]
    EmptyMessage,

    #[error("sending message failed: {0}")]
    Send(String),

    #[error("marking conversation as read failed: {0}")]
    MarkRead(String),

    #[error("conversation feed is closed")]
    Closed,
}

impl FeedError {
    /// Whether calling the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        return matches!(
            self,
            FeedError::Fetch(_)
                | FeedError::FetchTimeout(_)
                | FeedError::Send(_)
                | FeedError::MarkRead(_)
        );
    }
}
