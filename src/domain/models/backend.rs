#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

use super::RawMessage;
use super::SenderRole;
use super::Timestamp;

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BackendName {
    Memory,
    Http,
}

impl BackendName {
    pub fn parse(text: String) -> Option<BackendName> {
        return BackendName::iter().find(|e| return e.to_string() == text);
    }
}

/// Live stream of newly created messages. Delivery is at-least-once and in no
/// particular order.
pub type MessageStream = BoxStream<'static, Result<RawMessage>>;

#[async_trait]
pub trait Backend {
    fn name(&self) -> BackendName;

    /// Returns up to `limit` messages strictly older than `before`, or the
    /// newest page of the conversation when `before` is `None`. The order of
    /// the returned batch is irrelevant, the engine sorts it.
    async fn fetch_older_messages(
        &self,
        conversation_id: &str,
        before: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<RawMessage>>;

    /// Opens the realtime subscription for a conversation. Reconnection is the
    /// backend's business; the stream ending means the subscription is over.
    async fn subscribe(&self, conversation_id: &str) -> Result<MessageStream>;

    /// Sends a new message. The stored message comes back through `subscribe`.
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        sender: SenderRole,
    ) -> Result<()>;

    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()>;
}

pub type SharedBackend = Arc<dyn Backend + Send + Sync>;
