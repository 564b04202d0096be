#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

use std::path;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream;
use futures::StreamExt;
use tokio::fs;
use tokio::sync::mpsc;

use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::MessageStream;
use crate::domain::models::RawMessage;
use crate::domain::models::SenderRole;
use crate::domain::models::Timestamp;

/// In-process message service. Keeps every conversation's history in memory
/// and fans new messages out to all open subscriptions.
#[derive(Default)]
pub struct MemoryBackend {
    history: DashMap<String, Vec<RawMessage>>,
    subscribers: DashMap<String, Vec<mpsc::UnboundedSender<RawMessage>>>,
    fetch_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn with_history(conversation_id: &str, history: Vec<RawMessage>) -> MemoryBackend {
        let backend = MemoryBackend::default();
        backend.history.insert(conversation_id.to_string(), history);
        return backend;
    }

    /// Seeds a conversation from a JSON array of messages.
    pub async fn from_fixture(conversation_id: &str, file: &path::Path) -> Result<MemoryBackend> {
        let json_str = fs::read_to_string(file).await?;
        let history = serde_json::from_str::<Vec<RawMessage>>(&json_str)?;
        tracing::debug!(
            conversation_id,
            file = %file.display(),
            count = history.len(),
            "Loaded conversation fixture"
        );

        return Ok(MemoryBackend::with_history(conversation_id, history));
    }

    /// Stores a message and pushes it to every live subscription of its
    /// conversation. Subscriptions whose receiver is gone are dropped.
    pub fn deliver(&self, conversation_id: &str, raw: RawMessage) {
        self.history
            .entry(conversation_id.to_string())
            .or_default()
            .push(raw.clone());

        if let Some(mut subscribers) = self.subscribers.get_mut(conversation_id) {
            subscribers.retain(|subscriber| return subscriber.send(raw.clone()).is_ok());
        }
    }

    pub fn fetch_calls(&self) -> usize {
        return self.fetch_calls.load(Ordering::SeqCst);
    }

    pub fn read_calls(&self) -> usize {
        return self.read_calls.load(Ordering::SeqCst);
    }

    pub fn history_len(&self, conversation_id: &str) -> usize {
        return self
            .history
            .get(conversation_id)
            .map(|history| return history.len())
            .unwrap_or(0);
    }
}

fn is_before(raw: &RawMessage, before: Option<Timestamp>) -> bool {
    match (raw.timestamp, before) {
        (_, None) => return true,
        (Some(timestamp), Some(before)) => return timestamp < before,
        (None, Some(_)) => return false,
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> BackendName {
        return BackendName::Memory;
    }

    #[allow(clippy::implicit_return)]
    async fn fetch_older_messages(
        &self,
        conversation_id: &str,
        before: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<RawMessage>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let mut page = match self.history.get(conversation_id) {
            Some(history) => history
                .iter()
                .filter(|raw| return is_before(raw, before))
                .cloned()
                .collect::<Vec<RawMessage>>(),
            None => vec![],
        };

        page.sort_by(|a, b| return b.timestamp.cmp(&a.timestamp));
        page.truncate(limit);

        return Ok(page);
    }

    #[allow(clippy::implicit_return)]
    async fn subscribe(&self, conversation_id: &str) -> Result<MessageStream> {
        let (tx, rx) = mpsc::unbounded_channel::<RawMessage>();
        self.subscribers
            .entry(conversation_id.to_string())
            .or_default()
            .push(tx);

        let stream = stream::unfold(rx, |mut rx| async move {
            let raw = rx.recv().await?;
            return Some((Ok::<RawMessage, anyhow::Error>(raw), rx));
        });

        return Ok(stream.boxed());
    }

    #[allow(clippy::implicit_return)]
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        sender: SenderRole,
    ) -> Result<()> {
        let raw = RawMessage::new(
            &uuid::Uuid::new_v4().to_string(),
            text,
            sender,
            Utc::now(),
        );
        self.deliver(conversation_id, raw);

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(conversation_id, "Marked conversation as read");
        return Ok(());
    }
}
