#[cfg(test)]
#[path = "message_store_test.rs"]
mod tests;

use std::collections::HashSet;

use crate::domain::models::MergeKind;
use crate::domain::models::MergeOrigin;
use crate::domain::models::MergeResult;
use crate::domain::models::Message;
use crate::domain::models::RawMessage;
use crate::domain::models::Timestamp;

/// Messages of one conversation, always sorted ascending by timestamp and
/// unique by id.
#[derive(Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl MessageStore {
    pub fn messages(&self) -> &[Message] {
        return &self.messages;
    }

    pub fn len(&self) -> usize {
        return self.messages.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.messages.is_empty();
    }

    pub fn contains(&self, id: &str) -> bool {
        return self.ids.contains(id);
    }

    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        return self.messages.first().map(|message| return message.timestamp);
    }

    pub fn newest(&self) -> Option<&Message> {
        return self.messages.last();
    }

    pub fn merge(&mut self, batch: Vec<RawMessage>, origin: MergeOrigin) -> MergeResult {
        let previous_count = self.messages.len();
        let newest_timestamp = self.newest().map(|message| return message.timestamp);

        let mut rejected = 0;
        let mut incoming: Vec<Message> = vec![];
        for raw in batch {
            match raw.validate() {
                Ok(message) => {
                    // Also catches the same id appearing twice in one batch.
                    if !self.ids.insert(message.id.clone()) {
                        continue;
                    }
                    incoming.push(message);
                }
                Err(err) => {
                    rejected += 1;
                    tracing::warn!(error = %err, origin = %origin, "Dropping malformed message");
                }
            }
        }

        if incoming.is_empty() {
            return MergeResult::noop(origin, previous_count, rejected);
        }

        // Stable, so equal timestamps keep their arrival order.
        incoming.sort_by_key(|message| return message.timestamp);

        let kind = match origin {
            MergeOrigin::PageOlder => MergeKind::Prepend,
            MergeOrigin::Realtime => match newest_timestamp {
                Some(newest) if incoming[0].timestamp < newest => MergeKind::Interleave,
                _ => MergeKind::Append,
            },
        };

        let inserted_ids = incoming
            .iter()
            .map(|message| return message.id.clone())
            .collect::<Vec<String>>();

        let existing = std::mem::take(&mut self.messages);
        let mut merged = Vec::with_capacity(existing.len() + incoming.len());
        let mut incoming = incoming.into_iter().peekable();
        for message in existing {
            while let Some(next) = incoming.next_if(|m| return m.timestamp < message.timestamp) {
                merged.push(next);
            }
            merged.push(message);
        }
        merged.extend(incoming);
        self.messages = merged;

        tracing::debug!(
            kind = %kind,
            origin = %origin,
            previous_count,
            new_count = self.messages.len(),
            rejected,
            "Merged messages"
        );

        return MergeResult {
            kind,
            origin,
            previous_count,
            new_count: self.messages.len(),
            inserted_ids,
            rejected,
        };
    }
}
