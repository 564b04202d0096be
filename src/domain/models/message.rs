#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use chrono::DateTime;
use chrono::Utc;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::FeedError;
use super::SenderRole;

pub type Timestamp = DateTime<Utc>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: SenderRole,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn new(id: &str, text: &str, sender: SenderRole, timestamp: Timestamp) -> Message {
        return Message {
            id: id.to_string(),
            text: text.to_string(),
            sender,
            timestamp,
        };
    }

    pub fn is_from_trainer(&self) -> bool {
        return self.sender.is_trainer();
    }
}

/// A message as a backend hands it over. Identity and ordering key are
/// optional here so one bad record can be rejected without failing its batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_from_trainer: bool,
    pub timestamp: Option<Timestamp>,
}

impl RawMessage {
    pub fn new(id: &str, text: &str, sender: SenderRole, timestamp: Timestamp) -> RawMessage {
        return RawMessage {
            id: Some(id.to_string()),
            text: text.to_string(),
            is_from_trainer: sender.is_trainer(),
            timestamp: Some(timestamp),
        };
    }

    pub fn validate(self) -> Result<Message, FeedError> {
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(FeedError::MissingId),
        };

        let timestamp = match self.timestamp {
            Some(timestamp) => timestamp,
            None => return Err(FeedError::MissingTimestamp(id)),
        };

        return Ok(Message {
            id,
            text: self.text,
            sender: SenderRole::from_trainer_flag(self.is_from_trainer),
            timestamp,
        });
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> RawMessage {
        return RawMessage {
            id: Some(message.id),
            text: message.text,
            is_from_trainer: message.sender.is_trainer(),
            timestamp: Some(message.timestamp),
        };
    }
}
