use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Message;
use super::Timestamp;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub trainer_id: String,
    pub client_id: String,
    pub client_name: String,
    pub unread_count: u32,
}

impl Conversation {
    pub fn new(id: &str) -> Conversation {
        return Conversation {
            id: id.to_string(),
            ..Conversation::default()
        };
    }
}

/// Read-only snapshot of everything the view needs to render a conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub has_more_older: bool,
    pub oldest_loaded_timestamp: Option<Timestamp>,
    pub is_loading_older: bool,
    pub pending_anchor_id: Option<String>,
    pub unread_count: u32,
    pub last_error: Option<String>,
}

impl ConversationState {
    pub fn message_ids(&self) -> Vec<&str> {
        return self
            .messages
            .iter()
            .map(|message| return message.id.as_str())
            .collect();
    }
}
