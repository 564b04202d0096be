use std::path;

/// Location of the JSON fixture file holding the same conversation as
/// `conversation_fixture`.
pub fn conversation_fixture_path() -> path::PathBuf {
    return path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../fixtures/conversation.json");
}

/// Twelve messages between a trainer and a client, one minute apart, plus one
/// record with no timestamp that must be dropped on merge.
pub fn conversation_fixture() -> &'static str {
    return r#"
[
  { "id": "m1", "text": "Hi! I'm excited to start working with you.", "isFromTrainer": true, "timestamp": "2023-11-14T10:01:00Z" },
  { "id": "m2", "text": "Thank you! When should we start?", "isFromTrainer": false, "timestamp": "2023-11-14T10:02:00Z" },
  { "id": "m3", "text": "Let's begin with some basic mobility work.", "isFromTrainer": true, "timestamp": "2023-11-14T10:03:00Z" },
  { "id": "m4", "text": "Sounds perfect!", "isFromTrainer": false, "timestamp": "2023-11-14T10:04:00Z" },
  { "id": "m5", "text": "I'll send you a plan shortly.", "isFromTrainer": true, "timestamp": "2023-11-14T10:05:00Z" },
  { "id": "m6", "text": "Got it, thanks.", "isFromTrainer": false, "timestamp": "2023-11-14T10:06:00Z" },
  { "id": "m7", "text": "How did the first session feel?", "isFromTrainer": true, "timestamp": "2023-11-14T10:07:00Z" },
  { "id": "m8", "text": "A little sore, but good.", "isFromTrainer": false, "timestamp": "2023-11-14T10:08:00Z" },
  { "id": "m9", "text": "That's normal. Rest tomorrow.", "isFromTrainer": true, "timestamp": "2023-11-14T10:09:00Z" },
  { "id": "m10", "text": "Will do.", "isFromTrainer": false, "timestamp": "2023-11-14T10:10:00Z" },
  { "id": "m11", "text": "Can we schedule a call this week?", "isFromTrainer": false, "timestamp": "2023-11-14T10:11:00Z" },
  { "id": "m12", "text": "Thursday works for me.", "isFromTrainer": true, "timestamp": "2023-11-14T10:12:00Z" },
  { "id": "broken", "text": "I have no timestamp.", "isFromTrainer": true }
]
"#
    .trim();
}
