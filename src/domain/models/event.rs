use super::ConversationState;
use super::ScrollInstruction;

/// Notifications from a conversation feed to its view. A scroll instruction is
/// always sent after the state snapshot it refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    StateChanged(ConversationState),
    Scroll(ScrollInstruction),
}
