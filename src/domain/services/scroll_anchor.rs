#[cfg(test)]
#[path = "scroll_anchor_test.rs"]
mod tests;

use crate::domain::models::MergeKind;
use crate::domain::models::MergeResult;
use crate::domain::models::Message;
use crate::domain::models::ScrollInstruction;

/// Anchor on the message at this 1-based position once more than this many
/// messages are loaded, so the anchor is rarely the row that scrolls away.
pub const ANCHOR_POSITION: usize = 6;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AnchorState {
    #[default]
    Idle,
    AnchorCaptured(String),
    Restoring(String),
}

/// Decides how the view's scroll position reacts to each store change.
pub struct ScrollAnchorCoordinator {
    state: AnchorState,
    deferred_bottom_scroll: bool,
    near_bottom: bool,
}

impl Default for ScrollAnchorCoordinator {
    fn default() -> ScrollAnchorCoordinator {
        return ScrollAnchorCoordinator {
            state: AnchorState::Idle,
            deferred_bottom_scroll: false,
            // A freshly opened conversation sits at its newest message.
            near_bottom: true,
        };
    }
}

impl ScrollAnchorCoordinator {
    pub fn state(&self) -> &AnchorState {
        return &self.state;
    }

    pub fn pending_anchor_id(&self) -> Option<&str> {
        match &self.state {
            AnchorState::Idle => return None,
            AnchorState::AnchorCaptured(id) | AnchorState::Restoring(id) => {
                return Some(id.as_str())
            }
        }
    }

    pub fn has_deferred_bottom_scroll(&self) -> bool {
        return self.deferred_bottom_scroll;
    }

    /// Picks the anchor before a history fetch goes out. Does nothing for an
    /// empty list, and keeps an anchor that is already captured. A captured
    /// anchor marks the view as away from the bottom, so bottom scrolls that
    /// arrive meanwhile wait for `report_viewport(true)`.
    pub fn capture_anchor(&mut self, messages: &[Message]) -> Option<String> {
        if self.state != AnchorState::Idle {
            return self.pending_anchor_id().map(|id| return id.to_string());
        }

        let anchor = if messages.len() > ANCHOR_POSITION {
            messages.get(ANCHOR_POSITION - 1)
        } else {
            messages.first()
        }?;

        tracing::debug!(anchor_id = %anchor.id, "Captured scroll anchor");
        self.state = AnchorState::AnchorCaptured(anchor.id.clone());
        // Asking for older history moves the reader away from the newest
        // message until the view reports otherwise.
        self.near_bottom = false;

        return Some(anchor.id.clone());
    }

    pub fn on_merge(&mut self, result: &MergeResult, messages: &[Message]) -> Vec<ScrollInstruction> {
        let mut instructions = vec![];
        if !result.grew() {
            return instructions;
        }

        match result.kind {
            MergeKind::Prepend => {
                if let AnchorState::AnchorCaptured(anchor_id) = &self.state {
                    let anchor_id = anchor_id.clone();
                    self.state = AnchorState::Restoring(anchor_id.clone());
                    if messages.iter().any(|message| return message.id == anchor_id) {
                        instructions.push(ScrollInstruction::jump_to(&anchor_id));
                    }
                    self.state = AnchorState::Idle;
                } else if self.state == AnchorState::Idle && result.previous_count == 0 {
                    // First history into an empty conversation lands at the bottom.
                    if let Some(newest) = messages.last() {
                        instructions.push(ScrollInstruction::animate_to_bottom(&newest.id));
                    }
                }
            }
            MergeKind::Append => {
                if self.state == AnchorState::Idle {
                    if let Some(newest) = messages.last() {
                        instructions.push(ScrollInstruction::animate_to_bottom(&newest.id));
                    }
                } else {
                    tracing::debug!("Deferring bottom scroll until history restoration ends");
                    self.deferred_bottom_scroll = true;
                }
            }
            MergeKind::Interleave | MergeKind::Noop => {}
        }

        instructions.extend(self.drain_deferred(messages));

        return instructions;
    }

    /// Drops a captured anchor when its fetch failed, was cancelled, or merged
    /// nothing.
    pub fn release_anchor(&mut self, messages: &[Message]) -> Vec<ScrollInstruction> {
        if self.state != AnchorState::Idle {
            tracing::debug!("Releasing scroll anchor without restoration");
            self.state = AnchorState::Idle;
        }

        return self.drain_deferred(messages).into_iter().collect();
    }

    /// Records whether the view is currently scrolled close to its newest
    /// message.
    pub fn report_viewport(&mut self, near_bottom: bool, messages: &[Message]) -> Vec<ScrollInstruction> {
        self.near_bottom = near_bottom;
        return self.drain_deferred(messages).into_iter().collect();
    }

    fn drain_deferred(&mut self, messages: &[Message]) -> Option<ScrollInstruction> {
        if self.state != AnchorState::Idle || !self.deferred_bottom_scroll || !self.near_bottom {
            return None;
        }

        let newest = messages.last()?;
        self.deferred_bottom_scroll = false;

        return Some(ScrollInstruction::animate_to_bottom(&newest.id));
    }
}
