use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum ScrollKind {
    /// Move without animation so prepended history doesn't shift the viewport.
    JumpTo,
    /// Animate down to the newest message.
    AnimateToBottom,
}

/// What the view should do with its scroll position after a store change.
/// Timing and animation curves are left to the view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrollInstruction {
    pub kind: ScrollKind,
    pub target_id: String,
}

impl ScrollInstruction {
    pub fn jump_to(target_id: &str) -> ScrollInstruction {
        return ScrollInstruction {
            kind: ScrollKind::JumpTo,
            target_id: target_id.to_string(),
        };
    }

    pub fn animate_to_bottom(target_id: &str) -> ScrollInstruction {
        return ScrollInstruction {
            kind: ScrollKind::AnimateToBottom,
            target_id: target_id.to_string(),
        };
    }
}

impl fmt::Display for ScrollInstruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return write!(f, "{}({})", self.kind, self.target_id);
    }
}
