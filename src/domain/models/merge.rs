#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum MergeOrigin {
    /// Newly created messages pushed by the subscription.
    Realtime,
    /// A page of history strictly older than the cursor.
    PageOlder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum MergeKind {
    /// Realtime messages that all sort at or after the previous newest one.
    Append,
    /// A history page, wherever its messages landed.
    Prepend,
    /// Realtime messages where at least one sorted before the previous newest
    /// one, as happens with late at-least-once redelivery.
    Interleave,
    /// Nothing new survived validation and dedup.
    Noop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeResult {
    pub kind: MergeKind,
    pub origin: MergeOrigin,
    pub previous_count: usize,
    pub new_count: usize,
    pub inserted_ids: Vec<String>,
    pub rejected: usize,
}

impl MergeResult {
    pub fn noop(origin: MergeOrigin, count: usize, rejected: usize) -> MergeResult {
        return MergeResult {
            kind: MergeKind::Noop,
            origin,
            previous_count: count,
            new_count: count,
            inserted_ids: vec![],
            rejected,
        };
    }

    pub fn grew(&self) -> bool {
        return self.new_count > self.previous_count;
    }
}
