use super::FeedError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SkipReason {
    /// A page fetch is already outstanding.
    AlreadyLoading,
    /// A previous page came back short, so there is no older history.
    Exhausted,
}

/// Outcome of a `load_older` call. Every path resolves to one of these; none
/// of them panic or bubble an error out of the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadResult {
    Loaded {
        inserted: usize,
        has_more_older: bool,
    },
    Skipped(SkipReason),
    Failed(FeedError),
    /// The conversation was closed while the fetch was in flight; the response
    /// was discarded.
    Cancelled,
}

impl LoadResult {
    pub fn is_loaded(&self) -> bool {
        return matches!(self, LoadResult::Loaded { .. });
    }
}
