#[cfg(test)]
#[path = "pagination_test.rs"]
mod tests;

use super::MessageStore;
use crate::domain::models::RawMessage;
use crate::domain::models::SkipReason;
use crate::domain::models::Timestamp;

pub const DEFAULT_PAGE_SIZE: usize = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// `None` asks for the newest page, which is how the initial load happens.
    pub before: Option<Timestamp>,
    pub limit: usize,
}

/// Bookkeeping for "load older" requests: the cursor, whether history remains,
/// and the guard against overlapping fetches.
pub struct PaginationController {
    page_size: usize,
    has_more_older: bool,
    oldest_loaded_timestamp: Option<Timestamp>,
    is_loading_older: bool,
}

impl Default for PaginationController {
    fn default() -> PaginationController {
        return PaginationController::new(DEFAULT_PAGE_SIZE);
    }
}

impl PaginationController {
    pub fn new(page_size: usize) -> PaginationController {
        return PaginationController {
            page_size: page_size.max(1),
            has_more_older: true,
            oldest_loaded_timestamp: None,
            is_loading_older: false,
        };
    }

    pub fn page_size(&self) -> usize {
        return self.page_size;
    }

    pub fn has_more_older(&self) -> bool {
        return self.has_more_older;
    }

    pub fn oldest_loaded_timestamp(&self) -> Option<Timestamp> {
        return self.oldest_loaded_timestamp;
    }

    pub fn is_loading_older(&self) -> bool {
        return self.is_loading_older;
    }

    /// Claims the loading guard and returns the request to issue, or why no
    /// request should be made.
    pub fn begin(&mut self, store: &MessageStore) -> Result<PageRequest, SkipReason> {
        if self.is_loading_older {
            return Err(SkipReason::AlreadyLoading);
        }

        if !self.has_more_older {
            return Err(SkipReason::Exhausted);
        }

        self.is_loading_older = true;

        return Ok(PageRequest {
            before: self.oldest_loaded_timestamp.or(store.oldest_timestamp()),
            limit: self.page_size,
        });
    }

    pub fn complete(&mut self, batch: &[RawMessage]) {
        let batch_oldest = batch.iter().filter_map(|raw| return raw.timestamp).min();
        self.oldest_loaded_timestamp = match (self.oldest_loaded_timestamp, batch_oldest) {
            (Some(current), Some(oldest)) => Some(current.min(oldest)),
            (current, oldest) => oldest.or(current),
        };

        self.has_more_older = batch.len() >= self.page_size;
        if self.has_more_older && batch_oldest.is_none() {
            // The cursor cannot move, so asking again would return this page.
            tracing::warn!(
                count = batch.len(),
                "Older page has no usable timestamps, treating history as exhausted"
            );
            self.has_more_older = false;
        }
        self.is_loading_older = false;
    }

    /// Releases the guard and leaves the cursor alone so a retry resumes from
    /// the same point.
    pub fn fail(&mut self) {
        self.is_loading_older = false;
    }
}
