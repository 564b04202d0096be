#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::MessageStore;
use super::PaginationController;
use super::RealtimeFeed;
use super::ScrollAnchorCoordinator;
use super::DEFAULT_PAGE_SIZE;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Conversation;
use crate::domain::models::ConversationState;
use crate::domain::models::Event;
use crate::domain::models::FeedError;
use crate::domain::models::LoadResult;
use crate::domain::models::MergeOrigin;
use crate::domain::models::RawMessage;
use crate::domain::models::ScrollInstruction;
use crate::domain::models::SenderRole;
use crate::domain::models::SharedBackend;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REALTIME_BATCH_SIZE: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedSettings {
    pub page_size: usize,
    pub fetch_timeout: Duration,
    pub realtime_batch_size: usize,
    /// The side of the conversation this feed sends messages as.
    pub role: SenderRole,
}

impl Default for FeedSettings {
    fn default() -> FeedSettings {
        return FeedSettings {
            page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            realtime_batch_size: DEFAULT_REALTIME_BATCH_SIZE,
            role: SenderRole::Trainer,
        };
    }
}

impl FeedSettings {
    pub fn from_config() -> Result<FeedSettings> {
        let role_name = Config::get(ConfigKey::Role);
        let role = match SenderRole::parse(&role_name) {
            Some(role) => role,
            None => bail!(format!("Unknown role {role_name}")),
        };

        return Ok(FeedSettings {
            page_size: Config::get(ConfigKey::PageSize).parse::<usize>()?,
            fetch_timeout: Duration::from_millis(
                Config::get(ConfigKey::FetchTimeout).parse::<u64>()?,
            ),
            realtime_batch_size: Config::get(ConfigKey::RealtimeBatchSize).parse::<usize>()?,
            role,
        });
    }
}

struct FeedState {
    store: MessageStore,
    pagination: PaginationController,
    anchor: ScrollAnchorCoordinator,
    unread_count: u32,
    last_error: Option<String>,
    closed: bool,
}

impl FeedState {
    fn snapshot(&self) -> ConversationState {
        return ConversationState {
            messages: self.store.messages().to_vec(),
            has_more_older: self.pagination.has_more_older(),
            oldest_loaded_timestamp: self.pagination.oldest_loaded_timestamp(),
            is_loading_older: self.pagination.is_loading_older(),
            pending_anchor_id: self.anchor.pending_anchor_id().map(|id| return id.to_string()),
            unread_count: self.unread_count,
            last_error: self.last_error.clone(),
        };
    }
}

struct FeedCore {
    conversation: Conversation,
    backend: SharedBackend,
    settings: FeedSettings,
    state: Mutex<FeedState>,
    tx: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
}

impl FeedCore {
    fn publish(&self, state: &FeedState, instructions: Vec<ScrollInstruction>) {
        let events = std::iter::once(Event::StateChanged(state.snapshot()))
            .chain(instructions.into_iter().map(Event::Scroll));

        for event in events {
            if self.tx.send(event).is_err() {
                tracing::debug!("Event receiver dropped, skipping publish");
                return;
            }
        }
    }

    async fn apply_realtime(&self, batch: Vec<RawMessage>) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.closed {
            return;
        }

        let result = state.store.merge(batch, MergeOrigin::Realtime);
        if !result.grew() {
            return;
        }

        let instructions = state.anchor.on_merge(&result, state.store.messages());
        self.publish(state, instructions);
    }
}

/// Engine facade for one open conversation. Every merge goes through its
/// state lock, and the view hears about changes through the event channel.
pub struct ConversationFeed {
    core: Arc<FeedCore>,
    realtime: Mutex<Option<RealtimeFeed>>,
}

impl ConversationFeed {
    /// Builds the feed without touching the backend.
    pub fn new(
        conversation: Conversation,
        backend: SharedBackend,
        settings: FeedSettings,
        tx: mpsc::UnboundedSender<Event>,
    ) -> ConversationFeed {
        let state = FeedState {
            store: MessageStore::default(),
            pagination: PaginationController::new(settings.page_size),
            anchor: ScrollAnchorCoordinator::default(),
            unread_count: conversation.unread_count,
            last_error: None,
            closed: false,
        };

        return ConversationFeed {
            core: Arc::new(FeedCore {
                conversation,
                backend,
                settings,
                state: Mutex::new(state),
                tx,
                cancel: CancellationToken::new(),
            }),
            realtime: Mutex::new(None),
        };
    }

    /// Subscribes to realtime first so nothing created during the initial
    /// load is missed, then loads the newest page.
    pub async fn open(
        conversation: Conversation,
        backend: SharedBackend,
        settings: FeedSettings,
        tx: mpsc::UnboundedSender<Event>,
    ) -> Result<ConversationFeed> {
        let feed = ConversationFeed::new(conversation, backend, settings, tx);
        feed.start_realtime().await?;

        let res = feed.load_older().await;
        tracing::debug!(
            conversation_id = %feed.conversation().id,
            result = ?res,
            "Initial load finished"
        );

        return Ok(feed);
    }

    pub fn conversation(&self) -> &Conversation {
        return &self.core.conversation;
    }

    pub fn settings(&self) -> &FeedSettings {
        return &self.core.settings;
    }

    pub fn is_closed(&self) -> bool {
        return self.core.cancel.is_cancelled();
    }

    pub async fn state(&self) -> ConversationState {
        return self.core.state.lock().await.snapshot();
    }

    #[allow(clippy::implicit_return)]
    pub async fn start_realtime(&self) -> Result<()> {
        let mut slot = self.realtime.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        if self.is_closed() {
            bail!(FeedError::Closed);
        }

        let stream = self
            .core
            .backend
            .subscribe(&self.core.conversation.id)
            .await?;

        let core = Arc::downgrade(&self.core);
        let realtime = RealtimeFeed::start(
            stream,
            self.core.settings.realtime_batch_size,
            self.core.cancel.child_token(),
            move |batch| {
                let core = core.clone();
                return async move {
                    if let Some(core) = core.upgrade() {
                        core.apply_realtime(batch).await;
                    }
                };
            },
        );

        tracing::debug!(
            conversation_id = %self.core.conversation.id,
            "Started realtime feed"
        );
        *slot = Some(realtime);

        return Ok(());
    }

    /// Fetches the next page of older history. Never returns an error: every
    /// outcome is a `LoadResult`.
    pub async fn load_older(&self) -> LoadResult {
        let core = &self.core;

        let request = {
            let mut guard = core.state.lock().await;
            let state = &mut *guard;
            if state.closed {
                return LoadResult::Cancelled;
            }

            let request = match state.pagination.begin(&state.store) {
                Ok(request) => request,
                Err(reason) => {
                    tracing::debug!(reason = %reason, "Skipping older page fetch");
                    return LoadResult::Skipped(reason);
                }
            };

            // The anchor has to be picked while the old layout is still on screen.
            state.anchor.capture_anchor(state.store.messages());
            core.publish(state, vec![]);

            request
        };

        tracing::debug!(
            conversation_id = %core.conversation.id,
            before = ?request.before,
            limit = request.limit,
            "Fetching older messages"
        );

        let fetch = tokio::time::timeout(
            core.settings.fetch_timeout,
            core.backend.fetch_older_messages(
                &core.conversation.id,
                request.before,
                request.limit,
            ),
        );

        let outcome = tokio::select! {
            biased;
            _ = core.cancel.cancelled() => None,
            res = fetch => Some(res),
        };

        let mut guard = core.state.lock().await;
        let state = &mut *guard;

        let outcome = match outcome {
            Some(outcome) if !state.closed => outcome,
            _ => {
                tracing::debug!("Discarding older page for closed feed");
                state.pagination.fail();
                state.anchor.release_anchor(state.store.messages());
                return LoadResult::Cancelled;
            }
        };

        let err = match outcome {
            Ok(Ok(batch)) => {
                state.pagination.complete(&batch);
                let result = state.store.merge(batch, MergeOrigin::PageOlder);

                let mut instructions = state.anchor.on_merge(&result, state.store.messages());
                instructions.extend(state.anchor.release_anchor(state.store.messages()));
                state.last_error = None;
                core.publish(state, instructions);

                return LoadResult::Loaded {
                    inserted: result.inserted_ids.len(),
                    has_more_older: state.pagination.has_more_older(),
                };
            }
            Ok(Err(err)) => FeedError::Fetch(err.to_string()),
            Err(_) => FeedError::FetchTimeout(core.settings.fetch_timeout),
        };

        tracing::warn!(error = %err, "Fetching older messages failed");
        state.pagination.fail();
        state.last_error = Some(err.to_string());
        let instructions = state.anchor.release_anchor(state.store.messages());
        core.publish(state, instructions);

        return LoadResult::Failed(err);
    }

    /// Sends `text` as the configured role. The stored message shows up
    /// through the realtime stream, not here.
    pub async fn send_message(&self, text: &str) -> Result<(), FeedError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FeedError::EmptyMessage);
        }

        if self.is_closed() {
            return Err(FeedError::Closed);
        }

        let res = self
            .core
            .backend
            .send_message(&self.core.conversation.id, text, self.core.settings.role)
            .await;

        if let Err(err) = res {
            tracing::error!(error = ?err, "Failed to send message");
            let err = FeedError::Send(err.to_string());
            self.record_error(&err).await;
            return Err(err);
        }

        return Ok(());
    }

    /// Returns whether the backend was called. Nothing happens when there is
    /// nothing unread.
    pub async fn mark_as_read(&self) -> Result<bool, FeedError> {
        {
            let state = self.core.state.lock().await;
            if state.closed {
                return Err(FeedError::Closed);
            }

            if state.unread_count == 0 {
                return Ok(false);
            }
        }

        let res = self
            .core
            .backend
            .mark_conversation_read(&self.core.conversation.id)
            .await;

        if let Err(err) = res {
            tracing::error!(error = ?err, "Failed to mark conversation as read");
            let err = FeedError::MarkRead(err.to_string());
            self.record_error(&err).await;
            return Err(err);
        }

        let mut guard = self.core.state.lock().await;
        let state = &mut *guard;
        state.unread_count = 0;
        self.core.publish(state, vec![]);

        return Ok(true);
    }

    /// Tells the feed whether the view currently shows the newest message. A
    /// deferred bottom scroll is only released while this is true.
    pub async fn report_viewport(&self, near_bottom: bool) {
        let mut guard = self.core.state.lock().await;
        let state = &mut *guard;
        if state.closed {
            return;
        }

        let instructions = state.anchor.report_viewport(near_bottom, state.store.messages());
        if !instructions.is_empty() {
            self.core.publish(state, instructions);
        }
    }

    pub async fn close(&self) {
        {
            let mut state = self.core.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
        }

        self.core.cancel.cancel();
        if let Some(realtime) = self.realtime.lock().await.take() {
            realtime.stop();
        }

        tracing::debug!(
            conversation_id = %self.core.conversation.id,
            "Closed conversation feed"
        );
    }

    async fn record_error(&self, err: &FeedError) {
        let mut guard = self.core.state.lock().await;
        let state = &mut *guard;
        if state.closed {
            return;
        }

        state.last_error = Some(err.to_string());
        self.core.publish(state, vec![]);
    }
}

impl Drop for ConversationFeed {
    fn drop(&mut self) {
        self.core.cancel.cancel();
    }
}
