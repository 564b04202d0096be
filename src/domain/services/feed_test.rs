use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use chrono::TimeZone;
use chrono::Utc;
use futures::stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::ConversationFeed;
use super::FeedSettings;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::Conversation;
use crate::domain::models::ConversationState;
use crate::domain::models::Event;
use crate::domain::models::FeedError;
use crate::domain::models::LoadResult;
use crate::domain::models::MessageStream;
use crate::domain::models::RawMessage;
use crate::domain::models::ScrollInstruction;
use crate::domain::models::SenderRole;
use crate::domain::models::SkipReason;
use crate::domain::models::Timestamp;

fn at(minute: i64) -> Timestamp {
    return Utc.timestamp_opt(1_699_956_000 + minute * 60, 0).unwrap();
}

fn raw(id: &str, minute: i64) -> RawMessage {
    return RawMessage::new(id, &format!("text {id}"), SenderRole::Counterpart, at(minute));
}

/// History where `m1..=m{count}` sit at minutes `1..=count`.
fn history(count: i64) -> Vec<RawMessage> {
    return (1..=count)
        .map(|minute| return raw(&format!("m{minute}"), minute))
        .collect();
}

#[derive(Default)]
struct TestBackend {
    history: std::sync::Mutex<Vec<RawMessage>>,
    subscribers: std::sync::Mutex<Vec<mpsc::UnboundedSender<Result<RawMessage>>>>,
    gate: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
    fetch_delay: std::sync::Mutex<Option<Duration>>,
    failures: AtomicUsize,
    fetch_calls: AtomicUsize,
    read_calls: AtomicUsize,
    sent: std::sync::Mutex<Vec<(String, SenderRole)>>,
    fail_writes: std::sync::atomic::AtomicBool,
}

impl TestBackend {
    fn with_history(history: Vec<RawMessage>) -> Arc<TestBackend> {
        let backend = TestBackend::default();
        *backend.history.lock().unwrap() = history;
        return Arc::new(backend);
    }

    /// Holds every fetch until the returned sender fires.
    async fn gate(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().await = Some(rx);
        return tx;
    }

    fn push(&self, raw: RawMessage) {
        for subscriber in self.subscribers.lock().unwrap().iter() {
            let _ = subscriber.send(Ok(raw.clone()));
        }
    }

    fn fetch_calls(&self) -> usize {
        return self.fetch_calls.load(Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for TestBackend {
    fn name(&self) -> BackendName {
        return BackendName::Memory;
    }

    #[allow(clippy::implicit_return)]
    async fn fetch_older_messages(
        &self,
        _conversation_id: &str,
        before: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<RawMessage>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            bail!("connection refused");
        }

        let mut page = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|raw| return before.is_none() || raw.timestamp < before)
            .cloned()
            .collect::<Vec<RawMessage>>();
        page.sort_by(|a, b| return b.timestamp.cmp(&a.timestamp));
        page.truncate(limit);

        return Ok(page);
    }

    #[allow(clippy::implicit_return)]
    async fn subscribe(&self, _conversation_id: &str) -> Result<MessageStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);

        let stream = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            return Some((item, rx));
        });

        return Ok(stream.boxed());
    }

    #[allow(clippy::implicit_return)]
    async fn send_message(
        &self,
        _conversation_id: &str,
        text: &str,
        sender: SenderRole,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("service unavailable");
        }

        self.sent.lock().unwrap().push((text.to_string(), sender));
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn mark_conversation_read(&self, _conversation_id: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("service unavailable");
        }

        self.read_calls.fetch_add(1, Ordering::SeqCst);
        return Ok(());
    }
}

fn settings(page_size: usize) -> FeedSettings {
    return FeedSettings {
        page_size,
        ..FeedSettings::default()
    };
}

fn new_feed(
    backend: &Arc<TestBackend>,
    settings: FeedSettings,
) -> (ConversationFeed, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let feed = ConversationFeed::new(Conversation::new("c1"), backend.clone(), settings, tx);
    return (feed, rx);
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    return events;
}

fn scrolls(events: &[Event]) -> Vec<ScrollInstruction> {
    return events
        .iter()
        .filter_map(|event| match event {
            Event::Scroll(instruction) => return Some(instruction.clone()),
            Event::StateChanged(_) => return None,
        })
        .collect();
}

async fn wait_for_state<F>(feed: &ConversationFeed, mut check: F) -> ConversationState
where
    F: FnMut(&ConversationState) -> bool,
{
    return tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let state = feed.state().await;
            if check(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

async fn wait_for_fetches(backend: &TestBackend, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while backend.fetch_calls() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

mod open {
    use super::*;

    #[tokio::test]
    async fn it_loads_the_newest_page_and_scrolls_to_bottom() -> Result<()> {
        let backend = TestBackend::with_history(history(12));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let feed = ConversationFeed::open(
            Conversation::new("c1"),
            backend.clone(),
            settings(5),
            tx,
        )
        .await?;

        let state = feed.state().await;
        assert_eq!(state.message_ids(), vec!["m8", "m9", "m10", "m11", "m12"]);
        assert!(state.has_more_older);
        assert!(!state.is_loading_older);
        assert_eq!(state.oldest_loaded_timestamp, Some(at(8)));
        assert_eq!(state.pending_anchor_id, None);
        assert_eq!(backend.fetch_calls(), 1);

        let events = drain(&mut rx);
        assert_eq!(
            scrolls(&events),
            vec![ScrollInstruction::animate_to_bottom("m12")]
        );
        assert!(matches!(events.last(), Some(Event::Scroll(_))));

        return Ok(());
    }

    #[tokio::test]
    async fn it_marks_short_conversations_as_exhausted() -> Result<()> {
        let backend = TestBackend::with_history(history(3));
        let (tx, _rx) = mpsc::unbounded_channel();

        let feed =
            ConversationFeed::open(Conversation::new("c1"), backend.clone(), settings(30), tx)
                .await?;

        let state = feed.state().await;
        assert_eq!(state.messages.len(), 3);
        assert!(!state.has_more_older);

        assert_eq!(
            feed.load_older().await,
            LoadResult::Skipped(SkipReason::Exhausted)
        );
        assert_eq!(backend.fetch_calls(), 1);

        return Ok(());
    }

    #[tokio::test]
    async fn it_opens_an_empty_conversation() -> Result<()> {
        let backend = TestBackend::with_history(vec![]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let feed =
            ConversationFeed::open(Conversation::new("c1"), backend.clone(), settings(30), tx)
                .await?;

        let state = feed.state().await;
        assert!(state.messages.is_empty());
        assert!(!state.has_more_older);
        assert!(scrolls(&drain(&mut rx)).is_empty());

        return Ok(());
    }
}

mod load_older {
    use super::*;

    #[tokio::test]
    async fn it_keeps_the_anchor_when_prepending_older_history() -> Result<()> {
        let mut all = (1..=5)
            .map(|minute| return raw(&format!("o{minute}"), minute))
            .collect::<Vec<RawMessage>>();
        all.extend((1..=10).map(|n| return raw(&format!("m{n}"), 10 + n)));

        let backend = TestBackend::with_history(all.clone());
        let (feed, mut rx) = new_feed(&backend, settings(5));
        feed.start_realtime().await?;

        for message in all.iter().skip(5) {
            backend.push(message.clone());
        }
        wait_for_state(&feed, |state| return state.messages.len() == 10).await;
        drain(&mut rx);

        let res = feed.load_older().await;
        assert_eq!(
            res,
            LoadResult::Loaded {
                inserted: 5,
                has_more_older: true
            }
        );

        let state = feed.state().await;
        assert_eq!(state.messages.len(), 15);
        assert_eq!(state.message_ids()[..6], ["o1", "o2", "o3", "o4", "o5", "m1"]);
        assert!(state.has_more_older);
        assert_eq!(state.pending_anchor_id, None);
        assert_eq!(state.oldest_loaded_timestamp, Some(at(1)));

        let events = drain(&mut rx);
        match &events[0] {
            Event::StateChanged(loading) => {
                assert!(loading.is_loading_older);
                assert_eq!(loading.pending_anchor_id, Some("m6".to_string()));
                assert_eq!(loading.messages.len(), 10);
            }
            event => panic!("expected a loading snapshot, got {event:?}"),
        }
        assert_eq!(scrolls(&events), vec![ScrollInstruction::jump_to("m6")]);
        assert!(matches!(events.last(), Some(Event::Scroll(_))));

        return Ok(());
    }

    #[tokio::test]
    async fn it_skips_a_second_call_while_loading() -> Result<()> {
        let backend = TestBackend::with_history(history(40));
        let (feed, _rx) = new_feed(&backend, settings(10));
        let feed = Arc::new(feed);
        let release = backend.gate().await;

        let first = tokio::spawn({
            let feed = feed.clone();
            async move {
                return feed.load_older().await;
            }
        });
        wait_for_fetches(&backend, 1).await;

        assert!(feed.state().await.is_loading_older);
        assert_eq!(
            feed.load_older().await,
            LoadResult::Skipped(SkipReason::AlreadyLoading)
        );

        release.send(()).unwrap();
        assert!(first.await?.is_loaded());
        assert_eq!(backend.fetch_calls(), 1);
        assert!(!feed.state().await.is_loading_older);

        return Ok(());
    }

    #[tokio::test]
    async fn it_pages_backwards_until_exhausted() -> Result<()> {
        let backend = TestBackend::with_history(history(25));
        let (feed, _rx) = new_feed(&backend, settings(10));

        assert!(feed.load_older().await.is_loaded());
        assert!(feed.load_older().await.is_loaded());
        let last = feed.load_older().await;
        assert_eq!(
            last,
            LoadResult::Loaded {
                inserted: 5,
                has_more_older: false
            }
        );

        assert_eq!(
            feed.load_older().await,
            LoadResult::Skipped(SkipReason::Exhausted)
        );
        assert_eq!(backend.fetch_calls(), 3);

        let state = feed.state().await;
        assert_eq!(state.messages.len(), 25);
        assert_eq!(state.messages[0].id, "m1");

        return Ok(());
    }

    #[tokio::test]
    async fn it_reports_failures_and_retries_from_the_same_cursor() -> Result<()> {
        let backend = TestBackend::with_history(history(25));
        let (feed, mut rx) = new_feed(&backend, settings(10));
        assert!(feed.load_older().await.is_loaded());
        drain(&mut rx);

        backend.failures.store(1, Ordering::SeqCst);
        let res = feed.load_older().await;
        match &res {
            LoadResult::Failed(err) => {
                assert!(matches!(err, FeedError::Fetch(_)));
                assert!(err.is_retryable());
            }
            other => panic!("expected a failure, got {other:?}"),
        }

        let state = feed.state().await;
        assert!(!state.is_loading_older);
        assert!(state.has_more_older);
        assert_eq!(state.pending_anchor_id, None);
        assert_eq!(state.oldest_loaded_timestamp, Some(at(16)));
        assert!(state.last_error.unwrap().contains("connection refused"));
        assert!(scrolls(&drain(&mut rx)).is_empty());

        assert!(feed.load_older().await.is_loaded());
        let state = feed.state().await;
        assert_eq!(state.messages.len(), 20);
        assert_eq!(state.messages[0].id, "m6");
        assert_eq!(state.last_error, None);

        return Ok(());
    }

    #[tokio::test]
    async fn it_times_out_slow_fetches() -> Result<()> {
        let backend = TestBackend::with_history(history(5));
        *backend.fetch_delay.lock().unwrap() = Some(Duration::from_secs(5));
        let (feed, _rx) = new_feed(
            &backend,
            FeedSettings {
                fetch_timeout: Duration::from_millis(20),
                ..settings(10)
            },
        );

        let res = feed.load_older().await;
        assert_eq!(
            res,
            LoadResult::Failed(FeedError::FetchTimeout(Duration::from_millis(20)))
        );

        let state = feed.state().await;
        assert!(!state.is_loading_older);
        assert!(state.has_more_older);
        assert!(state.messages.is_empty());

        return Ok(());
    }

    #[tokio::test]
    async fn it_discards_responses_that_arrive_after_close() -> Result<()> {
        let backend = TestBackend::with_history(history(5));
        let (feed, mut rx) = new_feed(&backend, settings(10));
        let feed = Arc::new(feed);
        let release = backend.gate().await;

        let pending = tokio::spawn({
            let feed = feed.clone();
            async move {
                return feed.load_older().await;
            }
        });
        wait_for_fetches(&backend, 1).await;
        drain(&mut rx);

        feed.close().await;
        let _ = release.send(());

        assert_eq!(pending.await?, LoadResult::Cancelled);
        assert!(feed.state().await.messages.is_empty());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(feed.load_older().await, LoadResult::Cancelled);

        return Ok(());
    }
}

mod realtime {
    use super::*;

    #[tokio::test]
    async fn it_scrolls_to_bottom_on_new_messages() -> Result<()> {
        let backend = TestBackend::with_history(history(3));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed =
            ConversationFeed::open(Conversation::new("c1"), backend.clone(), settings(30), tx)
                .await?;
        drain(&mut rx);

        backend.push(raw("m4", 4));
        wait_for_state(&feed, |state| return state.messages.len() == 4).await;

        let events = drain(&mut rx);
        assert_eq!(
            scrolls(&events),
            vec![ScrollInstruction::animate_to_bottom("m4")]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_absorbs_duplicate_deliveries() -> Result<()> {
        let backend = TestBackend::with_history(history(3));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed =
            ConversationFeed::open(Conversation::new("c1"), backend.clone(), settings(30), tx)
                .await?;
        drain(&mut rx);

        backend.push(raw("m3", 3));
        backend.push(raw("m4", 4));
        backend.push(raw("m4", 4));
        let state = wait_for_state(&feed, |state| return state.messages.len() == 4).await;
        assert_eq!(state.message_ids(), vec!["m1", "m2", "m3", "m4"]);

        return Ok(());
    }

    #[tokio::test]
    async fn it_defers_bottom_scroll_while_restoring_history() -> Result<()> {
        let backend = TestBackend::with_history(history(20));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed =
            ConversationFeed::open(Conversation::new("c1"), backend.clone(), settings(10), tx)
                .await?;
        let feed = Arc::new(feed);
        drain(&mut rx);

        let release = backend.gate().await;
        let pending = tokio::spawn({
            let feed = feed.clone();
            async move {
                return feed.load_older().await;
            }
        });
        wait_for_fetches(&backend, 2).await;

        backend.push(raw("m21", 21));
        wait_for_state(&feed, |state| return state.messages.len() == 11).await;
        let during = drain(&mut rx);
        assert!(scrolls(&during).is_empty());

        release.send(()).unwrap();
        assert!(pending.await?.is_loaded());

        let after = drain(&mut rx);
        assert_eq!(scrolls(&after), vec![ScrollInstruction::jump_to("m16")]);
        assert_eq!(feed.state().await.messages.len(), 21);

        feed.report_viewport(true).await;
        assert_eq!(
            scrolls(&drain(&mut rx)),
            vec![ScrollInstruction::animate_to_bottom("m21")]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_holds_the_deferred_scroll_until_the_view_returns_to_bottom() -> Result<()> {
        let backend = TestBackend::with_history(history(20));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed =
            ConversationFeed::open(Conversation::new("c1"), backend.clone(), settings(10), tx)
                .await?;
        let feed = Arc::new(feed);
        feed.report_viewport(false).await;
        drain(&mut rx);

        let release = backend.gate().await;
        let pending = tokio::spawn({
            let feed = feed.clone();
            async move {
                return feed.load_older().await;
            }
        });
        wait_for_fetches(&backend, 2).await;
        backend.push(raw("m21", 21));
        wait_for_state(&feed, |state| return state.messages.len() == 11).await;
        release.send(()).unwrap();
        pending.await?;

        assert_eq!(
            scrolls(&drain(&mut rx)),
            vec![ScrollInstruction::jump_to("m16")]
        );

        feed.report_viewport(true).await;
        assert_eq!(
            scrolls(&drain(&mut rx)),
            vec![ScrollInstruction::animate_to_bottom("m21")]
        );

        return Ok(());
    }

    #[tokio::test]
    async fn it_stops_listening_after_close() -> Result<()> {
        let backend = TestBackend::with_history(history(3));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed =
            ConversationFeed::open(Conversation::new("c1"), backend.clone(), settings(30), tx)
                .await?;

        feed.close().await;
        assert!(feed.is_closed());
        drain(&mut rx);

        backend.push(raw("m4", 4));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(feed.state().await.messages.len(), 3);
        assert!(drain(&mut rx).is_empty());

        return Ok(());
    }
}

mod send_message {
    use super::*;

    #[tokio::test]
    async fn it_rejects_blank_text() {
        let backend = TestBackend::with_history(vec![]);
        let (feed, _rx) = new_feed(&backend, settings(30));

        assert_eq!(feed.send_message("").await, Err(FeedError::EmptyMessage));
        assert_eq!(feed.send_message("  \n\t").await, Err(FeedError::EmptyMessage));
        assert!(backend.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn it_sends_trimmed_text_as_the_configured_role() {
        let backend = TestBackend::with_history(vec![]);
        let (feed, _rx) = new_feed(
            &backend,
            FeedSettings {
                role: SenderRole::Counterpart,
                ..settings(30)
            },
        );

        assert_eq!(feed.send_message("  See you Thursday  ").await, Ok(()));
        assert_eq!(
            *backend.sent.lock().unwrap(),
            vec![("See you Thursday".to_string(), SenderRole::Counterpart)]
        );
        assert!(feed.state().await.messages.is_empty());
    }

    #[tokio::test]
    async fn it_surfaces_backend_failures() {
        let backend = TestBackend::with_history(vec![]);
        backend.fail_writes.store(true, Ordering::SeqCst);
        let (feed, _rx) = new_feed(&backend, settings(30));

        let res = feed.send_message("hello").await;
        assert_eq!(
            res,
            Err(FeedError::Send("service unavailable".to_string()))
        );
        assert_eq!(
            feed.state().await.last_error,
            Some("sending message failed: service unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn it_refuses_after_close() {
        let backend = TestBackend::with_history(vec![]);
        let (feed, _rx) = new_feed(&backend, settings(30));
        feed.close().await;

        assert_eq!(feed.send_message("hello").await, Err(FeedError::Closed));
    }
}

mod mark_as_read {
    use super::*;

    fn unread_feed(
        backend: &Arc<TestBackend>,
        unread_count: u32,
    ) -> (ConversationFeed, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conversation = Conversation {
            unread_count,
            ..Conversation::new("c1")
        };
        let feed = ConversationFeed::new(conversation, backend.clone(), settings(30), tx);
        return (feed, rx);
    }

    #[tokio::test]
    async fn it_skips_the_backend_when_nothing_is_unread() {
        let backend = TestBackend::with_history(vec![]);
        let (feed, _rx) = unread_feed(&backend, 0);

        assert_eq!(feed.mark_as_read().await, Ok(false));
        assert_eq!(backend.read_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn it_marks_unread_conversations_once() {
        let backend = TestBackend::with_history(vec![]);
        let (feed, mut rx) = unread_feed(&backend, 3);
        assert_eq!(feed.state().await.unread_count, 3);

        assert_eq!(feed.mark_as_read().await, Ok(true));
        assert_eq!(feed.mark_as_read().await, Ok(false));
        assert_eq!(backend.read_calls.load(Ordering::SeqCst), 1);
        assert_eq!(feed.state().await.unread_count, 0);

        match drain(&mut rx).as_slice() {
            [Event::StateChanged(state)] => assert_eq!(state.unread_count, 0),
            events => panic!("unexpected events {events:?}"),
        }
    }

    #[tokio::test]
    async fn it_keeps_the_count_when_the_backend_fails() {
        let backend = TestBackend::with_history(vec![]);
        backend.fail_writes.store(true, Ordering::SeqCst);
        let (feed, _rx) = unread_feed(&backend, 2);

        let res = feed.mark_as_read().await;
        assert!(matches!(res, Err(FeedError::MarkRead(_))));
        assert_eq!(feed.state().await.unread_count, 2);
    }
}

#[test]
fn it_defaults_settings() {
    let settings = FeedSettings::default();
    assert_eq!(settings.page_size, 30);
    assert_eq!(settings.fetch_timeout, Duration::from_secs(10));
    assert_eq!(settings.realtime_batch_size, 16);
    assert_eq!(settings.role, SenderRole::Trainer);
}
