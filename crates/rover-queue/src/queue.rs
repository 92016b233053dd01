//! Durable, bounded, batching event queue.
//!
//! Events are enriched with a context snapshot on entry, appended to an
//! in-memory queue mirrored to a [`QueueStorage`], and delivered in batches
//! through an [`EventsClient`]. A flush happens when the queue reaches
//! `flush_at` entries or `flush_interval` has passed since the last attempt.
//!
//! At most one batch is in flight per queue. The in-flight batch is always a
//! prefix of the queue: new events go to the back and capacity eviction only
//! removes entries behind that prefix, so a failed batch is simply released
//! in place and keeps its original order.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use async_trait::async_trait;
use rover_core::{
    AppLifecycle, ClientError, ConfigError, Context, ContextProvider, Event, EventInfo, EventSink,
    EventsClient, Notifier, QueueConfig, QueueEntry, QueueStorage, SubmitResponse,
};
use tokio::{sync::watch, task::JoinHandle, time::Instant};

/// Why a flush submitted nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No queued events.
    Empty,
    /// Another batch is still awaiting its result.
    InFlight,
    /// Neither the size nor the time trigger has fired.
    NotDue,
}

/// Result of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Skipped(SkipReason),
    /// The batch of this many events was acknowledged.
    Delivered(usize),
    /// The batch of this many events failed and was requeued.
    Failed(usize),
}

struct QueueState {
    entries: VecDeque<QueueEntry>,
    /// Length of the in-flight prefix of `entries`.
    in_flight: usize,
    last_flush: Instant,
    /// Bumped on every mutation that must reach storage.
    revision: u64,
    restored: bool,
}

impl QueueState {
    /// Copy of the queue for storage. `None` until restored, since storage
    /// still holds the previous process's queue.
    fn snapshot(&mut self) -> Option<Snapshot> {
        if !self.restored {
            return None;
        }
        self.revision += 1;
        Some(Snapshot {
            revision: self.revision,
            entries: self.entries.iter().cloned().collect(),
        })
    }

    /// Drop the oldest entry not in flight. Returns false if every entry is
    /// in flight.
    fn evict_oldest(&mut self) -> bool {
        let index = self.in_flight;
        match self.entries.remove(index) {
            Some(dropped) => {
                tracing::warn!(
                    event_id = %dropped.event.id,
                    name = %dropped.event.name,
                    "Event queue at capacity, discarding oldest event"
                );
                true
            }
            None => false,
        }
    }
}

struct Snapshot {
    revision: u64,
    entries: Vec<QueueEntry>,
}

struct Inner {
    config: QueueConfig,
    client: Arc<dyn EventsClient>,
    storage: Arc<dyn QueueStorage>,
    context_provider: RwLock<Option<Arc<dyn ContextProvider>>>,
    state: Mutex<QueueState>,
    /// Revision of the last snapshot handed to storage; serializes saves.
    persisted: tokio::sync::Mutex<u64>,
    notifier: Notifier,
    timer_running: watch::Sender<bool>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Batching event queue. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<Inner>,
}

impl EventQueue {
    /// Create a queue with its own notifier.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn new(
        config: QueueConfig,
        client: Arc<dyn EventsClient>,
        storage: Arc<dyn QueueStorage>,
    ) -> Result<Self, ConfigError> {
        Self::with_notifier(config, client, storage, Notifier::new())
    }

    /// Create a queue publishing to an existing notifier.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn with_notifier(
        config: QueueConfig,
        client: Arc<dyn EventsClient>,
        storage: Arc<dyn QueueStorage>,
        notifier: Notifier,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (timer_running, _) = watch::channel(true);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                storage,
                context_provider: RwLock::new(None),
                state: Mutex::new(QueueState {
                    entries: VecDeque::new(),
                    in_flight: 0,
                    last_flush: Instant::now(),
                    revision: 0,
                    restored: false,
                }),
                persisted: tokio::sync::Mutex::new(0),
                notifier,
                timer_running,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Set the source of context snapshots for subsequent events.
    pub fn set_context_provider(&self, provider: Arc<dyn ContextProvider>) {
        let mut slot = self
            .inner
            .context_provider
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            tracing::debug!("Replacing event queue context provider");
        }
        *slot = Some(provider);
    }

    fn context_snapshot(&self) -> Context {
        let provider = self
            .inner
            .context_provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        provider.map_or_else(
            || {
                tracing::debug!("No context provider set, event will have empty context");
                Context::default()
            },
            |p| p.context(),
        )
    }

    /// Number of queued events, in flight included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events currently being submitted.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.state().in_flight
    }

    /// Copy of the queued entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.inner.state().entries.iter().cloned().collect()
    }

    /// Load entries persisted by a previous process.
    ///
    /// Nothing is written to storage before this is called. Restored entries
    /// are placed ahead of anything queued since startup.
    /// Only the first call loads; later calls return 0. A load failure is
    /// logged and the queue continues empty. Returns the number of entries
    /// loaded.
    pub async fn restore(&self) -> usize {
        if self.inner.state().restored {
            tracing::warn!("Event queue already restored");
            return 0;
        }

        let loaded = match self.inner.storage.load().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "Failed to restore event queue");
                Vec::new()
            }
        };
        let count = loaded.len();

        let snapshot = {
            let mut state = self.inner.state();
            if state.restored {
                return 0;
            }
            state.restored = true;

            let position = state.in_flight;
            let pending = state.entries.split_off(position);
            let had_pending = !pending.is_empty();
            state.entries.extend(loaded);
            state.entries.extend(pending);

            let mut dropped = 0;
            while state.entries.len() > self.inner.config.max_queue_size && state.evict_oldest() {
                dropped += 1;
            }
            if dropped > 0 {
                tracing::warn!(dropped, "Restored queue exceeded capacity");
            }

            (had_pending || dropped > 0)
                .then(|| state.snapshot())
                .flatten()
        };

        self.persist(snapshot).await;
        tracing::info!(count, "Restored event queue");
        count
    }

    /// Enrich and enqueue an event.
    ///
    /// Evicts the oldest waiting event when the queue is full, persists the
    /// queue, and starts a flush in the background once `flush_at` is
    /// reached. Never fails: persistence errors are logged and the event
    /// stays queued in memory.
    pub async fn add_event(&self, info: EventInfo) {
        let event = Event::new(info, self.context_snapshot());

        let (snapshot, flush_due) = {
            let mut state = self.inner.state();
            if state.entries.len() >= self.inner.config.max_queue_size && !state.evict_oldest() {
                tracing::warn!(
                    name = %event.name,
                    "Event queue at capacity with every entry in flight, discarding event"
                );
                return;
            }

            tracing::debug!(event_id = %event.id, name = %event.name, "Event added to queue");
            state.entries.push_back(QueueEntry::new(event));
            let flush_due =
                state.in_flight == 0 && state.entries.len() >= self.inner.config.flush_at;
            (state.snapshot(), flush_due)
        };

        self.persist(snapshot).await;

        if flush_due {
            tracing::debug!("Event queue threshold reached, flushing events");
            self.spawn_flush();
        }
    }

    /// Flush if the size or time trigger has fired.
    pub async fn flush(&self) -> FlushOutcome {
        self.flush_inner(false).await
    }

    /// Flush regardless of the triggers, e.g. when the app backgrounds.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.flush_inner(true).await
    }

    fn spawn_flush(&self) -> JoinHandle<FlushOutcome> {
        let queue = self.clone();
        tokio::spawn(async move { queue.flush().await })
    }

    async fn flush_inner(&self, force: bool) -> FlushOutcome {
        let batch = match self.begin_flush(force) {
            Ok(batch) => batch,
            Err(reason) => {
                tracing::debug!(?reason, "Skipping flush");
                return FlushOutcome::Skipped(reason);
            }
        };

        tracing::debug!(count = batch.len(), "Submitting events");
        let result = self.inner.client.submit(&batch).await;
        self.finish_flush(batch, result).await
    }

    /// Claim the oldest entries as the in-flight batch.
    fn begin_flush(&self, force: bool) -> Result<Vec<Event>, SkipReason> {
        let config = &self.inner.config;
        let mut state = self.inner.state();

        if state.in_flight > 0 {
            return Err(SkipReason::InFlight);
        }
        if state.entries.is_empty() {
            return Err(SkipReason::Empty);
        }

        let now = Instant::now();
        let due = force
            || state.entries.len() >= config.flush_at
            || now.duration_since(state.last_flush) >= config.flush_interval();
        if !due {
            return Err(SkipReason::NotDue);
        }

        let count = state.entries.len().min(config.max_batch_size);
        state.in_flight = count;
        state.last_flush = now;
        Ok(state
            .entries
            .iter()
            .take(count)
            .map(|entry| entry.event.clone())
            .collect())
    }

    async fn finish_flush(
        &self,
        batch: Vec<Event>,
        result: Result<SubmitResponse, ClientError>,
    ) -> FlushOutcome {
        let count = batch.len();

        match result {
            Ok(response) => {
                let (snapshot, more) = {
                    let mut state = self.inner.state();
                    let in_flight = std::mem::take(&mut state.in_flight);
                    state.entries.drain(..in_flight);
                    let more = state.entries.len() >= self.inner.config.flush_at;
                    (state.snapshot(), more)
                };
                tracing::info!(count, "Successfully delivered events");
                self.persist(snapshot).await;

                for event in batch {
                    self.inner.notifier.post_event(event);
                }
                self.inner.notifier.receive_regions(response.regions);
                self.inner.notifier.receive_messages(response.messages);

                if more {
                    self.spawn_flush();
                }
                FlushOutcome::Delivered(count)
            }
            Err(e) => {
                let snapshot = {
                    let mut state = self.inner.state();
                    let in_flight = std::mem::take(&mut state.in_flight);
                    for entry in state.entries.iter_mut().take(in_flight) {
                        entry.attempt_count = entry.attempt_count.saturating_add(1);
                    }
                    state.snapshot()
                };
                tracing::warn!(count, error = %e, "Failed to deliver events, will retry");
                self.persist(snapshot).await;
                FlushOutcome::Failed(count)
            }
        }
    }

    /// Write a snapshot unless a newer one already reached storage.
    async fn persist(&self, snapshot: Option<Snapshot>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        let mut persisted = self.inner.persisted.lock().await;
        if snapshot.revision <= *persisted {
            return;
        }

        // Only a completed save counts; a save cut short by cancellation
        // leaves the revision open for the next writer.
        match self.inner.storage.save(&snapshot.entries).await {
            Ok(()) => *persisted = snapshot.revision,
            Err(e) => tracing::error!(
                error = %e,
                entries = snapshot.entries.len(),
                "Failed to persist event queue"
            ),
        }
    }

    /// `None` if the deadline lies beyond what `Instant` can represent.
    fn next_timer_deadline(&self) -> Option<Instant> {
        self.inner
            .state()
            .last_flush
            .checked_add(self.inner.config.flush_interval())
    }

    /// Count a timer tick that found nothing to send as an attempt.
    fn mark_timer_attempt(&self) {
        self.inner.state().last_flush = Instant::now();
    }

    /// Spawn the interval flush timer.
    ///
    /// The task sleeps until `flush_interval` after the last flush attempt,
    /// flushes, and repeats. It idles while the app is inactive and exits
    /// once every handle to the queue is dropped.
    pub fn spawn_flush_timer(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let mut running = self.inner.timer_running.subscribe();

        tokio::spawn(async move {
            loop {
                while !*running.borrow_and_update() {
                    if running.changed().await.is_err() {
                        return;
                    }
                }

                let Some(deadline) = weak
                    .upgrade()
                    .map(|inner| Self { inner }.next_timer_deadline())
                else {
                    return;
                };

                let due = async {
                    match deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    () = due => {}
                    changed = running.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue;
                    }
                }

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let queue = Self { inner };
                if queue.flush().await == FlushOutcome::Skipped(SkipReason::Empty) {
                    queue.mark_timer_attempt();
                }
            }
        })
    }

    /// React to an app lifecycle transition.
    pub async fn handle_lifecycle(&self, transition: AppLifecycle) {
        match transition {
            AppLifecycle::DidBecomeActive => {
                self.inner.timer_running.send_replace(true);
            }
            AppLifecycle::WillResignActive => {
                self.inner.timer_running.send_replace(false);
            }
            AppLifecycle::DidEnterBackground => {
                self.flush_now().await;
            }
        }
    }
}

#[async_trait]
impl EventSink for EventQueue {
    async fn add_event(&self, info: EventInfo) {
        Self::add_event(self, info).await;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use rover_core::{
        Attributes, ContextRegistry, EventId, Message, MessageAction, Notification, Region,
        StorageError, context::DebugContextManager,
    };
    use tokio::sync::Notify;

    use super::*;
    use crate::storage::MemoryStorage;

    #[derive(Default)]
    struct MockClient {
        batches: Mutex<Vec<Vec<Event>>>,
        failures_remaining: AtomicUsize,
        response: Mutex<SubmitResponse>,
    }

    impl MockClient {
        fn failing(times: usize) -> Self {
            let client = Self::default();
            client.failures_remaining.store(times, Ordering::SeqCst);
            client
        }

        fn batches(&self) -> Vec<Vec<String>> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .map(|b| b.iter().map(|e| e.name.clone()).collect())
                .collect()
        }
    }

    #[async_trait]
    impl EventsClient for MockClient {
        async fn submit(&self, events: &[Event]) -> Result<SubmitResponse, ClientError> {
            self.batches.lock().unwrap().push(events.to_vec());
            let fail = self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(ClientError::Network("offline".into()));
            }
            Ok(self.response.lock().unwrap().clone())
        }
    }

    /// Holds every submission until released.
    #[derive(Default)]
    struct GatedClient {
        entered: Notify,
        release: Notify,
        batches: Mutex<Vec<Vec<EventId>>>,
    }

    #[async_trait]
    impl EventsClient for GatedClient {
        async fn submit(&self, events: &[Event]) -> Result<SubmitResponse, ClientError> {
            self.batches
                .lock()
                .unwrap()
                .push(events.iter().map(|e| e.id).collect());
            self.entered.notify_one();
            self.release.notified().await;
            Ok(SubmitResponse::default())
        }
    }

    struct BrokenStorage;

    #[async_trait]
    impl QueueStorage for BrokenStorage {
        async fn load(&self) -> Result<Vec<QueueEntry>, StorageError> {
            Err(StorageError::Internal("disk gone".into()))
        }

        async fn save(&self, _entries: &[QueueEntry]) -> Result<(), StorageError> {
            Err(StorageError::Internal("disk gone".into()))
        }
    }

    /// Completes saves normally until `hold_next` is set, then parks the
    /// next save forever.
    #[derive(Default)]
    struct StallingStorage {
        hold_next: AtomicBool,
        entered: Notify,
        completed: AtomicUsize,
    }

    #[async_trait]
    impl QueueStorage for StallingStorage {
        async fn load(&self) -> Result<Vec<QueueEntry>, StorageError> {
            Ok(Vec::new())
        }

        async fn save(&self, _entries: &[QueueEntry]) -> Result<(), StorageError> {
            if self.hold_next.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                std::future::pending::<()>().await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(flush_at: usize, max_batch_size: usize, max_queue_size: usize) -> QueueConfig {
        QueueConfig {
            flush_at,
            flush_interval_secs: 30.0,
            max_batch_size,
            max_queue_size,
        }
    }

    fn names(queue: &EventQueue) -> Vec<String> {
        queue.entries().into_iter().map(|e| e.event.name).collect()
    }

    async fn add_named(queue: &EventQueue, names: &[&str]) {
        for name in names {
            queue.add_event(EventInfo::new(*name)).await;
        }
    }

    #[tokio::test]
    async fn test_events_carry_context_snapshot() {
        let queue = EventQueue::new(
            config(100, 10, 100),
            Arc::new(MockClient::default()),
            Arc::new(MemoryStorage::new()),
        )
        .unwrap();
        queue.add_event(EventInfo::new("before")).await;

        let registry = ContextRegistry::builder()
            .debug(Arc::new(DebugContextManager::new(true)))
            .build();
        queue.set_context_provider(Arc::new(registry));
        queue.add_event(EventInfo::new("after")).await;

        let entries = queue.entries();
        assert!(entries[0].event.context.is_empty());
        assert_eq!(entries[1].event.context.is_test_device, Some(true));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_first() {
        let storage = Arc::new(MemoryStorage::new());
        let queue = EventQueue::new(
            config(100, 3, 3),
            Arc::new(MockClient::default()),
            storage.clone(),
        )
        .unwrap();
        queue.restore().await;

        for (i, name) in ["e0", "e1", "e2", "e3", "e4"].iter().enumerate() {
            queue.add_event(EventInfo::new(*name)).await;
            assert!(queue.len() <= 3, "length exceeded cap after add {i}");
        }

        assert_eq!(names(&queue), ["e2", "e3", "e4"]);
        assert_eq!(storage.entries().unwrap(), queue.entries());
    }

    #[tokio::test]
    async fn test_flush_skips_until_triggered() {
        let client = Arc::new(MockClient::default());
        let queue =
            EventQueue::new(config(10, 10, 100), client.clone(), Arc::new(MemoryStorage::new()))
                .unwrap();

        assert_eq!(queue.flush().await, FlushOutcome::Skipped(SkipReason::Empty));
        add_named(&queue, &["a", "b"]).await;
        assert_eq!(queue.flush().await, FlushOutcome::Skipped(SkipReason::NotDue));
        assert!(client.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_after_interval() {
        let client = Arc::new(MockClient::default());
        let queue =
            EventQueue::new(config(10, 10, 100), client.clone(), Arc::new(MemoryStorage::new()))
                .unwrap();
        add_named(&queue, &["a"]).await;

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(queue.flush().await, FlushOutcome::Skipped(SkipReason::NotDue));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(queue.flush().await, FlushOutcome::Delivered(1));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_reaching_flush_at_delivers_in_background() {
        let client = Arc::new(MockClient::default());
        let queue =
            EventQueue::new(config(3, 10, 100), client.clone(), Arc::new(MemoryStorage::new()))
                .unwrap();
        let mut rx = queue.notifier().subscribe();

        add_named(&queue, &["a", "b", "c"]).await;

        for expected in ["a", "b", "c"] {
            let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            match notification {
                Notification::DidPostEvent(event) => assert_eq!(event.name, expected),
                other => panic!("unexpected notification: {other:?}"),
            }
        }
        assert_eq!(client.batches(), vec![vec!["a", "b", "c"]]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_batches_are_capped_and_backlog_drains() {
        let client = Arc::new(MockClient::default());
        let queue =
            EventQueue::new(config(2, 2, 100), client.clone(), Arc::new(MemoryStorage::new()))
                .unwrap();

        // Hold the in-flight slot so the size trigger cannot fire while filling.
        queue.inner.state().in_flight = usize::MAX;
        add_named(&queue, &["a", "b", "c", "d", "e"]).await;
        queue.inner.state().in_flight = 0;

        assert_eq!(queue.flush().await, FlushOutcome::Delivered(2));
        // Remaining backlog >= flush_at drains in follow-up flushes.
        for _ in 0..100 {
            if client.batches().len() >= 2 && queue.in_flight() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(client.batches()[..2], [vec!["a", "b"], vec!["c", "d"]]);
        assert_eq!(names(&queue), ["e"]);
    }

    #[tokio::test]
    async fn test_failed_batch_is_requeued_in_order() {
        let client = Arc::new(MockClient::failing(1));
        let storage = Arc::new(MemoryStorage::new());
        let queue = EventQueue::new(config(100, 10, 100), client.clone(), storage.clone()).unwrap();
        queue.restore().await;

        let attributes = Attributes::new().with("screen", "home").unwrap();
        queue
            .add_event(EventInfo::new("a").with_attributes(attributes.clone()))
            .await;
        add_named(&queue, &["b", "c"]).await;
        let before = queue.entries();

        assert_eq!(queue.flush_now().await, FlushOutcome::Failed(3));

        let after = queue.entries();
        assert_eq!(names(&queue), ["a", "b", "c"]);
        assert_eq!(queue.in_flight(), 0);
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(old.event, new.event);
            assert_eq!(new.attempt_count, old.attempt_count + 1);
        }
        assert_eq!(after[0].event.attributes, attributes);
        assert_eq!(storage.entries().unwrap(), after);

        // No immediate retry: the triggers have not fired again.
        assert_eq!(queue.flush().await, FlushOutcome::Skipped(SkipReason::NotDue));

        assert_eq!(queue.flush_now().await, FlushOutcome::Delivered(3));
        assert!(queue.is_empty());
        assert!(storage.entries().unwrap().is_empty());
        assert_eq!(client.batches().len(), 2);
    }

    #[tokio::test]
    async fn test_single_submission_in_flight() {
        let client = Arc::new(GatedClient::default());
        let storage = Arc::new(MemoryStorage::new());
        let queue = EventQueue::new(config(100, 10, 100), client.clone(), storage.clone()).unwrap();
        queue.restore().await;
        add_named(&queue, &["a", "b"]).await;

        let first = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.flush_now().await })
        };
        client.entered.notified().await;

        assert_eq!(queue.in_flight(), 2);
        assert_eq!(queue.flush_now().await, FlushOutcome::Skipped(SkipReason::InFlight));

        // Enqueueing still works while the batch is outstanding, and storage
        // keeps the unacknowledged events.
        queue.add_event(EventInfo::new("c")).await;
        assert_eq!(queue.len(), 3);
        assert_eq!(storage.entries().unwrap().len(), 3);

        client.release.notify_one();
        assert_eq!(first.await.unwrap(), FlushOutcome::Delivered(2));
        assert_eq!(names(&queue), ["c"]);
        assert_eq!(client.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_skips_in_flight_entries() {
        let client = Arc::new(GatedClient::default());
        let queue =
            EventQueue::new(config(100, 2, 3), client.clone(), Arc::new(MemoryStorage::new()))
                .unwrap();
        add_named(&queue, &["a", "b", "c"]).await;

        let flush = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.flush_now().await })
        };
        client.entered.notified().await;

        queue.add_event(EventInfo::new("d")).await;
        assert_eq!(names(&queue), ["a", "b", "d"]);

        client.release.notify_one();
        assert_eq!(flush.await.unwrap(), FlushOutcome::Delivered(2));
        assert_eq!(names(&queue), ["d"]);
    }

    #[tokio::test]
    async fn test_restore_after_restart() {
        let storage = Arc::new(MemoryStorage::new());
        let first = EventQueue::new(
            config(100, 10, 100),
            Arc::new(MockClient::default()),
            storage.clone(),
        )
        .unwrap();
        first.restore().await;
        add_named(&first, &["a", "b", "c"]).await;
        let persisted = first.entries();
        drop(first);

        let second = EventQueue::new(
            config(100, 10, 100),
            Arc::new(MockClient::default()),
            storage.clone(),
        )
        .unwrap();
        assert_eq!(second.restore().await, 3);
        assert_eq!(second.entries(), persisted);

        assert_eq!(second.restore().await, 0);
        assert_eq!(second.len(), 3);
    }

    #[tokio::test]
    async fn test_restore_places_old_entries_first() {
        let old: Vec<QueueEntry> = ["old1", "old2"]
            .iter()
            .map(|n| QueueEntry::new(Event::new(EventInfo::new(*n), Context::default())))
            .collect();
        let storage = Arc::new(MemoryStorage::with_entries(old));
        let queue = EventQueue::new(
            config(100, 2, 2),
            Arc::new(MockClient::default()),
            storage.clone(),
        )
        .unwrap();

        add_named(&queue, &["new"]).await;
        assert_eq!(storage.save_count(), 0);
        assert_eq!(queue.restore().await, 2);

        // Capacity 2: the oldest restored entry goes.
        assert_eq!(names(&queue), ["old2", "new"]);
        assert_eq!(storage.entries().unwrap(), queue.entries());
    }

    #[tokio::test]
    async fn test_cancelled_save_does_not_block_older_snapshot() {
        let storage = Arc::new(StallingStorage::default());
        let queue = EventQueue::new(
            config(100, 10, 100),
            Arc::new(MockClient::default()),
            storage.clone(),
        )
        .unwrap();
        queue.restore().await;
        add_named(&queue, &["a"]).await;
        assert_eq!(storage.completed.load(Ordering::SeqCst), 1);

        let older = queue.inner.state().snapshot();
        let newer = queue.inner.state().snapshot();

        storage.hold_next.store(true, Ordering::SeqCst);
        let stalled = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.persist(newer).await })
        };
        storage.entered.notified().await;
        stalled.abort();
        assert!(stalled.await.unwrap_err().is_cancelled());

        // The newer revision never reached storage, so the older one still may.
        queue.persist(older).await;
        assert_eq!(storage.completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_queue_in_memory() {
        let queue = EventQueue::new(
            config(100, 10, 100),
            Arc::new(MockClient::default()),
            Arc::new(BrokenStorage),
        )
        .unwrap();

        assert_eq!(queue.restore().await, 0);
        add_named(&queue, &["a"]).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.flush_now().await, FlushOutcome::Delivered(1));
    }

    #[tokio::test]
    async fn test_response_data_is_announced() {
        let client = Arc::new(MockClient::default());
        *client.response.lock().unwrap() = SubmitResponse {
            regions: vec![Region::Geofence {
                identifier: "g".into(),
                latitude: 1.0,
                longitude: 2.0,
                radius: 50.0,
            }],
            messages: vec![Message {
                id: "m1".into(),
                title: None,
                text: "Hello".into(),
                timestamp: chrono::Utc::now(),
                read: false,
                saved_to_inbox: true,
                action: MessageAction::None,
                properties: std::collections::BTreeMap::new(),
            }],
        };
        let queue =
            EventQueue::new(config(100, 10, 100), client, Arc::new(MemoryStorage::new())).unwrap();
        let mut rx = queue.notifier().subscribe();

        add_named(&queue, &["a"]).await;
        queue.flush_now().await;

        assert!(matches!(rx.recv().await.unwrap(), Notification::DidPostEvent(_)));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Notification::DidReceiveRegions(r) if r.len() == 1
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Notification::DidReceiveMessages(m) if m[0].id == "m1"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_and_pauses_when_inactive() {
        let client = Arc::new(MockClient::default());
        let queue =
            EventQueue::new(config(100, 10, 100), client.clone(), Arc::new(MemoryStorage::new()))
                .unwrap();
        let timer = queue.spawn_flush_timer();
        let mut rx = queue.notifier().subscribe();

        let start = Instant::now();
        add_named(&queue, &["a"]).await;
        tokio_test::assert_ok!(rx.recv().await);
        assert!(start.elapsed() >= Duration::from_secs(30));

        queue.handle_lifecycle(AppLifecycle::WillResignActive).await;
        add_named(&queue, &["b"]).await;
        let waited = tokio::time::timeout(Duration::from_secs(300), rx.recv()).await;
        assert!(waited.is_err(), "timer flushed while inactive");
        assert_eq!(queue.len(), 1);

        queue.handle_lifecycle(AppLifecycle::DidBecomeActive).await;
        tokio_test::assert_ok!(rx.recv().await);
        assert!(queue.is_empty());

        timer.abort();
    }

    #[tokio::test]
    async fn test_background_transition_forces_flush() {
        let client = Arc::new(MockClient::default());
        let queue =
            EventQueue::new(config(100, 10, 100), client.clone(), Arc::new(MemoryStorage::new()))
                .unwrap();
        add_named(&queue, &["a"]).await;

        queue.handle_lifecycle(AppLifecycle::DidEnterBackground).await;
        assert!(queue.is_empty());
        assert_eq!(client.batches(), vec![vec!["a"]]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = EventQueue::new(
            config(0, 10, 100),
            Arc::new(MockClient::default()),
            Arc::new(MemoryStorage::new()),
        );
        assert!(result.is_err());

        let huge_interval = QueueConfig {
            flush_interval_secs: 1e300,
            ..config(10, 10, 100)
        };
        let result = EventQueue::new(
            huge_interval,
            Arc::new(MockClient::default()),
            Arc::new(MemoryStorage::new()),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
