//! Inbox notifications sync engine.
//!
//! Ties the pieces together for one logical query: a memoized initial load
//! driven by the retry policy, a subscriber-counted poller that refreshes
//! deltas in the background, and optimistic mutation entry points that are
//! committed or rolled back when the server answers.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use inboxsync_api::{ApiError, InboxApi, InboxNotificationsDelta};

use crate::SyncError;
use crate::config::SyncConfig;
use crate::poller::Poller;
use crate::retry::RetryPolicy;
use crate::single_flight::SingleFlight;
use crate::store::{CacheStore, OptimisticUpdate, OptimisticUpdateKind, QueryState};

/// Query name under which inbox notification fetches are tracked.
pub const INBOX_NOTIFICATIONS_QUERY: &str = "INBOX_NOTIFICATIONS";

/// Capacity of the mutation failure channel.
const MUTATION_CHANNEL_CAPACITY: usize = 64;

/// Cursor value meaning "no successful fetch yet".
const NO_CURSOR: i64 = i64::MIN;

/// A mutation whose request failed and whose optimistic update was rolled back.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationFailure {
    pub update_id: String,
    pub kind: OptimisticUpdateKind,
    pub error: SyncError,
}

/// Handle to the inbox notifications sync engine. Cheap to clone.
#[derive(Clone)]
pub struct InboxNotificationsSync {
    inner: Arc<Inner>,
}

/// Consumers registered for background refresh.
///
/// `epoch` is bumped by `shutdown`, which drops every registration at once;
/// guards from an older epoch have nothing left to release.
#[derive(Default)]
struct PollingSubscribers {
    count: usize,
    epoch: u64,
}

struct Inner {
    api: Arc<dyn InboxApi>,
    store: Arc<CacheStore>,
    retry: RetryPolicy,
    poll_interval: Duration,
    /// Server watermark of the last merged delta, in microseconds since the epoch.
    last_requested_at: AtomicI64,
    /// Bumped by `reload`. Only the current load may record its outcome.
    load_generation: AtomicU64,
    initial_load: SingleFlight<(), SyncError>,
    poller: Poller,
    polling: Mutex<PollingSubscribers>,
    mutation_errors_tx: broadcast::Sender<MutationFailure>,
}

impl InboxNotificationsSync {
    /// Create an engine that feeds `store` from `api`.
    ///
    /// Nothing is fetched until the first `ensure_loaded`, `start_loading`,
    /// or `enable_polling`.
    pub fn new(api: Arc<dyn InboxApi>, store: Arc<CacheStore>, config: &SyncConfig) -> Self {
        let (mutation_errors_tx, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let load_ref = weak.clone();
            let initial_load = SingleFlight::new(move || {
                let load = load_ref.upgrade().map(|inner| {
                    let generation = inner.load_generation.load(Ordering::SeqCst);
                    inner.load(generation)
                });
                async move {
                    match load {
                        Some(load) => load.await,
                        None => Err(SyncError::Closed),
                    }
                }
                .boxed()
            });

            let poll_ref = weak.clone();
            let poller = Poller::new("inbox-notifications", move || {
                let inner = poll_ref.upgrade();
                async move {
                    match inner {
                        Some(inner) => inner.poll().await,
                        None => Ok(()),
                    }
                }
                .boxed()
            });

            Inner {
                api,
                store,
                retry: RetryPolicy::from_config(&config.retry),
                poll_interval: config.poll_interval(),
                last_requested_at: AtomicI64::new(NO_CURSOR),
                load_generation: AtomicU64::new(0),
                initial_load,
                poller,
                polling: Mutex::new(PollingSubscribers::default()),
                mutation_errors_tx,
            }
        });

        Self { inner }
    }

    /// The store this engine writes into.
    pub fn store(&self) -> Arc<CacheStore> {
        Arc::clone(&self.inner.store)
    }

    /// Wait for the initial load, starting it if needed.
    ///
    /// Every caller shares one attempt. A failed load is memoized and
    /// returned to all callers until [`reload`](Self::reload).
    #[tracing::instrument(skip(self))]
    pub async fn ensure_loaded(&self) -> Result<(), SyncError> {
        self.inner.initial_load.get().await
    }

    /// Start the initial load in the background and return immediately.
    pub fn start_loading(&self) {
        self.inner.initial_load.start();
    }

    /// Outcome of the initial load, or `None` while pending or not started.
    pub fn load_outcome(&self) -> Option<Result<(), SyncError>> {
        self.inner.initial_load.peek()
    }

    /// Forget the memoized initial load and start a fresh one.
    ///
    /// A load still retrying from before the reload keeps running, but it no
    /// longer records its outcome in the query state.
    pub fn reload(&self) {
        let generation = self.inner.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "reloading inbox notifications");
        self.inner.initial_load.reset();
        self.inner.initial_load.start();
    }

    /// Fetch changes since the cursor and merge them into the store.
    pub async fn fetch_delta(&self) -> Result<(), SyncError> {
        self.inner.fetch_delta().await
    }

    /// Watermark of the newest merged delta.
    pub fn last_requested_at(&self) -> Option<DateTime<Utc>> {
        self.inner.last_requested_at()
    }

    /// Register a consumer that needs background refresh.
    ///
    /// The first registration starts the initial load and the poller.
    pub fn enable_polling(&self) {
        self.register_polling();
    }

    /// Unregister a consumer. The last one out stops the poller.
    ///
    /// A poll already in flight still completes and merges its result.
    pub fn disable_polling(&self) {
        let mut subscribers = self.inner.polling_subscribers();
        self.inner.release_polling(&mut subscribers);
    }

    /// Current number of polling consumers.
    pub fn polling_subscribers(&self) -> usize {
        self.inner.polling_subscribers().count
    }

    /// Returns the epoch the registration belongs to.
    fn register_polling(&self) -> u64 {
        let mut subscribers = self.inner.polling_subscribers();
        subscribers.count += 1;

        if subscribers.count == 1 {
            info!(
                interval_ms = self.inner.poll_interval.as_millis() as u64,
                "starting inbox notifications polling"
            );
            self.inner.initial_load.start();
            self.inner.poller.start(self.inner.poll_interval);
        }
        subscribers.epoch
    }

    /// Whether the poller is running.
    pub fn is_polling(&self) -> bool {
        self.inner.poller.is_running()
    }

    /// Enable polling for as long as the returned guard lives.
    ///
    /// A guard outliving [`shutdown`](Self::shutdown) releases nothing.
    pub fn polling_guard(&self) -> PollingGuard {
        let epoch = self.register_polling();
        PollingGuard {
            sync: self.clone(),
            epoch,
        }
    }

    /// Receive every mutation that was rolled back.
    pub fn mutation_errors(&self) -> broadcast::Receiver<MutationFailure> {
        self.inner.mutation_errors_tx.subscribe()
    }

    /// Optimistically mark one notification as read.
    pub fn mark_one_read(&self, inbox_notification_id: &str) -> JoinHandle<()> {
        let id = inbox_notification_id.to_string();
        let kind = OptimisticUpdateKind::MarkOneRead {
            inbox_notification_id: id.clone(),
            read_at: Utc::now(),
        };
        self.run_mutation(kind, move |api| {
            async move { api.mark_inbox_notification_as_read(&id).await }.boxed()
        })
    }

    /// Optimistically mark every notification as read.
    pub fn mark_all_read(&self) -> JoinHandle<()> {
        let kind = OptimisticUpdateKind::MarkAllRead {
            read_at: Utc::now(),
        };
        self.run_mutation(kind, |api| {
            async move { api.mark_all_inbox_notifications_as_read().await }.boxed()
        })
    }

    /// Optimistically delete one notification.
    pub fn delete_one(&self, inbox_notification_id: &str) -> JoinHandle<()> {
        let id = inbox_notification_id.to_string();
        let kind = OptimisticUpdateKind::DeleteOne {
            inbox_notification_id: id.clone(),
            deleted_at: Utc::now(),
        };
        self.run_mutation(kind, move |api| {
            async move { api.delete_inbox_notification(&id).await }.boxed()
        })
    }

    /// Optimistically delete every notification.
    pub fn delete_all(&self) -> JoinHandle<()> {
        let kind = OptimisticUpdateKind::DeleteAll {
            deleted_at: Utc::now(),
        };
        self.run_mutation(kind, |api| {
            async move { api.delete_all_inbox_notifications().await }.boxed()
        })
    }

    /// Push the optimistic update now, then reconcile on a spawned task.
    ///
    /// Must be called from within a tokio runtime.
    fn run_mutation<F>(&self, kind: OptimisticUpdateKind, request: F) -> JoinHandle<()>
    where
        F: FnOnce(Arc<dyn InboxApi>) -> BoxFuture<'static, Result<(), ApiError>> + Send + 'static,
    {
        let update = OptimisticUpdate::new(kind);
        let update_id = update.id.clone();
        let kind = update.kind.clone();
        let span = info_span!("mutation", kind = kind.name(), update_id = %update_id);

        self.inner.store.push_optimistic_update(update);

        let api = Arc::clone(&self.inner.api);
        let store = Arc::clone(&self.inner.store);
        let errors_tx = self.inner.mutation_errors_tx.clone();

        tokio::spawn(
            async move {
                match request(api).await {
                    Ok(()) => {
                        store.commit_optimistic_update(&update_id);
                        debug!("mutation confirmed");
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            transient = e.is_transient(),
                            "mutation failed, rolling back"
                        );
                        store.remove_optimistic_update(&update_id);
                        let _ = errors_tx.send(MutationFailure {
                            update_id,
                            kind,
                            error: e.into(),
                        });
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Stop polling regardless of how many consumers are registered.
    pub fn shutdown(&self) {
        let mut subscribers = self.inner.polling_subscribers();
        subscribers.count = 0;
        subscribers.epoch += 1;
        self.inner.poller.stop();
        info!("inbox notifications sync shut down");
    }
}

impl Inner {
    fn polling_subscribers(&self) -> MutexGuard<'_, PollingSubscribers> {
        self.polling.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_polling(&self, subscribers: &mut PollingSubscribers) {
        match subscribers.count {
            0 => warn!("disable_polling called with no polling subscribers"),
            1 => {
                subscribers.count = 0;
                self.poller.stop();
                info!("stopped inbox notifications polling");
            }
            _ => subscribers.count -= 1,
        }
    }

    /// Initial load: mark loading, fetch under the retry policy, record failure.
    async fn load(self: Arc<Self>, generation: u64) -> Result<(), SyncError> {
        self.store
            .set_query_state(INBOX_NOTIFICATIONS_QUERY, QueryState::loading());

        let this = &*self;
        let result = self.retry.run(move || this.fetch_delta()).await;

        match &result {
            Ok(()) => info!(generation, "inbox notifications loaded"),
            Err(e) => {
                // Checked under the store's write lock: a reload that lands
                // first supersedes this failure.
                let recorded = self.store.set(|state| {
                    let current = self.load_generation.load(Ordering::SeqCst) == generation;
                    if current {
                        state.queries.insert(
                            INBOX_NOTIFICATIONS_QUERY.to_string(),
                            QueryState::failed(e.clone()),
                        );
                    }
                    current
                });
                if recorded {
                    warn!(
                        error = %e,
                        transient = e.is_transient(),
                        generation,
                        "inbox notifications load failed"
                    );
                } else {
                    debug!(error = %e, generation, "superseded inbox notifications load failed");
                }
            }
        }
        result
    }

    /// One poll tick. Waits for the initial load; a failed load makes this a no-op error.
    async fn poll(self: Arc<Self>) -> Result<(), SyncError> {
        self.initial_load.get().await?;
        debug!("polling inbox notifications");
        self.fetch_delta().await
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_delta(&self) -> Result<(), SyncError> {
        let since = self.last_requested_at();
        let delta = self.api.get_inbox_notifications(since).await?;
        self.merge(delta);
        Ok(())
    }

    fn merge(&self, delta: InboxNotificationsDelta) {
        let deleted_thread_ids: Vec<String> =
            delta.deleted_threads.into_iter().map(|d| d.id).collect();
        let deleted_inbox_notification_ids: Vec<String> = delta
            .deleted_inbox_notifications
            .into_iter()
            .map(|d| d.id)
            .collect();

        self.store.update_threads_and_notifications(
            delta.threads,
            delta.inbox_notifications,
            &deleted_thread_ids,
            &deleted_inbox_notification_ids,
            INBOX_NOTIFICATIONS_QUERY,
        );
        self.advance_cursor(delta.meta.requested_at);
    }

    /// Move the cursor forward. Older watermarks are ignored.
    fn advance_cursor(&self, requested_at: DateTime<Utc>) {
        let micros = requested_at.timestamp_micros();
        let previous = self.last_requested_at.fetch_max(micros, Ordering::SeqCst);
        if previous > micros {
            debug!(%requested_at, "ignoring stale delta watermark");
        }
    }

    fn last_requested_at(&self) -> Option<DateTime<Utc>> {
        match self.last_requested_at.load(Ordering::SeqCst) {
            NO_CURSOR => None,
            micros => DateTime::<Utc>::from_timestamp_micros(micros),
        }
    }
}

/// Keeps polling enabled until dropped.
#[must_use = "dropping a PollingGuard disables polling"]
pub struct PollingGuard {
    sync: InboxNotificationsSync,
    epoch: u64,
}

impl Drop for PollingGuard {
    fn drop(&mut self) {
        let inner = &self.sync.inner;
        let mut subscribers = inner.polling_subscribers();
        if subscribers.epoch == self.epoch {
            inner.release_polling(&mut subscribers);
        } else {
            debug!("polling guard outlived shutdown");
        }
    }
}
