//! Shared cache of server-confirmed entities, query metadata, and pending
//! optimistic updates.
//!
//! The store is the single mutable source of truth. Readers get immutable
//! `Arc<CacheState>` snapshots; writers go through [`CacheStore::set`] and the
//! named entry points built on it. Updates are copy-on-write, so a snapshot
//! handed out earlier never changes underneath its holder.
//!
//! Optimistic updates are never written into entities directly. They sit in
//! an ordered overlay that selectors replay over the confirmed state, so a
//! rollback is just removing the descriptor.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, trace};
use uuid::Uuid;

use inboxsync_api::{InboxNotification, Thread};

use crate::SyncError;

/// Fetch lifecycle of one logical query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub is_loading: bool,
    pub error: Option<SyncError>,
}

impl QueryState {
    /// A fetch is in progress.
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            error: None,
        }
    }

    /// The last fetch succeeded.
    pub fn success() -> Self {
        Self {
            is_loading: false,
            error: None,
        }
    }

    /// The fetch failed terminally.
    pub fn failed(error: SyncError) -> Self {
        Self {
            is_loading: false,
            error: Some(error),
        }
    }
}

/// What a pending optimistic update intends to change.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimisticUpdateKind {
    /// One notification marked as read.
    MarkOneRead {
        inbox_notification_id: String,
        read_at: DateTime<Utc>,
    },
    /// Every notification marked as read.
    MarkAllRead { read_at: DateTime<Utc> },
    /// One notification deleted.
    DeleteOne {
        inbox_notification_id: String,
        deleted_at: DateTime<Utc>,
    },
    /// Every notification deleted.
    DeleteAll { deleted_at: DateTime<Utc> },
}

impl OptimisticUpdateKind {
    /// Apply this change to a notification map. Never creates entries.
    fn apply(&self, notifications: &mut HashMap<String, InboxNotification>) {
        match self {
            OptimisticUpdateKind::MarkOneRead {
                inbox_notification_id,
                read_at,
            } => {
                if let Some(notification) = notifications.get_mut(inbox_notification_id) {
                    notification.read_at = Some(*read_at);
                }
            }
            OptimisticUpdateKind::MarkAllRead { read_at } => {
                for notification in notifications.values_mut() {
                    notification.read_at = Some(*read_at);
                }
            }
            OptimisticUpdateKind::DeleteOne {
                inbox_notification_id,
                ..
            } => {
                notifications.remove(inbox_notification_id);
            }
            OptimisticUpdateKind::DeleteAll { .. } => notifications.clear(),
        }
    }

    /// Short label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            OptimisticUpdateKind::MarkOneRead { .. } => "mark-one-read",
            OptimisticUpdateKind::MarkAllRead { .. } => "mark-all-read",
            OptimisticUpdateKind::DeleteOne { .. } => "delete-one",
            OptimisticUpdateKind::DeleteAll { .. } => "delete-all",
        }
    }
}

/// A tentative local change awaiting server confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticUpdate {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub kind: OptimisticUpdateKind,
}

impl OptimisticUpdate {
    /// Create an update with a fresh id, stamped now.
    pub fn new(kind: OptimisticUpdateKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            kind,
        }
    }
}

/// Immutable snapshot of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheState {
    /// Confirmed threads by id.
    pub threads: HashMap<String, Thread>,
    /// Confirmed inbox notifications by id.
    pub inbox_notifications: HashMap<String, InboxNotification>,
    /// Query lifecycle by query name.
    pub queries: HashMap<String, QueryState>,
    /// Pending updates, in application order.
    pub optimistic_updates: Vec<OptimisticUpdate>,
}

impl CacheState {
    /// Lifecycle of a query, if it was ever started.
    pub fn query(&self, name: &str) -> Option<&QueryState> {
        self.queries.get(name)
    }

    /// Confirmed notifications with every pending update replayed in order.
    pub fn effective_inbox_notifications(&self) -> HashMap<String, InboxNotification> {
        let mut notifications = self.inbox_notifications.clone();
        for update in &self.optimistic_updates {
            update.kind.apply(&mut notifications);
        }
        notifications
    }

    /// Upsert and delete entities from a fetch, and mark the query loaded.
    pub fn merge_delta(
        &mut self,
        threads: Vec<Thread>,
        inbox_notifications: Vec<InboxNotification>,
        deleted_thread_ids: &[String],
        deleted_inbox_notification_ids: &[String],
        query_name: &str,
    ) {
        for thread in threads {
            self.threads.insert(thread.id.clone(), thread);
        }
        for notification in inbox_notifications {
            self.inbox_notifications
                .insert(notification.id.clone(), notification);
        }
        for id in deleted_thread_ids {
            self.threads.remove(id);
        }
        for id in deleted_inbox_notification_ids {
            self.inbox_notifications.remove(id);
        }
        self.queries
            .insert(query_name.to_string(), QueryState::success());
    }

    /// Remove a pending update, returning it if it was present.
    pub fn take_optimistic_update(&mut self, update_id: &str) -> Option<OptimisticUpdate> {
        let index = self
            .optimistic_updates
            .iter()
            .position(|update| update.id == update_id)?;
        Some(self.optimistic_updates.remove(index))
    }

    /// Make a pending update permanent: remove it and apply it to confirmed state.
    ///
    /// Returns `false` if the update was not pending. Entities removed in the
    /// meantime are not recreated.
    pub fn commit_optimistic_update(&mut self, update_id: &str) -> bool {
        match self.take_optimistic_update(update_id) {
            Some(update) => {
                update.kind.apply(&mut self.inbox_notifications);
                true
            }
            None => false,
        }
    }
}

type Listener = Arc<dyn Fn(&CacheState) + Send + Sync>;

/// Releases the drain flag if a listener panics mid-drain.
struct DrainGuard<'a> {
    store: &'a CacheStore,
}

impl DrainGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.store.notification_queue().draining = false;
    }
}

type ListenerMap = Mutex<BTreeMap<u64, Listener>>;

/// Registration handle returned by [`CacheStore::subscribe`].
///
/// The listener stays registered until this is dropped or
/// [`unsubscribe`](Self::unsubscribe) is called.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    listeners: Weak<ListenerMap>,
    id: u64,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

/// Snapshots waiting to be handed to listeners, in commit order.
///
/// At most one thread drains at a time. A `set` that finds a drain in
/// progress (another thread, or a listener calling back into the store)
/// leaves its snapshot for the drainer.
#[derive(Default)]
struct NotificationQueue {
    pending: VecDeque<Arc<CacheState>>,
    draining: bool,
}

/// The shared cache store.
pub struct CacheStore {
    state: RwLock<Arc<CacheState>>,
    changes_tx: watch::Sender<Arc<CacheState>>,
    listeners: Arc<ListenerMap>,
    next_listener_id: AtomicU64,
    notifications: Mutex<NotificationQueue>,
}

impl CacheStore {
    /// Create an empty store.
    pub fn new() -> Arc<Self> {
        let initial = Arc::new(CacheState::default());
        let (changes_tx, _) = watch::channel(Arc::clone(&initial));
        Arc::new(Self {
            state: RwLock::new(initial),
            changes_tx,
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_listener_id: AtomicU64::new(0),
            notifications: Mutex::new(NotificationQueue::default()),
        })
    }

    /// Current snapshot.
    pub fn get(&self) -> Arc<CacheState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Register a listener called with the new snapshot after every `set`.
    ///
    /// Listeners run in subscription order, and snapshots arrive in the order
    /// the writes were applied. A listener may unsubscribe itself or others
    /// while being notified; the current round still completes. A `set` made
    /// from inside a listener is delivered after the current round.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CacheState) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));
        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            id,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Receiver that always holds the latest snapshot, for async observers.
    pub fn watch(&self) -> watch::Receiver<Arc<CacheState>> {
        self.changes_tx.subscribe()
    }

    /// Atomically transform the current state, then notify listeners.
    ///
    /// `updater` must be a synchronous, total transformation. Calls apply
    /// in the order they take the write lock, and listeners observe them in
    /// that same order.
    pub fn set<R>(&self, updater: impl FnOnce(&mut CacheState) -> R) -> R {
        let result = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let result = updater(Arc::make_mut(&mut state));
            self.changes_tx.send_replace(Arc::clone(&state));
            self.notification_queue()
                .pending
                .push_back(Arc::clone(&state));
            result
        };

        self.drain_notifications();
        result
    }

    fn notification_queue(&self) -> MutexGuard<'_, NotificationQueue> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver queued snapshots until the queue is empty, unless another
    /// caller is already doing so.
    fn drain_notifications(&self) {
        {
            let mut queue = self.notification_queue();
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        let drain = DrainGuard { store: self };
        loop {
            let snapshot = {
                let mut queue = self.notification_queue();
                match queue.pending.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        // Cleared under the same lock that saw the queue empty,
                        // so a concurrent push either was popped or drains itself.
                        queue.draining = false;
                        drain.disarm();
                        return;
                    }
                }
            };
            self.notify(&snapshot);
        }
    }

    fn notify(&self, snapshot: &CacheState) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        trace!(listeners = listeners.len(), "notifying cache listeners");
        for listener in listeners {
            listener(snapshot);
        }
    }

    /// Replace one query's lifecycle without touching entities.
    pub fn set_query_state(&self, query_name: &str, query_state: QueryState) {
        self.set(|state| {
            state.queries.insert(query_name.to_string(), query_state);
        });
    }

    /// Merge a fetch result. The only way fetched data enters the cache.
    ///
    /// Upserts by id (the server payload replaces the whole record), removes
    /// deleted ids, and marks `query_name` as loaded.
    pub fn update_threads_and_notifications(
        &self,
        threads: Vec<Thread>,
        inbox_notifications: Vec<InboxNotification>,
        deleted_thread_ids: &[String],
        deleted_inbox_notification_ids: &[String],
        query_name: &str,
    ) {
        debug!(
            threads = threads.len(),
            inbox_notifications = inbox_notifications.len(),
            deleted_threads = deleted_thread_ids.len(),
            deleted_inbox_notifications = deleted_inbox_notification_ids.len(),
            query = query_name,
            "merging fetch result"
        );

        self.set(|state| {
            state.merge_delta(
                threads,
                inbox_notifications,
                deleted_thread_ids,
                deleted_inbox_notification_ids,
                query_name,
            )
        });
    }

    /// Append a pending update. Visible to the next `get`.
    pub fn push_optimistic_update(&self, update: OptimisticUpdate) {
        trace!(update_id = %update.id, kind = update.kind.name(), "pushing optimistic update");
        self.set(|state| state.optimistic_updates.push(update));
    }

    /// Drop a pending update without touching entities (rollback).
    ///
    /// Returns `false` if it was not pending.
    pub fn remove_optimistic_update(&self, update_id: &str) -> bool {
        self.set(|state| state.take_optimistic_update(update_id).is_some())
    }

    /// Replace a pending update with its permanent effect on confirmed state.
    ///
    /// Returns `false` if it was not pending.
    pub fn commit_optimistic_update(&self, update_id: &str) -> bool {
        self.set(|state| state.commit_optimistic_update(update_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inboxsync_api::InboxNotificationKind;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    const QUERY: &str = "TEST_QUERY";

    fn notification(id: &str, read: bool) -> InboxNotification {
        InboxNotification {
            id: id.to_string(),
            kind: InboxNotificationKind::Thread {
                thread_id: format!("th_{id}"),
            },
            room_id: Some("room".to_string()),
            notified_at: "2024-05-01T10:00:00Z".parse().unwrap(),
            read_at: read.then(|| "2024-05-01T11:00:00Z".parse().unwrap()),
        }
    }

    fn thread(id: &str) -> Thread {
        Thread {
            id: id.to_string(),
            room_id: "room".to_string(),
            created_at: "2024-05-01T09:00:00Z".parse().unwrap(),
            updated_at: None,
            metadata: Default::default(),
            comments: vec![],
        }
    }

    fn now() -> DateTime<Utc> {
        "2024-05-02T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_set_replaces_snapshot_without_mutating_old_one() {
        let store = CacheStore::new();
        let before = store.get();

        store.set(|state| {
            state
                .inbox_notifications
                .insert("a".to_string(), notification("a", false));
        });

        assert!(before.inbox_notifications.is_empty());
        assert_eq!(store.get().inbox_notifications.len(), 1);
    }

    #[test]
    fn test_set_returns_updater_result() {
        let store = CacheStore::new();
        let len = store.set(|state| {
            state.queries.insert(QUERY.to_string(), QueryState::loading());
            state.queries.len()
        });
        assert_eq!(len, 1);
    }

    #[test]
    fn test_listeners_notified_in_order() {
        let store = CacheStore::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&log);
        let _a = store.subscribe(move |_| first.lock().unwrap().push("a"));
        let second = Arc::clone(&log);
        let _b = store.subscribe(move |_| second.lock().unwrap().push("b"));

        store.set_query_state(QUERY, QueryState::loading());

        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_drop_subscription_unsubscribes() {
        let store = CacheStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let subscription = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set_query_state(QUERY, QueryState::loading());
        subscription.unsubscribe();
        store.set_query_state(QUERY, QueryState::success());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_during_notification_does_not_skip_others() {
        let store = CacheStore::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let own = Arc::clone(&slot);
        let subscription = store.subscribe(move |_| {
            // Unsubscribes itself from inside the callback.
            own.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(subscription);

        let counter = Arc::clone(&calls);
        let _other = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.set_query_state(QUERY, QueryState::loading());
        store.set_query_state(QUERY, QueryState::success());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn test_listener_sees_new_snapshot() {
        let store = CacheStore::new();
        let seen = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        let _s = store.subscribe(move |state| {
            *sink.lock().unwrap() = state.query(QUERY).cloned();
        });

        store.set_query_state(QUERY, QueryState::loading());
        assert_eq!(*seen.lock().unwrap(), Some(QueryState::loading()));
    }

    #[test]
    fn test_concurrent_sets_notify_in_commit_order() {
        use std::sync::atomic::AtomicBool;
        use std::sync::mpsc;

        let store = CacheStore::new();
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let blocked_once = AtomicBool::new(false);

        // Holds up delivery of the first snapshot until released.
        let _slow = store.subscribe(move |_| {
            if !blocked_once.swap(true, Ordering::SeqCst) {
                entered_tx.send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
            }
        });

        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _recorder = store.subscribe(move |state| {
            let mut ids: Vec<String> = state.inbox_notifications.keys().cloned().collect();
            ids.sort();
            sink.lock().unwrap().push(ids);
        });

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store.update_threads_and_notifications(
                    vec![],
                    vec![notification("a", false)],
                    &[],
                    &[],
                    QUERY,
                );
            })
        };

        entered_rx.recv().unwrap();
        store.update_threads_and_notifications(
            vec![],
            vec![notification("b", false)],
            &[],
            &[],
            QUERY,
        );
        release_tx.send(()).unwrap();
        writer.join().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                vec!["a".to_string()],
                vec!["a".to_string(), "b".to_string()],
            ]
        );
    }

    #[test]
    fn test_set_from_listener_is_delivered_after_current_round() {
        let store = CacheStore::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&store);
        let first = Arc::clone(&log);
        let _a = store.subscribe(move |state| {
            let loading = state.query(QUERY).is_some_and(|q| q.is_loading);
            first.lock().unwrap().push(format!("a:{loading}"));
            if loading {
                if let Some(store) = weak.upgrade() {
                    store.set_query_state(QUERY, QueryState::success());
                }
            }
        });
        let second = Arc::clone(&log);
        let _b = store.subscribe(move |state| {
            let loading = state.query(QUERY).is_some_and(|q| q.is_loading);
            second.lock().unwrap().push(format!("b:{loading}"));
        });

        store.set_query_state(QUERY, QueryState::loading());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:true", "b:true", "a:false", "b:false"]
        );
        assert_eq!(store.get().query(QUERY), Some(&QueryState::success()));
    }

    #[tokio::test]
    async fn test_watch_receives_latest_snapshot() {
        let store = CacheStore::new();
        let mut rx = store.watch();

        store.set_query_state(QUERY, QueryState::success());
        rx.changed().await.unwrap();

        assert_eq!(
            rx.borrow().query(QUERY).cloned(),
            Some(QueryState::success())
        );
    }

    #[test]
    fn test_merge_upserts_deletes_and_marks_loaded() {
        let store = CacheStore::new();
        store.set_query_state(QUERY, QueryState::loading());
        store.update_threads_and_notifications(
            vec![thread("t1"), thread("t2")],
            vec![notification("a", false), notification("b", false)],
            &[],
            &[],
            QUERY,
        );

        let mut replaced = notification("a", true);
        replaced.room_id = None;
        store.update_threads_and_notifications(
            vec![],
            vec![replaced.clone()],
            &["t2".to_string()],
            &["b".to_string()],
            QUERY,
        );

        let state = store.get();
        assert_eq!(state.inbox_notifications.len(), 1);
        assert_eq!(state.inbox_notifications["a"], replaced);
        assert!(state.threads.contains_key("t1"));
        assert!(!state.threads.contains_key("t2"));
        assert_eq!(state.query(QUERY), Some(&QueryState::success()));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = CacheStore::new();
        let twice = CacheStore::new();
        let apply = |store: &CacheStore| {
            store.update_threads_and_notifications(
                vec![thread("t1")],
                vec![notification("a", false)],
                &["t9".to_string()],
                &["z".to_string()],
                QUERY,
            )
        };

        apply(&once);
        apply(&twice);
        apply(&twice);

        assert_eq!(*once.get(), *twice.get());
    }

    #[test]
    fn test_rollback_restores_confirmed_view() {
        let store = CacheStore::new();
        store.update_threads_and_notifications(vec![], vec![notification("a", false)], &[], &[], QUERY);

        let update = OptimisticUpdate::new(OptimisticUpdateKind::MarkOneRead {
            inbox_notification_id: "a".to_string(),
            read_at: now(),
        });
        let update_id = update.id.clone();
        store.push_optimistic_update(update);

        let state = store.get();
        assert_eq!(state.effective_inbox_notifications()["a"].read_at, Some(now()));
        assert_eq!(state.inbox_notifications["a"].read_at, None);

        assert!(store.remove_optimistic_update(&update_id));
        assert!(!store.remove_optimistic_update(&update_id));

        let state = store.get();
        assert!(state.optimistic_updates.is_empty());
        assert_eq!(state.effective_inbox_notifications()["a"].read_at, None);
    }

    #[test]
    fn test_commit_applies_and_removes() {
        let store = CacheStore::new();
        store.update_threads_and_notifications(
            vec![],
            vec![notification("a", false), notification("b", false)],
            &[],
            &[],
            QUERY,
        );

        let update = OptimisticUpdate::new(OptimisticUpdateKind::MarkAllRead { read_at: now() });
        let update_id = update.id.clone();
        store.push_optimistic_update(update);

        assert!(store.commit_optimistic_update(&update_id));
        assert!(!store.commit_optimistic_update(&update_id));

        let state = store.get();
        assert!(state.optimistic_updates.is_empty());
        assert!(state.inbox_notifications.values().all(|n| n.read_at == Some(now())));
    }

    #[test]
    fn test_commit_never_recreates_deleted_entity() {
        let store = CacheStore::new();
        store.update_threads_and_notifications(vec![], vec![notification("a", false)], &[], &[], QUERY);

        let update = OptimisticUpdate::new(OptimisticUpdateKind::MarkOneRead {
            inbox_notification_id: "a".to_string(),
            read_at: now(),
        });
        let update_id = update.id.clone();
        store.push_optimistic_update(update);

        store.update_threads_and_notifications(vec![], vec![], &[], &["a".to_string()], QUERY);
        assert!(store.get().effective_inbox_notifications().is_empty());

        assert!(store.commit_optimistic_update(&update_id));
        let state = store.get();
        assert!(state.inbox_notifications.is_empty());
        assert!(state.optimistic_updates.is_empty());
    }

    #[test]
    fn test_updates_layer_in_push_order() {
        let store = CacheStore::new();
        store.update_threads_and_notifications(
            vec![],
            vec![notification("a", false), notification("b", false)],
            &[],
            &[],
            QUERY,
        );

        store.push_optimistic_update(OptimisticUpdate::new(OptimisticUpdateKind::DeleteOne {
            inbox_notification_id: "a".to_string(),
            deleted_at: now(),
        }));
        store.push_optimistic_update(OptimisticUpdate::new(OptimisticUpdateKind::MarkOneRead {
            inbox_notification_id: "a".to_string(),
            read_at: now(),
        }));
        store.push_optimistic_update(OptimisticUpdate::new(OptimisticUpdateKind::MarkOneRead {
            inbox_notification_id: "b".to_string(),
            read_at: now(),
        }));

        let effective = store.get().effective_inbox_notifications();
        assert_eq!(effective.len(), 1);
        assert_eq!(effective["b"].read_at, Some(now()));
    }

    #[test]
    fn test_delete_all_clears_effective_view() {
        let mut state = CacheState::default();
        state.merge_delta(vec![], vec![notification("a", false)], &[], &[], QUERY);
        state
            .optimistic_updates
            .push(OptimisticUpdate::new(OptimisticUpdateKind::DeleteAll { deleted_at: now() }));

        assert!(state.effective_inbox_notifications().is_empty());
        assert_eq!(state.inbox_notifications.len(), 1);
    }
}
