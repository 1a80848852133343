//! Client-side inbox notification sync.
//!
//! Keeps a local cache of inbox notifications and threads consistent with
//! the server while many observers come and go.
//!
//! ## Components
//!
//! - **Retry**: bounded attempts over a fixed delay schedule
//! - **Poller**: restartable periodic execution that never overlaps itself
//! - **Single-flight**: one shared, memoized outcome for concurrent loads
//! - **Store**: copy-on-write cache with an optimistic update overlay
//! - **Selectors**: pure views over store snapshots
//! - **Sync**: load, poll, and optimistic mutations for the inbox query
//! - **Context**: explicit per-client ownership of the above

pub mod config;
pub mod context;
mod error;
pub mod poller;
pub mod retry;
pub mod selectors;
pub mod single_flight;
pub mod store;
pub mod sync;

pub use config::{RetryConfig, SyncConfig};
pub use context::{ContextRegistry, SyncContext};
pub use error::{ConfigError, SyncError};
pub use poller::Poller;
pub use retry::RetryPolicy;
pub use selectors::{
    QueryResult, inbox_notifications_result, select_inbox_notifications,
    select_thread_for_inbox_notification, select_unread_inbox_notifications_count,
    unread_inbox_notifications_count_result,
};
pub use single_flight::SingleFlight;
pub use store::{
    CacheState, CacheStore, OptimisticUpdate, OptimisticUpdateKind, QueryState, Subscription,
};
pub use sync::{INBOX_NOTIFICATIONS_QUERY, InboxNotificationsSync, MutationFailure, PollingGuard};
