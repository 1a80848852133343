//! Pure derived views over a [`CacheState`] snapshot.
//!
//! Equal snapshots always produce equal results, so observers can suppress
//! redundant work by comparing outputs.

use inboxsync_api::{InboxNotification, Thread};

use crate::store::CacheState;
use crate::sync::INBOX_NOTIFICATIONS_QUERY;
use crate::SyncError;

/// Tri-state view of a query for non-blocking consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<T> {
    Loading,
    Error(SyncError),
    Ready(T),
}

impl<T> QueryResult<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryResult::Loading)
    }

    /// The data, if ready.
    pub fn data(&self) -> Option<&T> {
        match self {
            QueryResult::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
        match self {
            QueryResult::Loading => QueryResult::Loading,
            QueryResult::Error(e) => QueryResult::Error(e),
            QueryResult::Ready(data) => QueryResult::Ready(f(data)),
        }
    }
}

/// Effective notifications, newest first. Ties are broken by id.
pub fn select_inbox_notifications(state: &CacheState) -> Vec<InboxNotification> {
    let mut notifications: Vec<InboxNotification> = state
        .effective_inbox_notifications()
        .into_values()
        .collect();
    notifications.sort_by(|a, b| {
        b.notified_at
            .cmp(&a.notified_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    notifications
}

/// Number of effective notifications with no `read_at`.
pub fn select_unread_inbox_notifications_count(state: &CacheState) -> usize {
    state
        .effective_inbox_notifications()
        .values()
        .filter(|notification| !notification.is_read())
        .count()
}

fn query_result<T>(state: &CacheState, select: impl FnOnce(&CacheState) -> T) -> QueryResult<T> {
    match state.query(INBOX_NOTIFICATIONS_QUERY) {
        None => QueryResult::Loading,
        Some(query) if query.is_loading => QueryResult::Loading,
        Some(query) => match &query.error {
            Some(error) => QueryResult::Error(error.clone()),
            None => QueryResult::Ready(select(state)),
        },
    }
}

/// Notifications as a tri-state result.
pub fn inbox_notifications_result(state: &CacheState) -> QueryResult<Vec<InboxNotification>> {
    query_result(state, select_inbox_notifications)
}

/// Unread count as a tri-state result.
pub fn unread_inbox_notifications_count_result(state: &CacheState) -> QueryResult<usize> {
    query_result(state, select_unread_inbox_notifications_count)
}

/// The thread a notification points at.
///
/// Fails when the notification is unknown, is not a thread notification, or
/// its thread is not cached. These indicate caller misuse and are not retried.
pub fn select_thread_for_inbox_notification(
    state: &CacheState,
    inbox_notification_id: &str,
) -> Result<Thread, SyncError> {
    let effective = state.effective_inbox_notifications();
    let notification = effective
        .get(inbox_notification_id)
        .ok_or_else(|| SyncError::NotificationNotFound(inbox_notification_id.to_string()))?;

    let thread_id = notification
        .thread_id()
        .ok_or_else(|| SyncError::NotAThreadNotification(inbox_notification_id.to_string()))?;

    state
        .threads
        .get(thread_id)
        .cloned()
        .ok_or_else(|| SyncError::ThreadNotFound(thread_id.to_string()))
}
