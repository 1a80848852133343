//! Shared fixtures for engine tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use inboxsync_api::{
    ApiError, DeletedEntity, DeltaMeta, InboxApi, InboxNotification, InboxNotificationKind,
    InboxNotificationsDelta, Thread,
};

pub fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

/// Watermark returned when no response is queued.
pub fn default_requested_at() -> DateTime<Utc> {
    at("2024-05-01T00:00:00Z")
}

pub fn notification(id: &str) -> InboxNotification {
    InboxNotification {
        id: id.to_string(),
        kind: InboxNotificationKind::Thread {
            thread_id: format!("th_{id}"),
        },
        room_id: Some("room".to_string()),
        notified_at: at("2024-04-30T12:00:00Z"),
        read_at: None,
    }
}

pub fn thread(id: &str) -> Thread {
    Thread {
        id: id.to_string(),
        room_id: "room".to_string(),
        created_at: at("2024-04-30T11:00:00Z"),
        updated_at: None,
        metadata: Default::default(),
        comments: vec![],
    }
}

pub fn delta(
    notifications: Vec<InboxNotification>,
    deleted_notification_ids: &[&str],
    requested_at: DateTime<Utc>,
) -> InboxNotificationsDelta {
    InboxNotificationsDelta {
        threads: vec![],
        inbox_notifications: notifications,
        deleted_threads: vec![],
        deleted_inbox_notifications: deleted_notification_ids
            .iter()
            .map(|id| DeletedEntity {
                id: id.to_string(),
                deleted_at: requested_at,
            })
            .collect(),
        meta: DeltaMeta { requested_at },
    }
}

fn unavailable() -> ApiError {
    ApiError::Server {
        status: 503,
        message: "unavailable".to_string(),
    }
}

/// Scriptable in-memory transport.
#[derive(Default)]
pub struct MockInboxApi {
    pub fetch_calls: AtomicUsize,
    pub since_log: Mutex<Vec<Option<DateTime<Utc>>>>,
    responses: Mutex<VecDeque<InboxNotificationsDelta>>,
    pub fail_fetches: AtomicBool,
    pub fetch_delay: Mutex<Duration>,
    pub mutations: Mutex<Vec<String>>,
    pub fail_mutations: AtomicBool,
    pub mutation_delay: Mutex<Duration>,
}

impl MockInboxApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the response for the next successful fetch.
    pub fn push_response(&self, delta: InboxNotificationsDelta) {
        self.responses.lock().unwrap().push_back(delta);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn set_mutation_delay(&self, delay: Duration) {
        *self.mutation_delay.lock().unwrap() = delay;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn since_log(&self) -> Vec<Option<DateTime<Utc>>> {
        self.since_log.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    async fn mutate(&self, label: String) -> Result<(), ApiError> {
        let delay = *self.mutation_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.mutations.lock().unwrap().push(label);
        if self.fail_mutations.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl InboxApi for MockInboxApi {
    async fn get_inbox_notifications(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<InboxNotificationsDelta, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.since_log.lock().unwrap().push(since);

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        let queued = self.responses.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| delta(vec![], &[], default_requested_at())))
    }

    async fn mark_inbox_notification_as_read(&self, id: &str) -> Result<(), ApiError> {
        self.mutate(format!("read:{id}")).await
    }

    async fn mark_all_inbox_notifications_as_read(&self) -> Result<(), ApiError> {
        self.mutate("read:all".to_string()).await
    }

    async fn delete_inbox_notification(&self, id: &str) -> Result<(), ApiError> {
        self.mutate(format!("delete:{id}")).await
    }

    async fn delete_all_inbox_notifications(&self) -> Result<(), ApiError> {
        self.mutate("delete:all".to_string()).await
    }
}
