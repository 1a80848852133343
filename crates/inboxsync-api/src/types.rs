//! Wire and entity types for inbox notifications and threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire value of `kind` for notifications about a thread.
pub const THREAD_NOTIFICATION_KIND: &str = "thread";

/// A comment thread attached to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub room_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// A single comment inside a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// What an inbox notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InboxNotificationKind {
    /// Activity on a comment thread.
    Thread { thread_id: String },
    /// Application-defined notification.
    Custom { kind: String, subject_id: String },
}

/// A notification in the current user's inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInboxNotification", into = "RawInboxNotification")]
pub struct InboxNotification {
    pub id: String,
    pub kind: InboxNotificationKind,
    pub room_id: Option<String>,
    pub notified_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl InboxNotification {
    /// Whether the notification has been read.
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// The referenced thread, for thread notifications.
    pub fn thread_id(&self) -> Option<&str> {
        match &self.kind {
            InboxNotificationKind::Thread { thread_id } => Some(thread_id),
            InboxNotificationKind::Custom { .. } => None,
        }
    }
}

/// Flat wire shape of an inbox notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInboxNotification {
    id: String,
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    room_id: Option<String>,
    notified_at: DateTime<Utc>,
    #[serde(default)]
    read_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawInboxNotification> for InboxNotification {
    type Error = String;

    fn try_from(raw: RawInboxNotification) -> Result<Self, Self::Error> {
        let kind = if raw.kind == THREAD_NOTIFICATION_KIND {
            let thread_id = raw
                .thread_id
                .ok_or_else(|| format!("thread notification {} has no threadId", raw.id))?;
            InboxNotificationKind::Thread { thread_id }
        } else {
            let subject_id = raw
                .subject_id
                .ok_or_else(|| format!("custom notification {} has no subjectId", raw.id))?;
            InboxNotificationKind::Custom {
                kind: raw.kind,
                subject_id,
            }
        };

        Ok(Self {
            id: raw.id,
            kind,
            room_id: raw.room_id,
            notified_at: raw.notified_at,
            read_at: raw.read_at,
        })
    }
}

impl From<InboxNotification> for RawInboxNotification {
    fn from(notification: InboxNotification) -> Self {
        let (kind, thread_id, subject_id) = match notification.kind {
            InboxNotificationKind::Thread { thread_id } => {
                (THREAD_NOTIFICATION_KIND.to_string(), Some(thread_id), None)
            }
            InboxNotificationKind::Custom { kind, subject_id } => (kind, None, Some(subject_id)),
        };

        Self {
            id: notification.id,
            kind,
            thread_id,
            subject_id,
            room_id: notification.room_id,
            notified_at: notification.notified_at,
            read_at: notification.read_at,
        }
    }
}

/// Tombstone for an entity removed on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedEntity {
    pub id: String,
    pub deleted_at: DateTime<Utc>,
}

/// Metadata attached to a delta response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaMeta {
    /// Server watermark for this response; pass it back as `since`.
    pub requested_at: DateTime<Utc>,
}

/// Response from fetching inbox notifications, optionally since a watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxNotificationsDelta {
    #[serde(default)]
    pub threads: Vec<Thread>,
    #[serde(default)]
    pub inbox_notifications: Vec<InboxNotification>,
    #[serde(default)]
    pub deleted_threads: Vec<DeletedEntity>,
    #[serde(default)]
    pub deleted_inbox_notifications: Vec<DeletedEntity>,
    pub meta: DeltaMeta,
}
