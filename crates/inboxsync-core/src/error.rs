//! Error types for the sync engine.

use std::sync::Arc;

use inboxsync_api::ApiError;
use thiserror::Error;

/// Errors produced by the sync engine and its selectors.
///
/// Cloneable so that one failed load can be replayed to every caller that
/// joined it and recorded in query state at the same time.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The transport failed (network, auth, server).
    #[error("transport error: {0}")]
    Transport(Arc<ApiError>),

    /// No inbox notification with this id is cached.
    #[error("inbox notification not found: {0}")]
    NotificationNotFound(String),

    /// The inbox notification exists but is not about a thread.
    #[error("inbox notification {0} is not a thread notification")]
    NotAThreadNotification(String),

    /// The thread referenced by a notification is not cached.
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    /// The engine was dropped while the operation was pending.
    #[error("sync engine has been shut down")]
    Closed,
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        SyncError::Transport(Arc::new(err))
    }
}

impl SyncError {
    /// Whether the failure came from a transport error worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transport(err) if err.is_transient())
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Transport errors are equal only when they are the same recorded failure.
            (SyncError::Transport(a), SyncError::Transport(b)) => Arc::ptr_eq(a, b),
            (SyncError::NotificationNotFound(a), SyncError::NotificationNotFound(b)) => a == b,
            (SyncError::NotAThreadNotification(a), SyncError::NotAThreadNotification(b)) => a == b,
            (SyncError::ThreadNotFound(a), SyncError::ThreadNotFound(b)) => a == b,
            (SyncError::Closed, SyncError::Closed) => true,
            _ => false,
        }
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config file failed.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
