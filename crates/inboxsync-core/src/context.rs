//! Per-client ownership of the sync subsystems.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use inboxsync_api::InboxApi;

use crate::config::SyncConfig;
use crate::store::CacheStore;
use crate::sync::InboxNotificationsSync;

/// Everything one client session needs: its cache and its sync engine.
pub struct SyncContext {
    client_id: String,
    store: Arc<CacheStore>,
    sync: InboxNotificationsSync,
}

impl SyncContext {
    /// Build a fresh context with an empty store.
    pub fn new(client_id: impl Into<String>, api: Arc<dyn InboxApi>, config: &SyncConfig) -> Self {
        let store = CacheStore::new();
        let sync = InboxNotificationsSync::new(api, Arc::clone(&store), config);
        Self {
            client_id: client_id.into(),
            store,
            sync,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn sync(&self) -> &InboxNotificationsSync {
        &self.sync
    }

    /// Stop background work. The store stays readable.
    pub fn shutdown(&self) {
        self.sync.shutdown();
    }
}

/// Explicit map from client identity to its context.
pub struct ContextRegistry {
    config: SyncConfig,
    contexts: DashMap<String, Arc<SyncContext>>,
}

impl ContextRegistry {
    /// Contexts created by this registry share `config`.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            contexts: DashMap::new(),
        }
    }

    /// The context for `client_id`, created with the api from `make_api` on first use.
    pub fn get_or_create<F>(&self, client_id: &str, make_api: F) -> Arc<SyncContext>
    where
        F: FnOnce() -> Arc<dyn InboxApi>,
    {
        let entry = self
            .contexts
            .entry(client_id.to_string())
            .or_insert_with(|| {
                info!(client_id, "creating sync context");
                Arc::new(SyncContext::new(client_id, make_api(), &self.config))
            });
        Arc::clone(entry.value())
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<SyncContext>> {
        self.contexts
            .get(client_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and shut down the context for `client_id`.
    pub fn remove(&self, client_id: &str) -> Option<Arc<SyncContext>> {
        let (_, context) = self.contexts.remove(client_id)?;
        context.shutdown();
        info!(client_id, "removed sync context");
        Some(context)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
