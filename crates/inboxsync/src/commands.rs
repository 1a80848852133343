//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use miette::{Result, miette};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use inboxsync_api::{HttpInboxClient, InboxNotification, InboxNotificationKind};
use inboxsync_core::{
    ConfigError, InboxNotificationsSync, QueryResult, SyncConfig, SyncContext, SyncError,
    select_inbox_notifications, unread_inbox_notifications_count_result,
};

use crate::ConnectionArgs;

/// Layer configuration: defaults, then the optional TOML file, then flags.
pub fn build_config(args: &ConnectionArgs) -> Result<SyncConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };

    if let Some(secs) = args.poll_interval {
        config.poll_interval_ms = Duration::from_secs(secs).as_millis() as u64;
    }

    config.validate()?;
    Ok(config)
}

/// Build the per-session context for the configured API.
pub fn connect(args: &ConnectionArgs) -> Result<SyncContext> {
    let config = build_config(args).map_err(|e| miette!("{}", e))?;
    let client = HttpInboxClient::new(&args.base_url, &args.token).map_err(|e| miette!("{}", e))?;

    let client_id = client.base_url().to_string();
    info!(base_url = %client_id, "connecting to inbox API");
    Ok(SyncContext::new(client_id, Arc::new(client), &config))
}

async fn load(sync: &InboxNotificationsSync) -> Result<()> {
    sync.ensure_loaded()
        .await
        .map_err(|e| miette!("failed to load inbox notifications: {}", e))
}

/// One line per notification: unread marker, id, time, subject.
pub fn format_notification(notification: &InboxNotification) -> String {
    let marker = if notification.is_read() { ' ' } else { '*' };
    let subject = match &notification.kind {
        InboxNotificationKind::Thread { thread_id } => format!("thread {thread_id}"),
        InboxNotificationKind::Custom { kind, subject_id } => format!("{kind} {subject_id}"),
    };
    let room = notification.room_id.as_deref().unwrap_or("-");

    format!(
        "{marker} {}  {}  {room}  {subject}",
        notification.id,
        notification.notified_at.format("%Y-%m-%d %H:%M"),
    )
}

pub async fn list(context: &SyncContext, json: bool, unread_only: bool) -> Result<()> {
    load(context.sync()).await?;

    let notifications: Vec<InboxNotification> = select_inbox_notifications(&context.store().get())
        .into_iter()
        .filter(|n| !unread_only || !n.is_read())
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&notifications).map_err(|e| miette!("{}", e))?;
        println!("{out}");
        return Ok(());
    }

    if notifications.is_empty() {
        println!("No inbox notifications.");
        return Ok(());
    }
    for notification in &notifications {
        println!("{}", format_notification(notification));
    }
    Ok(())
}

pub async fn watch(context: &SyncContext) -> Result<()> {
    let sync = context.sync();
    let _polling = sync.polling_guard();
    let mut changes = context.store().watch();
    let mut last: Option<QueryResult<usize>> = None;

    info!("watching inbox notifications, press Ctrl-C to stop");

    loop {
        let current = unread_inbox_notifications_count_result(&changes.borrow_and_update());
        if last.as_ref() != Some(&current) {
            match &current {
                QueryResult::Loading => println!("loading..."),
                QueryResult::Error(e) => warn!(error = %e, "inbox notifications unavailable"),
                QueryResult::Ready(count) => println!("unread: {count}"),
            }
            last = Some(current);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl-C, stopping");
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Run a mutation to completion and turn a rollback into an error.
async fn settle(
    sync: &InboxNotificationsSync,
    label: &str,
    start: impl FnOnce(&InboxNotificationsSync) -> JoinHandle<()>,
) -> Result<()> {
    let mut failures = sync.mutation_errors();
    start(sync)
        .await
        .map_err(|e| miette!("{} task failed: {}", label, e))?;

    match failures.try_recv() {
        Ok(failure) => Err(miette!("{} failed: {}", label, failure.error)),
        Err(_) => {
            println!("{label}: done");
            Ok(())
        }
    }
}

fn require_notification(sync: &InboxNotificationsSync, id: &str) -> Result<()> {
    let known = sync
        .store()
        .get()
        .effective_inbox_notifications()
        .contains_key(id);
    if known {
        Ok(())
    } else {
        Err(miette!("{}", SyncError::NotificationNotFound(id.to_string())))
    }
}

pub async fn mark_read(context: &SyncContext, id: &str) -> Result<()> {
    let sync = context.sync();
    load(sync).await?;
    require_notification(sync, id)?;
    settle(sync, "mark-read", |sync| sync.mark_one_read(id)).await
}

pub async fn mark_all_read(context: &SyncContext) -> Result<()> {
    let sync = context.sync();
    load(sync).await?;
    settle(sync, "mark-all-read", InboxNotificationsSync::mark_all_read).await
}

pub async fn delete(context: &SyncContext, id: &str) -> Result<()> {
    let sync = context.sync();
    load(sync).await?;
    require_notification(sync, id)?;
    settle(sync, "delete", |sync| sync.delete_one(id)).await
}

pub async fn delete_all(context: &SyncContext) -> Result<()> {
    let sync = context.sync();
    load(sync).await?;
    settle(sync, "delete-all", InboxNotificationsSync::delete_all).await
}
