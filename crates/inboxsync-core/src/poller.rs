//! Restartable periodic execution.
//!
//! The next tick is armed only after the previous invocation settles, so
//! invocations never overlap. Invocation errors are logged and swallowed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::SyncError;

type PollFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), SyncError>> + Send + Sync>;

/// Handle to a running poll loop.
struct RunningPoller {
    shutdown_tx: watch::Sender<bool>,
}

/// Periodic executor with `stopped`/`running` states.
pub struct Poller {
    name: &'static str,
    callback: PollFn,
    running: Mutex<Option<RunningPoller>>,
    /// Held for the duration of each invocation, across restarts.
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl Poller {
    /// Create a stopped poller around `callback`.
    pub fn new<F>(name: &'static str, callback: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<(), SyncError>> + Send + Sync + 'static,
    {
        Self {
            name,
            callback: Arc::new(callback),
            running: Mutex::new(None),
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Start invoking the callback every `interval`. No-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, interval: Duration) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_loop(
            self.name,
            interval,
            Arc::clone(&self.callback),
            Arc::clone(&self.in_flight),
            shutdown_rx,
        ));

        debug!(poller = self.name, interval_ms = interval.as_millis() as u64, "poller started");
        *running = Some(RunningPoller { shutdown_tx });
    }

    /// Cancel the next scheduled invocation.
    ///
    /// An invocation already in flight runs to completion.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(running) = running {
            let _ = running.shutdown_tx.send(true);
            debug!(poller = self.name, "poller stopped");
        }
    }

    /// Whether the poller is in the `running` state.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    name: &'static str,
    interval: Duration,
    callback: PollFn,
    in_flight: Arc<tokio::sync::Mutex<()>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => break,
            _ = sleep(interval) => {}
        }

        let _guard = in_flight.lock().await;
        if *shutdown_rx.borrow() {
            break;
        }

        if let Err(e) = callback().await {
            warn!(poller = name, error = %e, "poll failed");
        }
    }

    debug!(poller = name, "poll loop exited");
}
