//! Shared, memoized async load.
//!
//! The first caller starts the producer; everyone else, concurrent or later,
//! awaits the same [`Shared`] future and observes the same outcome. Failures
//! are memoized too, until [`SingleFlight::reset`] re-arms the slot.

use std::sync::{Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::trace;

type Producer<T, E> = Box<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

type SharedLoad<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Deduplicating wrapper around an async producer.
///
/// Two adapters read the same slot: [`get`](Self::get) blocks until the
/// outcome is known, [`start`](Self::start) + [`peek`](Self::peek) never block.
pub struct SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    producer: Producer<T, E>,
    slot: Mutex<Option<SharedLoad<T, E>>>,
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Wrap a producer. Nothing runs until the first `get` or `start`.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static,
    {
        Self {
            producer: Box::new(producer),
            slot: Mutex::new(None),
        }
    }

    /// The current attempt, creating it if the slot is empty.
    fn shared(&self) -> SharedLoad<T, E> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| {
            trace!("single-flight producer invoked");
            (self.producer)().shared()
        })
        .clone()
    }

    /// Await the memoized outcome, starting the producer if needed.
    pub async fn get(&self) -> Result<T, E> {
        self.shared().await
    }

    /// Start the producer on a background task without waiting for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let shared = self.shared();
        if shared.peek().is_none() {
            tokio::spawn(async move {
                let _ = shared.await;
            });
        }
    }

    /// The outcome if the current attempt has settled; `None` while pending or never started.
    pub fn peek(&self) -> Option<Result<T, E>> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().and_then(|shared| shared.peek().cloned())
    }

    /// Whether an attempt exists (pending or settled).
    pub fn is_started(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Forget the memoized attempt so the next caller invokes the producer again.
    ///
    /// Callers already awaiting the old attempt still receive its outcome.
    pub fn reset(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
