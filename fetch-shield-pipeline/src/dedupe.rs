//! Coalescing of concurrent identical calls.
//!
//! The coordinator keeps an arena of signature → in-flight entry records. The
//! first caller for a signature creates the entry and launches the attempt
//! sequence on its own task; later callers with the same signature subscribe
//! to that entry and wait for its result instead of starting another
//! sequence. Once the sequence resolves, the entry is removed and the result
//! is published to every subscriber. Deduplication covers overlap only: a
//! call arriving after completion starts afresh.
//!
//! # Subscriber cancellation
//!
//! A subscriber that stops waiting (its future is dropped, or its
//! `CancellationToken` fires) leaves without disturbing anyone else. If it was
//! the last subscriber and the sequence has not resolved yet, the entry is
//! removed and the sequence's own cancellation token is fired, so nobody keeps
//! paying for work nobody is waiting on.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fetch_shield_core::{PipelineError, SignatureKey};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type SharedResult<T> = Result<T, PipelineError>;

struct InFlightEntry<T> {
    signature: SignatureKey,
    subscribers: AtomicUsize,
    cancel: CancellationToken,
    result: watch::Receiver<Option<SharedResult<T>>>,
}

impl<T> InFlightEntry<T> {
    fn is_resolved(&self) -> bool {
        self.result.borrow().is_some()
    }
}

type InFlightMap<T> = DashMap<SignatureKey, Arc<InFlightEntry<T>>>;

/// Shares one attempt sequence among all concurrent callers of a signature.
pub struct DedupeCoordinator<T> {
    in_flight: Arc<InFlightMap<T>>,
}

impl<T> Clone for DedupeCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<T> fmt::Debug for DedupeCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupeCoordinator")
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl<T> Default for DedupeCoordinator<T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
        }
    }
}

impl<T> DedupeCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// An empty coordinator. Clones share the same in-flight arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of signatures with an attempt sequence currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether an attempt sequence for `signature` is currently running.
    pub fn is_in_flight(&self, signature: &SignatureKey) -> bool {
        self.in_flight.contains_key(signature)
    }

    /// Callers currently waiting on the entry for `signature`, or `None` when
    /// nothing is in flight for it.
    pub fn subscriber_count(&self, signature: &SignatureKey) -> Option<usize> {
        self.in_flight
            .get(signature)
            .map(|entry| entry.subscribers.load(Ordering::SeqCst))
    }

    /// Join the in-flight sequence for `signature`, or start one with `start`.
    ///
    /// `start` runs at most once per in-flight window, on a spawned task, and
    /// receives the token that fires if every subscriber leaves. A panic in
    /// `start` or in the future it returns is delivered to all subscribers as
    /// [`PipelineError::AttemptPanicked`]. `cancel` only governs this caller's
    /// wait.
    pub async fn coordinate<F, Fut>(
        &self,
        signature: SignatureKey,
        cancel: &CancellationToken,
        start: F,
    ) -> SharedResult<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = SharedResult<T>> + Send + 'static,
    {
        let (entry, sender) = self.join_or_create(signature);
        let _subscription = Subscription {
            in_flight: Arc::clone(&self.in_flight),
            entry: Arc::clone(&entry),
        };

        if let Some(sender) = sender {
            self.launch(Arc::clone(&entry), sender, start);
        }

        let mut result = entry.result.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(signature = %signature.short(), "Subscriber cancelled while waiting");
                Err(PipelineError::Cancelled)
            }
            outcome = wait_for_result(&mut result) => outcome,
        }
    }

    fn join_or_create(
        &self,
        signature: SignatureKey,
    ) -> (
        Arc<InFlightEntry<T>>,
        Option<watch::Sender<Option<SharedResult<T>>>>,
    ) {
        // The shard lock is held only inside this match; `start` runs later.
        match self.in_flight.entry(signature) {
            Entry::Occupied(occupied) => {
                let entry = Arc::clone(occupied.get());
                let subscribers = entry.subscribers.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    signature = %signature.short(),
                    subscribers,
                    "Joined in-flight request"
                );
                (entry, None)
            }
            Entry::Vacant(vacant) => {
                let (sender, receiver) = watch::channel(None);
                let entry = Arc::new(InFlightEntry {
                    signature,
                    subscribers: AtomicUsize::new(1),
                    cancel: CancellationToken::new(),
                    result: receiver,
                });
                vacant.insert(Arc::clone(&entry));
                debug!(signature = %signature.short(), "Started new attempt sequence");
                (entry, Some(sender))
            }
        }
    }

    fn launch<F, Fut>(
        &self,
        entry: Arc<InFlightEntry<T>>,
        sender: watch::Sender<Option<SharedResult<T>>>,
        start: F,
    ) where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = SharedResult<T>> + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        let token = entry.cancel.clone();

        tokio::spawn(async move {
            let result = run_guarded(token, start).await;

            in_flight.remove_if(&entry.signature, |_, current| Arc::ptr_eq(current, &entry));
            debug!(
                signature = %entry.signature.short(),
                ok = result.is_ok(),
                "Attempt sequence resolved"
            );
            sender.send_replace(Some(result));
        });
    }
}

/// Run an attempt sequence without coordination, with the same panic
/// handling as a coordinated one.
pub async fn run_uncoordinated<T, F, Fut>(cancel: &CancellationToken, start: F) -> SharedResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = SharedResult<T>>,
{
    run_guarded(cancel.clone(), start).await
}

async fn run_guarded<T, F, Fut>(token: CancellationToken, start: F) -> SharedResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = SharedResult<T>>,
{
    match catch_unwind(AssertUnwindSafe(|| start(token))) {
        Ok(future) => AssertUnwindSafe(future)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panicked(payload))),
        Err(payload) => Err(panicked(payload)),
    }
}

async fn wait_for_result<T: Clone>(
    receiver: &mut watch::Receiver<Option<SharedResult<T>>>,
) -> SharedResult<T> {
    match receiver.wait_for(Option::is_some).await {
        Ok(value) => {
            let shared = (*value).clone();
            shared.unwrap_or(Err(PipelineError::Aborted))
        }
        // Sender dropped without publishing: the task was torn down.
        Err(_) => Err(PipelineError::Aborted),
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> PipelineError {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };
    PipelineError::AttemptPanicked(message)
}

/// Held by each waiting caller; leaving decrements the subscriber count.
struct Subscription<T> {
    in_flight: Arc<InFlightMap<T>>,
    entry: Arc<InFlightEntry<T>>,
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if self.entry.subscribers.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        if self.entry.is_resolved() {
            return;
        }

        // A caller may have joined between the decrement and here; the
        // predicate runs under the shard lock, so re-check the count.
        let entry = &self.entry;
        let removed = self.in_flight.remove_if(&entry.signature, |_, current| {
            Arc::ptr_eq(current, entry) && current.subscribers.load(Ordering::SeqCst) == 0
        });
        if removed.is_some() {
            debug!(
                signature = %entry.signature.short(),
                "Last subscriber left; cancelling attempt sequence"
            );
            entry.cancel.cancel();
        }
    }
}
