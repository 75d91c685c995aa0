//! Retry scheduling with caller-controlled backoff.
//!
//! The scheduler runs an attempt closure until it succeeds, the policy's
//! attempt budget is spent, or the caller cancels. Delays come entirely from
//! the policy's [`DelayStrategy`]; the scheduler adds no ceiling or jitter of
//! its own.
//!
//! Delay numbering follows the retry count: the wait before the first retry is
//! `delay(1)`, before the second `delay(2)`, and so on. A linear policy
//! `delay(n) = n * 250ms` therefore waits 250ms, then 500ms.
//!
//! # Example
//!
//! ```no_run
//! use fetch_shield_core::{HttpMethod, Request, RequestSignature, TransportError};
//! use fetch_shield_pipeline::retry::{LinearBackoff, RetryContext, RetryPolicy, RetryScheduler};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::new(3, LinearBackoff::new(Duration::from_millis(250)))?;
//! let request = Request::get("/messages").build();
//! let context = RetryContext::for_request(&request, RequestSignature::compute(&request));
//!
//! let value = RetryScheduler::new()
//!     .run(&context, &policy, &CancellationToken::new(), |_attempt| async {
//!         Ok::<_, TransportError>(42)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use fetch_shield_core::{
    Attempt, HttpMethod, PipelineError, Request, SignatureKey, TransportError,
};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Maps a 1-based retry number to the wait before that retry.
///
/// Implementations should be monotonically non-decreasing.
pub trait DelayStrategy: Send + Sync {
    fn delay(&self, retry: usize) -> Duration;
}

impl<F> DelayStrategy for F
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn delay(&self, retry: usize) -> Duration {
        self(retry)
    }
}

/// `delay(n) = interval * n`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    interval: Duration,
    max_delay: Option<Duration>,
}

impl LinearBackoff {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_delay: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }
}

impl DelayStrategy for LinearBackoff {
    fn delay(&self, retry: usize) -> Duration {
        let factor = u32::try_from(retry).unwrap_or(u32::MAX);
        let delay = self.interval.saturating_mul(factor);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// The same wait before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl DelayStrategy for ConstantBackoff {
    fn delay(&self, _retry: usize) -> Duration {
        self.delay
    }
}

/// `delay(n) = initial * multiplier^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            multiplier: multiplier.max(1.0),
            max_delay: max_delay.max(initial_delay),
        }
    }
}

impl DelayStrategy for ExponentialBackoff {
    fn delay(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as usize) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Attempt budget plus delay strategy.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Arc<dyn DelayStrategy>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Build a policy; `max_attempts` counts the first call, so it must be at
    /// least 1.
    pub fn new(
        max_attempts: usize,
        delay: impl DelayStrategy + 'static,
    ) -> Result<Self, PipelineError> {
        Self::from_shared(max_attempts, Arc::new(delay))
    }

    pub fn from_shared(
        max_attempts: usize,
        delay: Arc<dyn DelayStrategy>,
    ) -> Result<Self, PipelineError> {
        validate_max_attempts(max_attempts)?;
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Arc::new(ConstantBackoff::new(Duration::ZERO)),
        }
    }

    /// Same delay strategy, different attempt budget.
    pub fn with_max_attempts(&self, max_attempts: usize) -> Result<Self, PipelineError> {
        Self::from_shared(max_attempts, Arc::clone(&self.delay))
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn delay_for(&self, retry: usize) -> Duration {
        self.delay.delay(retry)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Arc::new(LinearBackoff::new(Duration::from_millis(250))),
        }
    }
}

pub(crate) fn validate_max_attempts(max_attempts: usize) -> Result<(), PipelineError> {
    if max_attempts == 0 {
        return Err(PipelineError::configuration(
            "max_attempts must be at least 1",
        ));
    }
    Ok(())
}

/// What the scheduler knows about the call it is retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    pub method: HttpMethod,
    pub url: String,
    pub signature: SignatureKey,
}

impl RetryContext {
    pub fn for_request(request: &Request, signature: SignatureKey) -> Self {
        Self {
            method: request.method(),
            url: request.url().to_string(),
            signature,
        }
    }
}

/// Emitted before each retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEvent {
    pub method: HttpMethod,
    pub url: String,
    pub signature: SignatureKey,
    /// 1-based retry number, equal to the attempt number about to run.
    pub attempt: usize,
    pub error: TransportError,
}

/// Fire-and-forget retry notification. Must return promptly.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, event: &RetryEvent);
}

/// Logs `"{method} {url} retry {n}"` for every retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRetryObserver;

impl RetryObserver for TracingRetryObserver {
    fn on_retry(&self, event: &RetryEvent) {
        info!(
            signature = %event.signature.short(),
            error = %event.error,
            "{} {} retry {}",
            event.method,
            event.url,
            event.attempt
        );
    }
}

impl RetryObserver for broadcast::Sender<RetryEvent> {
    fn on_retry(&self, event: &RetryEvent) {
        // No receivers is fine.
        let _ = self.send(event.clone());
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("Operation failed after {attempts} attempts: {last_error}")]
    Exhausted {
        last_error: TransportError,
        attempts: usize,
    },

    #[error("Retry loop cancelled after {attempts} completed attempts")]
    Cancelled { attempts: usize },
}

impl RetryError {
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => {
                *attempts
            }
        }
    }
}

/// Runs attempt sequences and notifies observers between attempts.
#[derive(Clone, Default)]
pub struct RetryScheduler {
    observers: Vec<Arc<dyn RetryObserver>>,
}

impl fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn RetryObserver>) {
        self.observers.push(observer);
    }

    /// Run `attempt(0)`, `attempt(1)`, ... until success or the budget is
    /// spent. Cancellation is honoured both while an attempt is running and
    /// while waiting out a delay; an interrupted attempt is not counted.
    pub async fn run<T, F, Fut>(
        &self,
        context: &RetryContext,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut current = Attempt::new(0);

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: current.sequence_number,
                });
            }

            debug!(
                signature = %context.signature.short(),
                "Attempt {}/{} for {} {}",
                current.sequence_number + 1,
                policy.max_attempts(),
                context.method,
                context.url
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled {
                        attempts: current.sequence_number,
                    });
                }
                result = attempt(current.sequence_number) => result,
            };

            let error = match result {
                Ok(value) => {
                    if !current.is_first() {
                        debug!(
                            signature = %context.signature.short(),
                            "Succeeded after {} retries",
                            current.sequence_number
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            current = current.failed(error.clone());
            let next = current.sequence_number + 1;
            if next >= policy.max_attempts() {
                warn!(
                    signature = %context.signature.short(),
                    error = ?current.error,
                    "Max retry attempts reached for {} {}",
                    context.method,
                    context.url
                );
                return Err(RetryError::Exhausted {
                    last_error: error,
                    attempts: next,
                });
            }

            let delay = policy.delay_for(next);
            self.notify(&RetryEvent {
                method: context.method,
                url: context.url.clone(),
                signature: context.signature,
                attempt: next,
                error,
            });

            debug!(
                signature = %context.signature.short(),
                failed_attempt = current.sequence_number,
                error = ?current.error,
                "Retrying after {:?}",
                delay
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: next });
                }
                _ = sleep(delay) => {}
            }

            current = Attempt::new(next);
        }
    }

    fn notify(&self, event: &RetryEvent) {
        for observer in &self.observers {
            if catch_unwind(AssertUnwindSafe(|| observer.on_retry(event))).is_err() {
                warn!(attempt = event.attempt, "Retry observer panicked; ignoring");
            }
        }
    }
}
