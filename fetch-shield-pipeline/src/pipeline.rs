//! The request pipeline: dedupe, then retry, then stale fallback.
//!
//! Stage order is fixed. Deduplication is outermost, so one attempt sequence
//! serves every concurrent caller of a signature. Inside it the retry
//! scheduler drives the transport, and only once the sequence is exhausted
//! does the stale cache get consulted.
//!
//! ```no_run
//! use fetch_shield_core::{Outcome, Request, Response, Transport, TransportError};
//! use fetch_shield_pipeline::RequestPipeline;
//!
//! # async fn example(transport: impl Transport + 'static) -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = RequestPipeline::builder(transport).max_attempts(3).build()?;
//!
//! match pipeline.execute(Request::get("/messages").build()).await? {
//!     Outcome::Fresh(response) => println!("fresh: {}", response.text()),
//!     Outcome::Stale { response, error, .. } => println!("stale ({error}): {}", response.text()),
//!     Outcome::Failed(error) => println!("failed: {error}"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::cache::{ResponseStore, StaleResponseCache};
use crate::config::PipelineConfig;
use crate::dedupe::{run_uncoordinated, DedupeCoordinator};
use crate::retry::{
    DelayStrategy, RetryContext, RetryError, RetryEvent, RetryObserver, RetryPolicy,
    RetryScheduler, TracingRetryObserver,
};
use fetch_shield_core::{
    Outcome, PipelineError, Request, RequestOptions, RequestSignature, Result, SignatureKey,
    Transport,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Resolved settings for one call.
#[derive(Debug, Clone)]
struct ExecutionPlan {
    policy: RetryPolicy,
    dedupe: bool,
    cache: bool,
}

struct PipelineInner {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    scheduler: RetryScheduler,
    store: Arc<dyn ResponseStore>,
    dedupe: DedupeCoordinator<Outcome>,
    dedupe_enabled: bool,
    cache_enabled: bool,
    retry_events: broadcast::Sender<RetryEvent>,
}

/// Resilient front for a [`Transport`]. Cheap to clone; clones share the
/// in-flight map, the stale cache and the retry channel.
#[derive(Clone)]
pub struct RequestPipeline {
    inner: Arc<PipelineInner>,
}

impl fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("policy", &self.inner.policy)
            .field("dedupe_enabled", &self.inner.dedupe_enabled)
            .field("cache_enabled", &self.inner.cache_enabled)
            .field("in_flight", &self.inner.dedupe.in_flight_count())
            .finish()
    }
}

impl RequestPipeline {
    /// Start configuring a pipeline around `transport`, with every setting at
    /// its [`PipelineConfig`] default.
    pub fn builder(transport: impl Transport + 'static) -> RequestPipelineBuilder {
        RequestPipelineBuilder::new(Arc::new(transport))
    }

    /// Same as [`builder`](Self::builder) for a transport that is already
    /// shared elsewhere.
    pub fn builder_shared(transport: Arc<dyn Transport>) -> RequestPipelineBuilder {
        RequestPipelineBuilder::new(transport)
    }

    /// Build straight from a loaded [`PipelineConfig`]. Fails with
    /// [`PipelineError::Configuration`] if the config does not validate.
    pub fn from_config(
        transport: impl Transport + 'static,
        config: &PipelineConfig,
    ) -> Result<Self> {
        Self::builder(transport).config(config).build()
    }

    /// Run `request` through the pipeline.
    ///
    /// Transport failures never surface as `Err`: they end up as
    /// [`Outcome::Stale`] or [`Outcome::Failed`]. `Err` is reserved for
    /// configuration problems, cancellation and a panicking sequence.
    pub async fn execute(&self, request: Request) -> Result<Outcome> {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but gives up with
    /// [`PipelineError::Cancelled`] once `cancel` fires.
    ///
    /// With deduplication on, `cancel` releases only this caller; the shared
    /// sequence keeps running while any other caller still waits on it.
    #[instrument(skip_all, fields(method = %request.method(), url = %request.url()))]
    pub async fn execute_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let signature = RequestSignature::compute(&request);
        let plan = self.inner.plan(request.options())?;
        let dedupe = plan.dedupe;

        let inner = Arc::clone(&self.inner);
        let request = Arc::new(request);
        let start = move |token: CancellationToken| async move {
            inner
                .run_attempt_sequence(request, signature, plan, token)
                .await
        };

        if dedupe {
            self.inner.dedupe.coordinate(signature, cancel, start).await
        } else {
            run_uncoordinated(cancel, start).await
        }
    }

    /// Receiver of every retry event emitted from now on.
    pub fn subscribe_retries(&self) -> broadcast::Receiver<RetryEvent> {
        self.inner.retry_events.subscribe()
    }

    /// The store that backs stale fallback.
    pub fn cache(&self) -> &Arc<dyn ResponseStore> {
        &self.inner.store
    }

    /// Signatures with an attempt sequence currently running.
    pub fn in_flight_count(&self) -> usize {
        self.inner.dedupe.in_flight_count()
    }

    /// Default retry policy; a request's `max_attempts` option overrides it.
    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Whether calls are deduplicated unless a request says otherwise.
    pub fn dedupe_enabled(&self) -> bool {
        self.inner.dedupe_enabled
    }

    /// Whether successes are cached and stale fallback is served unless a
    /// request says otherwise.
    pub fn cache_enabled(&self) -> bool {
        self.inner.cache_enabled
    }
}

impl PipelineInner {
    fn plan(&self, options: &RequestOptions) -> Result<ExecutionPlan> {
        let policy = match options.max_attempts {
            Some(max_attempts) => self.policy.with_max_attempts(max_attempts)?,
            None => self.policy.clone(),
        };

        Ok(ExecutionPlan {
            policy,
            dedupe: options.dedupe.unwrap_or(self.dedupe_enabled),
            cache: options.cache.unwrap_or(self.cache_enabled),
        })
    }

    async fn run_attempt_sequence(
        &self,
        request: Arc<Request>,
        signature: SignatureKey,
        plan: ExecutionPlan,
        cancel: CancellationToken,
    ) -> Result<Outcome> {
        let context = RetryContext::for_request(&request, signature);
        let result = self
            .scheduler
            .run(&context, &plan.policy, &cancel, |_attempt| {
                self.transport.send(&request)
            })
            .await;

        match result {
            Ok(response) => {
                let response = Arc::new(response);
                if plan.cache {
                    self.store.put(signature, Arc::clone(&response)).await;
                }
                Ok(Outcome::Fresh(response))
            }
            Err(RetryError::Cancelled { attempts }) => {
                debug!(signature = %signature.short(), attempts, "Attempt sequence cancelled");
                Err(PipelineError::Cancelled)
            }
            Err(RetryError::Exhausted {
                last_error,
                attempts,
            }) => {
                let error = Arc::new(last_error);
                if plan.cache {
                    if let Some(entry) = self.store.get(&signature).await {
                        warn!(
                            signature = %signature.short(),
                            attempts,
                            error = %error,
                            stored_at = %entry.stored_at,
                            "Serving stale response for {} {}",
                            context.method,
                            context.url
                        );
                        return Ok(Outcome::Stale {
                            response: entry.response,
                            error,
                            stored_at: entry.stored_at,
                        });
                    }
                }

                warn!(
                    signature = %signature.short(),
                    attempts,
                    error = %error,
                    "Request failed with nothing cached: {} {}",
                    context.method,
                    context.url
                );
                Ok(Outcome::Failed(error))
            }
        }
    }
}

/// Builder for [`RequestPipeline`].
pub struct RequestPipelineBuilder {
    transport: Arc<dyn Transport>,
    max_attempts: usize,
    delay: Arc<dyn DelayStrategy>,
    dedupe_enabled: bool,
    cache_enabled: bool,
    store: Option<Arc<dyn ResponseStore>>,
    observers: Vec<Arc<dyn RetryObserver>>,
    retry_channel_capacity: usize,
    log_retries: bool,
    config_error: Option<PipelineError>,
}

impl RequestPipelineBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            transport,
            max_attempts: defaults.max_attempts,
            delay: defaults.backoff.strategy(),
            dedupe_enabled: defaults.dedupe_enabled,
            cache_enabled: defaults.cache_enabled,
            store: None,
            observers: Vec::new(),
            retry_channel_capacity: defaults.retry_channel_capacity,
            log_retries: defaults.log_retries,
            config_error: None,
        }
    }

    /// Total attempts per sequence, including the first. Must be at least 1.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay strategy consulted before each retry.
    pub fn delay(mut self, delay: impl DelayStrategy + 'static) -> Self {
        self.delay = Arc::new(delay);
        self
    }

    /// Like [`delay`](Self::delay) for an already shared strategy, such as the
    /// one returned by [`BackoffConfig::strategy`](crate::BackoffConfig::strategy).
    pub fn delay_shared(mut self, delay: Arc<dyn DelayStrategy>) -> Self {
        self.delay = delay;
        self
    }

    /// Turn deduplication of concurrent identical calls on or off.
    pub fn dedupe(mut self, enabled: bool) -> Self {
        self.dedupe_enabled = enabled;
        self
    }

    /// Turn caching and stale fallback on or off.
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Replace the default in-memory [`StaleResponseCache`].
    pub fn store(mut self, store: Arc<dyn ResponseStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Add an observer notified before every retry. May be called repeatedly.
    pub fn observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Buffer size of the [`subscribe_retries`](RequestPipeline::subscribe_retries)
    /// channel. Must be at least 1.
    pub fn retry_channel_capacity(mut self, capacity: usize) -> Self {
        self.retry_channel_capacity = capacity;
        self
    }

    /// Log every retry through [`TracingRetryObserver`].
    pub fn log_retries(mut self, enabled: bool) -> Self {
        self.log_retries = enabled;
        self
    }

    /// Apply every setting from `config`. Validation errors surface from
    /// [`build`](Self::build).
    pub fn config(mut self, config: &PipelineConfig) -> Self {
        if let Err(error) = config.validate() {
            self.config_error = Some(error);
        }
        self.max_attempts = config.max_attempts;
        self.delay = config.backoff.strategy();
        self.dedupe_enabled = config.dedupe_enabled;
        self.cache_enabled = config.cache_enabled;
        self.retry_channel_capacity = config.retry_channel_capacity;
        self.log_retries = config.log_retries;
        self
    }

    /// Validate the settings and assemble the pipeline.
    pub fn build(self) -> Result<RequestPipeline> {
        if let Some(error) = self.config_error {
            return Err(error);
        }
        if self.retry_channel_capacity == 0 {
            return Err(PipelineError::configuration(
                "retry_channel_capacity must be at least 1",
            ));
        }

        let policy = RetryPolicy::from_shared(self.max_attempts, self.delay)?;
        let (retry_events, _) = broadcast::channel(self.retry_channel_capacity);

        let mut scheduler = RetryScheduler::new();
        if self.log_retries {
            scheduler.add_observer(Arc::new(TracingRetryObserver));
        }
        for observer in self.observers {
            scheduler.add_observer(observer);
        }
        scheduler.add_observer(Arc::new(retry_events.clone()));

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(StaleResponseCache::new()));

        debug!(
            max_attempts = policy.max_attempts(),
            dedupe = self.dedupe_enabled,
            cache = self.cache_enabled,
            "Request pipeline built"
        );

        Ok(RequestPipeline {
            inner: Arc::new(PipelineInner {
                transport: self.transport,
                policy,
                scheduler,
                store,
                dedupe: DedupeCoordinator::new(),
                dedupe_enabled: self.dedupe_enabled,
                cache_enabled: self.cache_enabled,
                retry_events,
            }),
        })
    }
}
