//! # fetch-shield pipeline
//!
//! Wraps an unreliable [`Transport`](fetch_shield_core::Transport) in three
//! stages, applied in a fixed order:
//!
//! 1. **Dedupe**: concurrent calls with the same request signature share one
//!    attempt sequence and receive the same payload.
//! 2. **Retry**: failed attempts are retried up to a budget, waiting out a
//!    caller-supplied backoff between them.
//! 3. **Stale fallback**: when every attempt fails, the last successful
//!    response for the signature is returned alongside the final error.
//!
//! Start with [`RequestPipeline::builder`] or [`RequestPipeline::from_config`].

pub mod cache;
pub mod config;
pub mod dedupe;
pub mod pipeline;
pub mod retry;

pub use cache::{CacheEntry, CacheStatistics, ResponseStore, StaleResponseCache};
pub use config::{BackoffConfig, PipelineConfig};
pub use dedupe::DedupeCoordinator;
pub use pipeline::{RequestPipeline, RequestPipelineBuilder};
pub use retry::{
    ConstantBackoff, DelayStrategy, ExponentialBackoff, LinearBackoff, RetryContext, RetryError,
    RetryEvent, RetryObserver, RetryPolicy, RetryScheduler, TracingRetryObserver,
};
