//! fetch-shield HTTP transport
//!
//! A [`Transport`](fetch_shield_core::Transport) built on `reqwest`, for use
//! underneath a [`RequestPipeline`](https://docs.rs/fetch-shield-pipeline).
//! It performs exactly one HTTP exchange per call; retries, deduplication and
//! stale fallback are the pipeline's job.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fetch_shield_core::Request;
//! use fetch_shield_http::{HttpTransport, HttpTransportConfig};
//! use fetch_shield_pipeline::RequestPipeline;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HttpTransportConfig::new("http://127.0.0.1:3068")
//!         .with_timeout(Duration::from_secs(5));
//!     let transport = HttpTransport::new(config)?;
//!
//!     let pipeline = RequestPipeline::builder(transport).max_attempts(3).build()?;
//!     let outcome = pipeline.execute(Request::get("/messages").build()).await?;
//!     println!("{}: {:?}", outcome.kind(), outcome.response().map(|r| r.text()));
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod transport;

pub use config::{AuthConfig, HttpTransportConfig, HttpTransportConfigBuilder};
pub use error::{HttpError, HttpResult};
pub use transport::HttpTransport;
