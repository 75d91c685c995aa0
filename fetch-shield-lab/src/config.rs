use anyhow::Result;
use config::{Config as ConfigLoader, Environment, File};
use fetch_shield_core::{HttpMethod, Request};
use fetch_shield_http::HttpTransportConfig;
use fetch_shield_pipeline::PipelineConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub target: TargetConfig,
    pub pipeline: PipelineConfig,
    pub demo: DemoConfig,
}

/// The endpoint the lab hammers.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_url: String,
    pub method: HttpMethod,
    pub path: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub log_bodies: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Bursts to send before exiting.
    pub rounds: usize,
    /// Identical requests fired concurrently per burst.
    pub burst_size: usize,
    /// Pause between bursts.
    pub interval_ms: u64,
}

impl LabConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Layered load: `config/default`, `config/local`, an optional explicit
    /// file, then `FETCH_SHIELD__*` environment variables.
    pub fn load_from(extra: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = extra {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("FETCH_SHIELD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let lab: LabConfig = config.try_deserialize()?;
        lab.validate()?;
        Ok(lab)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.demo.burst_size == 0 {
            anyhow::bail!("demo.burst_size must be at least 1");
        }
        Ok(())
    }
}

impl TargetConfig {
    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig::new(self.base_url.clone())
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_logging(self.log_bodies)
    }

    pub fn request(&self) -> Request {
        Request::builder(self.method, self.path.clone()).build()
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3068".to_string(),
            method: HttpMethod::Get,
            path: "/messages".to_string(),
            timeout_ms: 5_000,
            connect_timeout_ms: 2_000,
            log_bodies: false,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            rounds: 5,
            burst_size: 3,
            interval_ms: 1_000,
        }
    }
}
