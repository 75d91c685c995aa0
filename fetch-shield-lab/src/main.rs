use anyhow::Result;
use fetch_shield_core::{Outcome, PipelineError, Request};
use fetch_shield_http::HttpTransport;
use fetch_shield_pipeline::RequestPipeline;
use futures::future::join_all;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fetch_shield_lab=info,fetch_shield_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fetch-shield lab");

    // Load configuration
    let config = config::LabConfig::load()?;
    tracing::info!(
        target_url = %config.target.base_url,
        path = %config.target.path,
        max_attempts = config.pipeline.max_attempts,
        "Configuration loaded"
    );

    let transport = HttpTransport::new(config.target.transport_config())?;
    let pipeline = RequestPipeline::from_config(transport, &config.pipeline)?;
    let mut retries = pipeline.subscribe_retries();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping");
            signal.cancel();
        }
    });

    let request = config.target.request();
    let interval = Duration::from_millis(config.demo.interval_ms);
    let mut total_retries = 0usize;

    for round in 1..=config.demo.rounds {
        let burst = (0..config.demo.burst_size)
            .map(|_| pipeline.execute_with_cancel(request.clone(), &shutdown));
        let results = join_all(burst).await;

        for result in &results {
            report(round, &request, result);
        }
        while retries.try_recv().is_ok() {
            total_retries += 1;
        }

        if shutdown.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    let stats = pipeline.cache().statistics().await;
    tracing::info!(
        retries = total_retries,
        cached = stats.current_entries,
        cache_writes = stats.writes,
        cache_hits = stats.hits,
        "Lab finished"
    );

    Ok(())
}

fn report(round: usize, request: &Request, result: &Result<Outcome, PipelineError>) {
    match result {
        Ok(Outcome::Fresh(response)) => tracing::info!(
            round,
            status = response.status,
            from_cache = false,
            "{} {} data: {}",
            request.method(),
            request.url(),
            response.text()
        ),
        Ok(Outcome::Stale {
            response,
            error,
            stored_at,
        }) => tracing::warn!(
            round,
            from_cache = true,
            %stored_at,
            %error,
            "{} {} data: {}",
            request.method(),
            request.url(),
            response.text()
        ),
        Ok(Outcome::Failed(error)) => tracing::error!(
            round,
            from_cache = false,
            "{} {} error: {}",
            request.method(),
            request.url(),
            error
        ),
        Err(PipelineError::Cancelled) => tracing::info!(round, "Request cancelled"),
        Err(e) => tracing::error!(round, "Pipeline error: {}", e),
    }
}
