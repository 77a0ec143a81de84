//! Binary entry point. `init_tracing` via `tracing_subscriber::registry()`
//! + `EnvFilter`, mixed scheduling model on top of a single
//! `#[tokio::main]` runtime plus a dedicated worker thread for the scanner
//! loop.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use driftwatch_backend::broadcast::BroadcastSink;
use driftwatch_backend::chart::{CachingChartCapture, HttpChartCapture};
use driftwatch_backend::config::Settings;
use driftwatch_backend::lending::{HttpLendingPoolClient, Sentinel};
use driftwatch_backend::orchestrator::{self, Orchestrator};
use driftwatch_backend::store::Store;
use driftwatch_backend::telegram::LoggingNotifier;
use driftwatch_backend::vision::{HttpVisionClient, RateLimitedVisionClient};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driftwatch_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Arc::new(Settings::from_env().context("load settings")?);
    tracing::info!(mode_live = settings.mode_live, "driftwatch starting");

    let store = Store::open(&settings.database_path).context("open store")?;
    let broadcast = BroadcastSink::new();

    // Vision-AI overlay: only wired when enabled and both collaborator
    // endpoints are configured; `run_scanner_cycle` falls back to scoring on
    // `statistics_score` alone otherwise.
    let (chart, vision) = if settings.vision_enabled
        && !settings.chart_capture_base_url.is_empty()
        && !settings.vision_api_base_url.is_empty()
    {
        let chart_inner = Arc::new(HttpChartCapture::new(
            settings.chart_capture_base_url.clone(),
            settings.http_timeout(),
        ));
        let chart = Arc::new(CachingChartCapture::new(
            chart_inner,
            std::time::Duration::from_secs(settings.vision_cache_ttl_secs),
        ));
        let vision_inner = Arc::new(HttpVisionClient::new(
            settings.vision_api_base_url.clone(),
            settings.http_timeout(),
        ));
        let vision = Arc::new(RateLimitedVisionClient::new(
            vision_inner,
            settings.vision_requests_per_minute,
            std::time::Duration::from_secs(settings.vision_cache_ttl_secs),
        ));
        (Some(chart), Some(vision))
    } else {
        (None, None)
    };

    // No signers configured by default: live trading requires wiring a
    // concrete `ChainSigner` for at least one chain. PAPER mode (the
    // default) never touches them.
    let orchestrator = Arc::new(Orchestrator::with_vision_pipeline(
        settings.clone(),
        store.clone(),
        broadcast.clone(),
        None,
        None,
        chart,
        vision,
    ));

    // Lending sentinel: only spawned when enabled and a pool endpoint is
    // configured. Runs on thread A (this runtime) alongside the price loop,
    // not on its own OS thread, since both are bounded, cooperative loops.
    if settings.lending_enabled && !settings.lending_pool_base_url.is_empty() {
        let pool = Arc::new(HttpLendingPoolClient::new(
            settings.lending_pool_base_url.clone(),
            settings.http_timeout(),
        ));
        let notifier = Arc::new(LoggingNotifier);
        let sentinel = Arc::new(Sentinel::new(settings.clone(), pool, notifier));
        tokio::spawn(sentinel.run());
    }

    let scanner_orchestrator = orchestrator.clone();
    std::thread::Builder::new()
        .name("scanner".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build scanner runtime");
            runtime.block_on(orchestrator::scanner_loop(scanner_orchestrator));
        })
        .context("spawn scanner thread")?;

    tokio::spawn(orchestrator::price_loop(orchestrator.clone()));

    let app = driftwatch_backend::api::router(orchestrator.clone());
    let addr = format!("{}:{}", settings.api_host, settings.api_port);
    let listener = TcpListener::bind(&addr).await.context("bind http listener")?;
    tracing::info!(%addr, "driftwatch listening");
    axum::serve(listener, app).await.context("http server error")?;

    Ok(())
}
