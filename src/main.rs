//! scrape-orchestrator
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                    FetchOrchestrator                     │
//!   GET /api/fetch│  ┌────────┐   ┌─────────────┐   ┌─────────────────────┐  │
//!   ──────────────┼─▶│ cache  │──▶│ single-     │──▶│ circuit breaker     │  │
//!                 │  │ (TTL)  │   │ flight      │   │ (per upstream host) │  │
//!                 │  └────────┘   └─────────────┘   └──────────┬──────────┘  │
//!                 │                                            ▼             │
//!                 │                                 ┌─────────────────────┐  │
//!                 │                                 │ retry policy        │  │
//!                 │                                 │  → task queue (FIFO)│  │
//!                 │                                 └──────────┬──────────┘  │
//!                 │                                            ▼             │
//!                 │  ┌───────────────┐              ┌─────────────────────┐  │   Upstream
//!                 │  │ proxy manager │─────────────▶│ worker pool         │──┼─▶ (via proxy)
//!                 │  │ + monitor     │  bindings    │ (sessions)          │  │
//!                 │  └───────────────┘              └─────────────────────┘  │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use scrape_orchestrator::config::{load_config, ConfigWatcher, OrchestratorConfig};
use scrape_orchestrator::lifecycle::{wait_for_signal, Shutdown};
use scrape_orchestrator::observability::{init_logging, init_metrics, MetricsSink, NoopMetrics, PrometheusMetrics};
use scrape_orchestrator::{FetchOrchestrator, HttpServer};

#[derive(Parser)]
#[command(name = "scrape-orchestrator")]
#[command(about = "Concurrent fetch orchestrator with proxy rotation, circuit breaking and caching")]
struct Args {
    /// TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the config file when it changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => OrchestratorConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("scrape-orchestrator v{} starting", env!("CARGO_PKG_VERSION"));

    let metrics: Arc<dyn MetricsSink> = if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
        Arc::new(PrometheusMetrics)
    } else {
        Arc::new(NoopMetrics)
    };

    let shutdown = Shutdown::new();
    let bind_address = config.listener.bind_address.clone();

    let orchestrator = FetchOrchestrator::builder(config)
        .metrics(metrics)
        .build(&shutdown)
        .await?;
    let maintenance = orchestrator.spawn_maintenance(&shutdown);

    // Keep the watcher alive for the lifetime of the process.
    let _watcher = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, mut reloads) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                while let Some(next) = reloads.recv().await {
                    if let Err(e) = orchestrator.replace_config(next).await {
                        tracing::error!(error = %e, "Rejected reloaded configuration");
                    }
                }
            });
            Some(watcher)
        }
        _ => None,
    };

    let listener = TcpListener::bind(&bind_address).await?;
    let server = HttpServer::new(orchestrator.clone());
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();

    match server_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
        Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
        Ok(Ok(())) => {}
    }
    for task in maintenance {
        let _ = task.await;
    }
    orchestrator.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
