//! Federation gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                  FEDERATION GATEWAY                  │
//!                     │                                                      │
//!   Client Request    │  ┌─────────┐   ┌─────────┐   ┌──────────┐            │
//!   ──────────────────┼─▶│  http   │──▶│ planner │──▶│ executor │──┬─────────┼──▶ Subgraph A
//!                     │  │ server  │   └─────────┘   └────┬─────┘  │         │
//!                     │  └────┬────┘                      │        └─────────┼──▶ Subgraph B
//!                     │       │                   header rules per fetch     │
//!                     │       ▼                                              │
//!                     │  ┌──────────────┐   ┌──────────────┐                 │
//!                     │  │  operation   │──▶│ usage export │─────────────────┼──▶ Collector
//!                     │  │   metrics    │   │   (batched)  │                 │
//!                     │  └──────┬───────┘   └──────────────┘                 │
//!                     │         ▼                                            │
//!                     │   Prometheus endpoint                                │
//!                     │                                                      │
//!                     │  config (file + env, hot reload) · lifecycle         │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use federation_gateway::analytics::{ExporterSettings, UsageExporter, UsageSink};
use federation_gateway::config::loader::{load_config_or_default, load_dotenv, DEFAULT_CONFIG_PATH};
use federation_gateway::config::ConfigWatcher;
use federation_gateway::lifecycle::signals::spawn_signal_handler;
use federation_gateway::observability::logging::init_logging;
use federation_gateway::observability::metrics::init_metrics;
use federation_gateway::observability::{PrometheusMetrics, RouterMetrics, Telemetry};
use federation_gateway::resilience::TransportOptions;
use federation_gateway::{GatewayServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "federation-gateway", version, about = "GraphQL federation gateway")]
struct Args {
    /// Path to the YAML or TOML configuration file.
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    load_dotenv();

    let explicit = args.config.is_some();
    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = load_config_or_default(&config_path, explicit)?;

    init_logging(&config.log_level, config.json_log)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "federation-gateway starting");
    tracing::info!(
        path = %config_path.display(),
        listen_addr = %config.listen_addr,
        subgraphs = config.subgraphs.len(),
        config_version = %config.version,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let signals = spawn_signal_handler(shutdown.clone());

    // Metrics and schema usage export
    let prometheus = &config.telemetry.metrics.prometheus;
    if prometheus.enabled {
        let addr: SocketAddr = prometheus.listen_addr.parse()?;
        init_metrics(addr)?;
    }
    // Stopped only after the server has drained, so late records still ship.
    let export_stop = Shutdown::new();
    let exporter = start_exporter(&config, &export_stop)?;
    let telemetry = if prometheus.enabled || exporter.sink.is_some() {
        let backend = Arc::new(PrometheusMetrics::new(config.telemetry.service_name.clone()));
        Telemetry::Enabled(RouterMetrics::new(backend, exporter.sink))
    } else {
        tracing::info!("Operation telemetry disabled");
        Telemetry::Disabled
    };

    // Hot reload
    let (watcher, config_updates) = ConfigWatcher::new(&config_path);
    let _watcher = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    let listener = TcpListener::bind(&config.listen_addr).await?;
    let server = GatewayServer::new(config, telemetry)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    // The server stops on shutdown; make sure everything else does too.
    shutdown.trigger();
    signals.abort();
    export_stop.trigger();
    if let Some(worker) = exporter.worker {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Schema usage exporter failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

struct StartedExporter {
    sink: Option<Arc<dyn UsageSink>>,
    worker: Option<tokio::task::JoinHandle<()>>,
}

/// Spawn the schema usage export worker when export is enabled and a graph
/// token is available. The worker drains and exits when `stop` fires.
fn start_exporter(
    config: &federation_gateway::GatewayConfig,
    stop: &Shutdown,
) -> Result<StartedExporter, Box<dyn std::error::Error>> {
    let disabled = StartedExporter {
        sink: None,
        worker: None,
    };
    if !config.graphql_metrics.enabled {
        return Ok(disabled);
    }
    if config.graph.token.is_empty() {
        tracing::warn!("graphql_metrics is enabled but no graph token is set, schema usage export disabled");
        return Ok(disabled);
    }

    let settings = ExporterSettings::from_config(config)?;
    let client = TransportOptions::from(&config.traffic_shaping.all).build_client()?;
    let (exporter, worker) = UsageExporter::new(settings);
    let handle = tokio::spawn(worker.run(client, stop.subscribe()));

    Ok(StartedExporter {
        sink: Some(Arc::new(exporter) as Arc<dyn UsageSink>),
        worker: Some(handle),
    })
}
