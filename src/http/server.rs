//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router serving `POST <graphql_path>`
//! - Wire up middleware (request ID, tracing)
//! - Hold the active configuration snapshot and swap it on reload
//! - Serve until the shutdown signal, then drain in-flight requests

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::routing::post;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{validate_config, GatewayConfig, ValidationError};
use crate::gateway::{Planner, RootFieldPlanner, Subgraph, SubgraphExecutor};
use crate::headers::{HeaderRuleError, HeaderTransformer};
use crate::http::handler::graphql_handler;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::Telemetry;
use crate::resilience::TransportOptions;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0:?}")]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    HeaderRules(#[from] HeaderRuleError),

    #[error("invalid routing URL: {0}")]
    RoutingUrl(#[from] url::ParseError),

    #[error("failed to build subgraph client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Everything derived from one configuration revision.
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub transformer: HeaderTransformer,
    pub planner: Arc<dyn Planner>,
    pub subgraphs: Arc<[Subgraph]>,
    pub executor: SubgraphExecutor,
}

impl GatewayState {
    /// Build a snapshot. Nothing is returned unless every part is valid.
    pub fn build(config: GatewayConfig) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::Validation)?;

        let transformer = HeaderTransformer::new(&config.headers)?;
        let subgraphs: Arc<[Subgraph]> = Subgraph::from_config(&config)?.into();
        let planner = Arc::new(RootFieldPlanner::new(&config.subgraphs));
        let client = TransportOptions::from(&config.traffic_shaping.all).build_client()?;

        Ok(Self {
            config: Arc::new(config),
            transformer,
            planner,
            subgraphs,
            executor: SubgraphExecutor::new(client),
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    snapshot: Arc<ArcSwap<GatewayState>>,
    pub telemetry: Telemetry,
}

impl AppState {
    /// The current snapshot. Callers keep it for the whole request.
    pub fn snapshot(&self) -> Arc<GatewayState> {
        self.snapshot.load_full()
    }

    /// Replace the snapshot with one built from `config`. On error the
    /// current snapshot stays active.
    pub fn reload(&self, config: GatewayConfig) -> Result<(), StartupError> {
        let current = self.snapshot.load();
        if current.config.graphql_path != config.graphql_path
            || current.config.listen_addr != config.listen_addr
        {
            tracing::warn!("listen_addr and graphql_path changes take effect after a restart");
        }

        let next = GatewayState::build(config)?;
        tracing::info!(
            version = %next.config.version,
            subgraphs = next.subgraphs.len(),
            "Configuration reloaded"
        );
        self.snapshot.store(Arc::new(next));
        Ok(())
    }
}

/// HTTP server for the federation gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, telemetry: Telemetry) -> Result<Self, StartupError> {
        let graphql_path = config.graphql_path.clone();
        let state = AppState {
            snapshot: Arc::new(ArcSwap::from_pointee(GatewayState::build(config)?)),
            telemetry,
        };
        let router = Self::build_router(&graphql_path, state.clone());
        Ok(Self { router, state })
    }

    fn build_router(graphql_path: &str, state: AppState) -> Router {
        Router::new()
            .route(graphql_path, post(graphql_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer()),
            )
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on `listener` until `shutdown` fires. Configurations arriving on
    /// `config_updates` replace the active snapshot.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let snapshot = self.state.snapshot();
        tracing::info!(
            address = %addr,
            path = %snapshot.config.graphql_path,
            subgraphs = snapshot.subgraphs.len(),
            "HTTP server starting"
        );
        drop(snapshot);

        let state = self.state.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if let Err(e) = state.reload(config) {
                    tracing::error!(error = %e, "Rejected configuration, keeping current snapshot");
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
