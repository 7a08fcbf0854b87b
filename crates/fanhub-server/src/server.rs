//! `HubServer`: Axum HTTP + WebSocket server around a [`Hub`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::StartupError;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::admission::ws_handler;
use crate::websocket::heartbeat::run_heartbeat;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The fan-out hub.
    pub hub: Arc<Hub>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Shared secret expected on `/ws`.
    pub api_key: Arc<str>,
    /// Connection limit (`0` = unlimited).
    pub max_connections: usize,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// The fanhub server.
pub struct HubServer {
    config: ServerConfig,
    hub: Arc<Hub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl HubServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        let hub = Hub::new(config.hub.clone());
        Self {
            config,
            hub,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            api_key: Arc::from(self.config.api_key.as_str()),
            max_connections: self.config.max_connections,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind, then serve until [`ShutdownCoordinator::shutdown`] is called.
    ///
    /// Starts the dispatcher and, when configured, the heartbeat. The
    /// returned handle completes after the shutdown sequence: stop
    /// accepting, stop the heartbeat, drain the intake, close every
    /// connection.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), StartupError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| StartupError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(StartupError::LocalAddr)?;

        let token = self.shutdown.token();
        let mut tasks = vec![self.hub.spawn_dispatcher(token.clone())?];
        if let Some(heartbeat) = &self.config.heartbeat {
            let hub = self.hub.clone();
            let interval = heartbeat.interval;
            let payload = heartbeat.payload.clone();
            let cancel = token.clone();
            tasks.push(tokio::spawn(async move {
                let exit = run_heartbeat(hub, interval, payload, cancel).await;
                info!(?exit, "heartbeat stopped");
            }));
        }

        info!(port = local_addr.port(), "http server started on {}", local_addr.port());

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let hub = self.hub.clone();
        let shutdown = self.shutdown.clone();
        let timeout = self.config.shutdown_timeout;

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "http server error");
            }
            // dispatcher drains queued messages before connections close
            let _ = shutdown.graceful_shutdown(tasks, Some(timeout)).await;
            hub.close_all().await;
            info!("server stopped");
        });

        Ok((local_addr, handle))
    }

    /// Get the hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
