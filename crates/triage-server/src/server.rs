//! `TriageServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocket;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::calls::CallCoordinator;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::render as render_metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::ChannelKind;
use crate::websocket::handler::SocketPump;
use crate::websocket::routes;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Call coordination core.
    pub coordinator: Arc<CallCoordinator>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Open WebSocket connections.
    pub connections: Arc<AtomicUsize>,
    /// Per-connection outbound queue depth.
    pub outbound_buffer: usize,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Start pumping an upgraded socket.
    pub(crate) fn open_socket(&self, socket: WebSocket, kind: ChannelKind) -> SocketPump {
        SocketPump::start(
            socket,
            kind,
            self.outbound_buffer,
            self.shutdown.token(),
            &self.connections,
        )
    }
}

/// The triage coordination server.
pub struct TriageServer {
    config: ServerConfig,
    coordinator: Arc<CallCoordinator>,
    shutdown: Arc<ShutdownCoordinator>,
    connections: Arc<AtomicUsize>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl TriageServer {
    /// Create a new server around `coordinator`.
    pub fn new(config: ServerConfig, coordinator: Arc<CallCoordinator>) -> Self {
        Self {
            config,
            coordinator,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            connections: Arc::new(AtomicUsize::new(0)),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Expose `handle` at `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            coordinator: self.coordinator.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            connections: self.connections.clone(),
            outbound_buffer: self.config.outbound_buffer,
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/ws/signal", get(routes::signal_ws))
            .route("/ws/audio", get(routes::media_ws))
            .route("/ws/vitals", get(routes::vitals_ws))
            .route("/ws/dashboard", get(routes::dashboard_ws));
        if self.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        let mut router = router.with_state(state);

        if let Some(dir) = &self.config.static_dir {
            router = router
                .nest_service("/static", ServeDir::new(dir))
                .fallback_service(ServeDir::new(dir));
        }

        router
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve in the background until the
    /// shutdown token fires. Returns the bound address.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(
            %addr,
            strategy = self.coordinator.strategy_name(),
            static_dir = ?self.config.static_dir,
            "triage server listening"
        );
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated");
            }
        });
        Ok((addr, handle))
    }

    /// Get the call coordinator.
    pub fn coordinator(&self) -> &Arc<CallCoordinator> {
        &self.coordinator
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.connections.load(Ordering::Relaxed);
    let calls = state.coordinator.registry().len();
    Json(health::health_check(state.start_time, connections, calls))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => render_metrics(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
