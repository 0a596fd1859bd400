use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rolecall_core::TemplateProvider;
use rolecall_telemetry::MetricsRecorder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientRegistry};
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::session::Session;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub ping_interval: Duration,
    pub max_message_size: usize,
    pub started_at: Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle that keeps it running.
pub async fn start(
    config: ServerConfig,
    templates: Arc<dyn TemplateProvider>,
) -> Result<ServerHandle, std::io::Error> {
    let metrics = Arc::new(MetricsRecorder::new());
    let client_registry = Arc::new(ClientRegistry::new(config.max_send_queue));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&client_registry),
        templates,
        Arc::clone(&metrics),
    ));

    let sweeper = config.idle_timeout().map(|timeout| {
        let metrics = Arc::clone(&metrics);
        client::start_sweep_task(
            Arc::clone(&client_registry),
            timeout,
            config.sweep_interval(),
            move |n| metrics.counter_inc("idle_evictions_total", &[], n as u64),
        )
    });

    let app_state = AppState {
        dispatcher: Arc::clone(&dispatcher),
        ping_interval: config.ping_interval(),
        max_message_size: config.max_message_size,
        started_at: Instant::now(),
    };

    let router = build_router(app_state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "Role router started");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Server stopped");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        port: local_addr.port(),
        dispatcher,
        _server: server_handle,
        _sweeper: sweeper,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    dispatcher: Arc<Dispatcher>,
    _server: tokio::task::JoinHandle<()>,
    _sweeper: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.dispatcher.clients().register();
    let metrics = state.dispatcher.metrics();
    metrics.counter_inc("ws_connections_total", &[], 1);
    metrics.gauge_add("ws_connections_active", &[], 1);
    tracing::info!(client_id = %client_id, "WebSocket client connected");

    Session::new(client_id, Arc::clone(&state.dispatcher))
        .run(socket, rx, state.ping_interval)
        .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "connections": state.dispatcher.clients().count(),
        "registrations": state.dispatcher.registration_count(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatcher.metrics().snapshot())
}
