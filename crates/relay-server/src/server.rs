use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use relay_runtime::Runtime;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionRegistry, SERVER_SHUTDOWN};
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Shared state passed to Axum handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) connections: Arc<ConnectionRegistry>,
    pub(crate) shutdown: ShutdownCoordinator,
    pub(crate) started: Instant,
}

/// WebSocket front end: one connection on `/{workflow}` runs one session.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    pub fn new(config: ServerConfig, runtime: Arc<Runtime>) -> Self {
        Self {
            state: AppState {
                runtime,
                config: Arc::new(config),
                connections: Arc::new(ConnectionRegistry::new()),
                shutdown: ShutdownCoordinator::new(),
                started: Instant::now(),
            },
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.state.runtime
    }

    /// Cancelling this stops the server started by [`serve`](Self::serve).
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.state.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/{workflow}", get(ws_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(self.state.config.bind_addr()).await
    }

    /// Serve until shutdown is requested, then stop every session.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let shutdown = self.state.shutdown.clone();
        tracing::info!(
            addr = %local_addr,
            workflows = ?self.state.runtime.registry().names(),
            "relay server started"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        let stopped = self
            .state
            .runtime
            .shutdown_all(SERVER_SHUTDOWN, self.state.config.shutdown_timeout())
            .await;
        tracing::info!(stopped, "relay server stopped");
        Ok(())
    }

    /// Bind and serve on a background task.
    pub async fn start(self) -> std::io::Result<ServerHandle> {
        let listener = self.bind().await?;
        let addr = listener.local_addr()?;
        let shutdown = self.shutdown_handle();
        let runtime = Arc::clone(&self.state.runtime);
        let task = tokio::spawn(self.serve(listener));
        Ok(ServerHandle {
            addr,
            runtime,
            shutdown,
            task,
        })
    }
}

/// Handle returned by [`RelayServer::start`].
pub struct ServerHandle {
    pub addr: SocketAddr,
    runtime: Arc<Runtime>,
    shutdown: ShutdownCoordinator,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Request shutdown and wait for the server task to finish.
    pub async fn shutdown(self) -> std::io::Result<()> {
        self.shutdown.shutdown();
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e)),
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(workflow): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let limit = state.config.max_message_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| connection::handle_ws_connection(socket, workflow, state))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.started,
        state.connections.count(),
        state.runtime.session_count(),
        state.runtime.registry().names(),
    ))
}
