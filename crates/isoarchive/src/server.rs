use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tower_http::services::ServeDir;

use manifest::ManifestIndex;

use crate::config::{AllowedOrigins, Config};
use crate::error::{ServerError, ServerResult};

pub mod error;
pub mod os;

pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    index: Arc<ManifestIndex>,
}

impl Server {
    /// Scans the archive, attaches the watcher and then binds the listener,
    /// so the first request already sees a complete manifest.
    pub async fn start(config: &Config) -> ServerResult<Self> {
        let index = Arc::new(ManifestIndex::new(config.layout()));
        index.start().await?;

        let state = Arc::new(ServerState::new(index.clone()));
        let app = router(state, cors_layer(&config.cors_origins));

        let listener = TcpListener::bind(config.bind_addr).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(error) = served {
                tracing::error!(%error, "http server stopped");
            }
        });

        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
            index,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn index(&self) -> &Arc<ManifestIndex> {
        &self.index
    }

    pub fn shutdown(&mut self) -> ServerResult<()> {
        if let Some(sender) = self.shutdown.take() {
            self.index.shutdown();
            sender.send(()).map_err(|_| ServerError::Shutdown)
        } else {
            Ok(())
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

pub fn router(state: Arc<ServerState>, cors: CorsLayer) -> Router {
    let archive_root = state.index.layout().root.clone();
    Router::new()
        .route("/health", get(health))
        .route("/os/params/", get(os::params))
        .route("/os/params", get(os::params))
        .route("/os/count/", get(os::count))
        .route("/os/count", get(os::count))
        .route("/os/", get(os::list))
        .route("/os", get(os::list))
        .nest_service("/download", ServeDir::new(archive_root))
        .with_state(state)
        .layer(cors)
}

/// Credentials are only allowed with an explicit origin list; browsers reject
/// a wildcard origin on credentialed requests.
pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    match origins {
        AllowedOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        AllowedOrigins::List(origins) => CorsLayer::new()
            .allow_origin(origins.clone())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    state: &'static str,
    records: usize,
    watcher: &'static str,
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        state: state.index.state().as_str(),
        records: state.index.len(),
        watcher: state.index.watcher_state().as_str(),
    })
}

pub struct ServerState {
    pub(crate) index: Arc<ManifestIndex>,
}

impl ServerState {
    pub fn new(index: Arc<ManifestIndex>) -> Self {
        Self { index }
    }
}
