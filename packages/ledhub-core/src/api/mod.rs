//! HTTP/WebSocket operator surface (§4.J).
//!
//! This module contains thin handlers that delegate to the domain state and
//! plan cache. It provides router construction and server startup.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::events::BroadcastEventBridge;
use crate::plans::PlanCache;
use crate::pubsub::PubSubClient;
use crate::state::DomainState;

pub mod http;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub state: Arc<DomainState>,
    pub plan_cache: Arc<PlanCache>,
    pub pubsub: Arc<PubSubClient>,
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub shutdown: CancellationToken,
}

/// Starts the HTTP server bound to `port`, serving until `state.shutdown` fires.
pub async fn start_server(state: AppState, port: u16) -> Result<(), ServerError> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("[api] operator surface listening on http://{addr}");

    let app = http::create_router(state.clone());
    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
