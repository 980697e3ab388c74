//! HTTP endpoint: mounts the batch pipeline on an axum router.
//!
//! # How a request flows (for beginners)
//!
//! ```text
//! POST /ptl  {"ptl":"req@0.0.1","do":[...]}
//!   └─ axum handler `handle_ptl`
//!        └─ PtlServer::handle_http(method, body)
//!             └─ (status, JSON envelope)
//! ```
//!
//! The route accepts every HTTP method so that the pipeline itself can answer
//! non-POST requests with its own `405` error envelope.  CORS preflight
//! requests are answered by `tower-http` before they reach the handler.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::application::handle_batch::PtlServer;

/// Errors raised while binding or serving the endpoint.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid bind address {0}")]
    Address(String),

    #[error("I/O error on {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Builds the router serving `server` at `path`.
pub fn router(server: Arc<PtlServer>, path: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(path, any(handle_ptl))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

async fn handle_ptl(
    State(server): State<Arc<PtlServer>>,
    method: Method,
    body: Bytes,
) -> Response {
    let reply = server.handle_http(method.as_str(), &body).await;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

/// Binds `host:port`, returning the listener and the actual address
/// (useful when `port` is 0).
///
/// # Errors
///
/// [`HttpError::Address`] for unparsable addresses and [`HttpError::Io`]
/// when the socket cannot be bound.
pub async fn bind(host: &str, port: u16) -> Result<(tokio::net::TcpListener, SocketAddr), HttpError> {
    let raw = format!("{host}:{port}");
    let addr: SocketAddr = raw.parse().map_err(|_| HttpError::Address(raw.clone()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| HttpError::Io {
            addr: raw.clone(),
            source,
        })?;
    let local = listener.local_addr().map_err(|source| HttpError::Io { addr: raw, source })?;
    Ok((listener, local))
}

/// Serves `server` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// [`HttpError::Io`] if the accept loop fails.
pub async fn serve(
    listener: tokio::net::TcpListener,
    server: Arc<PtlServer>,
    path: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), HttpError> {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!("ptl endpoint listening on http://{addr}{path}");
    axum::serve(listener, router(server, path))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|source| HttpError::Io { addr, source })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_rejects_bad_address() {
        let err = bind("not an address", 80).await.unwrap_err();
        assert!(matches!(err, HttpError::Address(_)));
    }

    #[tokio::test]
    async fn test_bind_port_zero_picks_a_port() {
        let (_listener, addr) = bind("127.0.0.1", 0).await.unwrap();
        assert!(addr.port() > 0);
    }
}
