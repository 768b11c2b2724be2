//! HTTP layer: axum routes over [`RequestHandler`].

use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

type AppState = Arc<RequestHandler>;

/// Query string of the pending listing.
#[derive(Debug, Default, Deserialize)]
struct PendingQuery {
    store: Option<String>,
    limit: Option<usize>,
}

/// Builds the terminal-facing router.
pub fn router(handler: Arc<RequestHandler>) -> Router {
    let max_body = handler.context().config.max_body_bytes;
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(|| async { "ok" }))
        .route("/api/server-time", get(server_time))
        .route("/api/sync-transactions", post(submit))
        .route("/api/sync-transactions/reconcile", post(reconcile))
        .route("/api/sync-status/:transaction_id", get(status))
        .route("/api/pending-transactions", get(pending))
        .route("/api/transaction-refund/:store_id/:count", post(refund))
        .route(
            "/api/rbotransactiontables/:store_id/:z_report_id",
            post(z_report),
        )
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(handler)
}

/// Runs a handler call on the blocking pool.
async fn blocking<T, F>(handler: &AppState, f: F) -> ServerResult<T>
where
    F: FnOnce(&RequestHandler) -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    let handler = Arc::clone(handler);
    tokio::task::spawn_blocking(move || f(&handler))
        .await
        .map_err(|e| ServerError::Internal(format!("handler task failed: {e}")))?
}

fn parse_json(body: &[u8]) -> ServerResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServerError::InvalidRequest("request body is empty".into()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ServerError::InvalidRequest(format!("request body is not valid JSON: {e}")))
}

async fn welcome(State(handler): State<AppState>) -> impl IntoResponse {
    Json(handler.welcome())
}

async fn server_time(State(handler): State<AppState>) -> impl IntoResponse {
    Json(handler.server_time())
}

async fn submit(State(handler): State<AppState>, body: Bytes) -> ServerResult<impl IntoResponse> {
    let body = parse_json(&body)?;
    let response = blocking(&handler, move |h| h.handle_submit(&body)).await?;

    if handler.context().config.inline_sync {
        let handler = Arc::clone(&handler);
        let transaction_id = response.transaction_id.clone();
        // Detached: the terminal never waits on the upstream.
        tokio::task::spawn_blocking(move || {
            handler.reconcile_inline(&transaction_id);
        });
    }

    Ok(Json(response))
}

async fn status(
    State(handler): State<AppState>,
    Path(transaction_id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let response = blocking(&handler, move |h| h.handle_status(&transaction_id)).await?;
    Ok(Json(response))
}

async fn pending(
    State(handler): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> ServerResult<impl IntoResponse> {
    let response = blocking(&handler, move |h| {
        h.handle_pending(query.store.as_deref(), query.limit)
    })
    .await?;
    Ok(Json(response))
}

async fn reconcile(State(handler): State<AppState>) -> ServerResult<impl IntoResponse> {
    let report = blocking(&handler, |h| h.handle_reconcile()).await?;
    Ok(Json(report))
}

async fn refund(
    State(handler): State<AppState>,
    Path((store_id, count)): Path<(String, String)>,
    body: Bytes,
) -> ServerResult<impl IntoResponse> {
    let body = parse_json(&body)?;
    let response = blocking(&handler, move |h| h.handle_refund(&store_id, &count, &body)).await?;
    Ok(Json(response))
}

async fn z_report(
    State(handler): State<AppState>,
    Path((store_id, z_report_id)): Path<(String, String)>,
) -> ServerResult<impl IntoResponse> {
    let response = blocking(&handler, move |h| h.handle_z_report(&store_id, &z_report_id)).await?;
    Ok(Json(response))
}

/// The terminal-facing server.
///
/// Wraps a [`RequestHandler`] and serves it over HTTP.
///
/// # Example
///
/// ```rust,ignore
/// use possync_server::{HandlerContext, ServerConfig, SyncServer};
///
/// let context = HandlerContext::new(ServerConfig::default(), reconciler);
/// let server = SyncServer::new(context);
/// server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await?;
/// ```
pub struct SyncServer {
    handler: Arc<RequestHandler>,
}

impl SyncServer {
    /// Creates a new server.
    pub fn new(context: HandlerContext) -> Self {
        Self {
            handler: Arc::new(RequestHandler::new(Arc::new(context))),
        }
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    /// Builds the router for this server.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.handler))
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    ///
    /// In-flight requests are allowed to finish on shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the listener fails.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.handler.context().config.bind_addr;
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "failed to bind");
            e
        })?;
        info!(addr = %listener.local_addr()?, "listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_invalid() {
        assert!(matches!(parse_json(b"  "), Err(ServerError::InvalidRequest(_))));
        assert!(matches!(parse_json(b"{oops"), Err(ServerError::InvalidRequest(_))));
        assert_eq!(parse_json(br#"{"a":1}"#).unwrap()["a"], 1);
    }
}
