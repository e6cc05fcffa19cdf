// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! HTTP surface of graphkeep.
//!
//! | Method/Path            | Response                                   |
//! |------------------------|--------------------------------------------|
//! | `POST /api/save`       | `200 {"ok":true}` or `400 Bad data`        |
//! | `GET /api/load`        | `200` with persisted array, or `[]`        |
//! | `POST /api/push`       | `200 {"ok":true}`, sync runs in background |
//! | `GET /api/sync/status` | `200` with [`SyncStatus`]                  |
//! | `GET /api/health`      | `200 {"ok":true}`, no CORS headers         |
//!
//! Every route except health is decorated by the [`CorsPolicy`] and also
//! answers `OPTIONS` preflights with an empty `204`.
//!
//! Callers only ever learn about invalid save payloads. Sync trouble stays
//! in the logs and the status route, and any other server-side failure is
//! reported as an opaque `500`.

pub mod cors;

use crate::{
    server::cors::CorsPolicy,
    store::{GraphDocument, GraphStore, StoreError},
    sync::{SyncService, SyncStatus},
};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tracing::{debug, error, info, instrument, warn};

/// Largest graph document accepted by a save.
pub const MAX_DOCUMENT_BYTES: usize = 64 * 1024 * 1024;

/// Shared state of all request handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<GraphStore>,
    sync: Option<Arc<SyncService>>,
    cors: Arc<CorsPolicy>,
}

impl AppState {
    /// Construct new handler state.
    ///
    /// Saves are not synchronized anywhere if `sync` is [`None`].
    pub fn new(store: GraphStore, sync: Option<Arc<SyncService>>, cors: CorsPolicy) -> Self {
        Self {
            store: Arc::new(store),
            sync,
            cors: Arc::new(cors),
        }
    }
}

/// Plain acknowledgement body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub const OK: Self = Self { ok: true };
}

/// Build router exposing the graphkeep API.
pub fn router(state: AppState) -> Router {
    let decorated = Router::new()
        .route("/api/save", post(save).options(preflight))
        .route("/api/load", get(load).options(preflight))
        .route("/api/push", post(push).options(preflight))
        .route("/api/sync/status", get(sync_status).options(preflight))
        .layer(DefaultBodyLimit::max(MAX_DOCUMENT_BYTES))
        .layer(middleware::from_fn_with_state(
            state.cors.clone(),
            cors::decorate,
        ));

    Router::new()
        .route("/api/health", get(health))
        .merge(decorated)
        .with_state(state)
}

/// Serve graphkeep API on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// - Return [`std::io::Error`] if the listener fails.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[instrument(skip(state, body), level = "debug")]
async fn save(State(state): State<AppState>, body: Bytes) -> Result<Json<Ack>> {
    let document = GraphDocument::from_slice(&body)?;
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.save(&document)).await??;

    if let Some(sync) = &state.sync {
        let deadline = sync.schedule();
        debug!("sync scheduled for {deadline:?}");
    }

    Ok(Json(Ack::OK))
}

#[instrument(skip(state), level = "debug")]
async fn load(State(state): State<AppState>) -> Result<Response> {
    let store = state.store.clone();
    let document = tokio::task::spawn_blocking(move || store.load()).await??;

    Ok(([(CONTENT_TYPE, "application/json")], document).into_response())
}

async fn push(State(state): State<AppState>) -> Json<Ack> {
    match &state.sync {
        Some(sync) => sync.trigger_now(),
        None => warn!("sync is disabled, ignore push request"),
    }

    Json(Ack::OK)
}

async fn sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(
        state
            .sync
            .as_ref()
            .map(|sync| sync.status())
            .unwrap_or_else(SyncStatus::disabled),
    )
}

async fn health() -> Json<Ack> {
    Json(Ack::OK)
}

/// All possible error types for request handling.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Graph store operation fails.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Blocking store task cannot complete.
    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Store(StoreError::BadData) => (StatusCode::BAD_REQUEST, "Bad data").into_response(),
            error => {
                error!("request failed: {error:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

/// Friendly result alias :3
type Result<T, E = ApiError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    async fn body_text(response: Response) -> anyhow::Result<String> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    #[tokio::test]
    async fn bad_data_is_client_error() -> anyhow::Result<()> {
        let response = ApiError::Store(StoreError::BadData).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await?, "Bad data");

        Ok(())
    }

    #[tokio::test]
    async fn write_failure_is_opaque_server_error() -> anyhow::Result<()> {
        let response = ApiError::Store(StoreError::Write {
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            path: PathBuf::from("/secret/graph.json"),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // INVARIANT: Server-side detail never leaks into the response.
        let body = body_text(response).await?;
        assert_eq!(body, "Internal Server Error");
        assert!(!body.contains("secret"));

        Ok(())
    }
}
