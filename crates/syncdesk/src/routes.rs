// ── HTTP routes ──
//
// Operation endpoints always answer 200 with an `OperationResult`; the
// outcome lives in its `ok`/`error` fields. Everything else uses HTTP
// status codes via `ApiError`.

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use syncdesk_core::{
    BroadcastRequest, CacheStats, CoreError, CrudOperation, ExecuteOptions, HubStats,
    Notification, OperationRequest, OperationResult, Table,
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stream;

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/operations", post(execute))
        .route("/api/operations/batch", post(execute_batch))
        .route("/api/sync/broadcast", post(broadcast))
        .route("/api/sync/stream", get(stream::stream))
        .route("/api/sync/stats", get(sync_stats))
        .route("/api/sync/notifications", post(notify_all))
        .route("/api/sync/connections/:id/heartbeat", post(heartbeat))
        .route("/api/sync/connections/:id/notify", post(notify))
        .route("/api/cache", delete(clear_cache))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache/:table", delete(invalidate_table))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.hub().connection_count(),
    }))
}

// ── Operations ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest {
    #[serde(flatten)]
    operation: OperationRequest,
    #[serde(default)]
    options: ExecuteOptions,
    /// Version the caller's edit was based on.
    #[serde(default)]
    base_version: Option<u64>,
}

async fn execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<OperationResult>, ApiError> {
    let actor = state.auth.authenticate(&headers, None)?;
    let started = Instant::now();

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = CoreError::validation("body", rejection.body_text());
            return Ok(Json(OperationResult::rejected(&err, started.elapsed())));
        }
    };
    let op = match CrudOperation::try_from(request.operation) {
        Ok(op) => op,
        Err(err) => return Ok(Json(OperationResult::rejected(&err, started.elapsed()))),
    };

    let result = state
        .service
        .execute(&op, request.options, &actor, request.base_version)
        .await;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    operations: Vec<OperationRequest>,
}

/// Results come back in request order; operations that fail validation
/// are rejected in place without reaching the remote store.
async fn execute_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<Vec<OperationResult>>, ApiError> {
    let actor = state.auth.authenticate(&headers, None)?;
    let Json(request) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let started = Instant::now();

    let parsed: Vec<Result<CrudOperation, CoreError>> = request
        .operations
        .into_iter()
        .map(CrudOperation::try_from)
        .collect();
    let valid: Vec<CrudOperation> = parsed
        .iter()
        .filter_map(|op| op.as_ref().ok().cloned())
        .collect();

    let mut executed = state.service.execute_batch(&valid, &actor).await.into_iter();
    let results = parsed
        .iter()
        .map(|op| match op {
            Ok(_) => executed.next().unwrap_or_else(|| {
                OperationResult::rejected(
                    &CoreError::Internal("batch result missing".into()),
                    started.elapsed(),
                )
            }),
            Err(err) => OperationResult::rejected(err, started.elapsed()),
        })
        .collect();
    Ok(Json(results))
}

// ── Sync ────────────────────────────────────────────────────────────

async fn broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let actor = state.auth.authenticate(&headers, None)?;
    let Json(request) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let outcome = state.service.broadcast(request, &actor)?;
    Ok(Json(json!({
        "ok": true,
        "delivered": outcome.delivered,
        "conflict": outcome.conflict,
    })))
}

async fn sync_stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub().stats())
}

async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.auth.authenticate(&headers, None)?;
    state.hub().touch_heartbeat(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<Notification>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    state.auth.authenticate(&headers, None)?;
    let Json(notification) =
        body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    state.hub().notify(&id, notification)?;
    Ok(StatusCode::ACCEPTED)
}

async fn notify_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Notification>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    state.auth.authenticate(&headers, None)?;
    let Json(notification) =
        body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let delivered = state.hub().notify_all(notification);
    Ok(Json(json!({ "ok": true, "delivered": delivered })))
}

// ── Cache ───────────────────────────────────────────────────────────

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.service.executor().cache().stats())
}

async fn clear_cache(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    state.auth.authenticate(&headers, None)?;
    state.service.executor().cache().clear();
    info!("cache cleared");
    Ok(StatusCode::NO_CONTENT)
}

async fn invalidate_table(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(table): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.auth.authenticate(&headers, None)?;
    let table = Table::from_str(&table)
        .map_err(|_| CoreError::validation("table", format!("unknown table '{table}'")))?;
    let removed = state.service.executor().cache().invalidate_group(table.as_ref());
    Ok(Json(json!({ "ok": true, "removed": removed })))
}
