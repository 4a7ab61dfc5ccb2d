//! HTTP surface a node exposes to the coordinator: shard CRUD, stats,
//! liveness, and generic control/info endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::node::store::ShardStore;

#[derive(Clone)]
pub struct NodeState {
    pub node_id: String,
    pub store: Arc<ShardStore>,
}

pub fn router(state: NodeState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/control", post(control))
        .route("/info", get(info))
        .route("/shard/{sid}/store", get(list_keys))
        .route("/shard/{sid}/store/{*key}", get(get_value).put(put_value).delete(delete_value))
        .route("/shard/{sid}/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Drains the control broadcast body and acknowledges. Core does not
/// interpret the payload; the body still has to be read so the request
/// framing completes cleanly.
async fn control(_body: Bytes) -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
struct ShardSummary {
    id: u32,
    primary: bool,
}

async fn info(State(state): State<NodeState>) -> Json<Value> {
    let shards: Vec<ShardSummary> = state
        .store
        .shard_ids()
        .into_iter()
        .map(|id| ShardSummary { id, primary: true })
        .collect();

    Json(json!({
        "node_id": state.node_id,
        "shard_count": shards.len(),
        "shards": shards,
    }))
}

/// Parses the `{sid}` path segment. Non-integer or negative literals are
/// the only rejected shapes; the node has no notion of `numShards` so it
/// cannot bound the value any further than "is a valid shard id".
fn parse_shard_id(raw: &str) -> AppResult<u32> {
    raw.parse::<u32>()
        .map_err(|_| AppError::Validation(format!("invalid shard id: {raw}")))
}

async fn list_keys(State(state): State<NodeState>, Path(sid): Path<String>) -> AppResult<Json<Value>> {
    let shard_id = parse_shard_id(&sid)?;
    let keys = state.store.list(shard_id);
    Ok(Json(json!({ "keys": keys, "count": keys.len() })))
}

async fn get_value(
    State(state): State<NodeState>,
    Path((sid, key)): Path<(String, String)>,
) -> AppResult<Response> {
    let shard_id = parse_shard_id(&sid)?;
    match state.store.get(shard_id, &key) {
        Ok(value) => {
            let mut response = (StatusCode::OK, value.bytes).into_response();
            if let Some(content_type) = value.content_type {
                if let Ok(header_value) = axum::http::HeaderValue::from_str(&content_type) {
                    response
                        .headers_mut()
                        .insert(axum::http::header::CONTENT_TYPE, header_value);
                }
            }
            Ok(response)
        }
        Err(_) => Err(AppError::NotFound(format!("key {key} not found in shard {shard_id}"))),
    }
}

async fn put_value(
    State(state): State<NodeState>,
    Path((sid, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let shard_id = parse_shard_id(&sid)?;
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.store.put(shard_id, key, body.to_vec(), content_type);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_value(
    State(state): State<NodeState>,
    Path((sid, key)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let shard_id = parse_shard_id(&sid)?;
    state.store.delete(shard_id, &key);
    Ok(StatusCode::NO_CONTENT)
}

async fn stats(State(state): State<NodeState>, Path(sid): Path<String>) -> AppResult<Json<Value>> {
    let shard_id = parse_shard_id(&sid)?;
    let stats = state.store.stats(shard_id);
    Ok(Json(json!({
        "shard_id": shard_id,
        "operations": { "total": stats.operations },
        "storage": { "keys": stats.keys, "bytes": stats.bytes },
    })))
}
