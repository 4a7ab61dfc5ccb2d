//! The coordinator's public HTTP surface: registration, membership,
//! broadcast, placement, and the proxied `/data/{*key}` routing path.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::coordinator::app_state::CoordinatorState;
use crate::error::{AppError, AppResult};
use crate::types::{normalize_address, NodeInfo, NodeStatus, ShardAssignment};

pub fn router(state: CoordinatorState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/nodes", get(list_nodes))
        .route("/broadcast", post(broadcast))
        .route("/health", get(health))
        .route("/shards", get(list_shards))
        .route("/shards/assign", post(assign_shard))
        // axum's `{*key}` wildcard only matches a non-empty remainder, so
        // `/data/` (no key at all) needs its own route to reach the same
        // "empty key" validation error `/data/{*key}` produces for `""`.
        .route("/data/", any(empty_key))
        .route("/data/{*key}", get(get_data).put(put_data).delete(delete_data))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Deserialize)]
struct RegisterRequest {
    node: RegisterNode,
}

#[derive(Deserialize)]
struct RegisterNode {
    id: String,
    addr: String,
}

async fn register(
    State(state): State<CoordinatorState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<StatusCode> {
    let address = normalize_address(&body.node.addr);
    state.membership.register(body.node.id, address)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct NodesResponse {
    nodes: Vec<NodeInfo>,
}

/// Merges membership's own view with the supervisor's live per-node health:
/// a node the supervisor has probed reports whatever the supervisor
/// currently says (this is how a `healthy -> unhealthy -> healthy` recovery
/// becomes visible here with no callback involved, per spec.md §4.4 "no
/// callback fires on recovery" / §4.5 "merged with the latest health
/// statuses"); a node the supervisor has never probed keeps membership's
/// own status (`unknown` until first probed, or `unhealthy` if an
/// unhealthy-edge callback already fired for it this process lifetime).
fn merge_health(mut node: NodeInfo, state: &CoordinatorState) -> NodeInfo {
    if let Some(health) = state.supervisor.get_node_health(&node.id) {
        node.status = health.status;
        node.last_health_check = health.last_check;
    }
    node
}

async fn list_nodes(State(state): State<CoordinatorState>) -> Json<NodesResponse> {
    let nodes = state
        .membership
        .list_nodes()
        .into_iter()
        .map(|n| merge_health(n, &state))
        .collect();
    Json(NodesResponse { nodes })
}

#[derive(Serialize)]
struct ShardsResponse {
    num_shards: u32,
    shards: Vec<ShardAssignment>,
}

async fn list_shards(State(state): State<CoordinatorState>) -> Json<ShardsResponse> {
    Json(ShardsResponse {
        num_shards: state.registry.num_shards(),
        shards: state.registry.get_all_assignments(),
    })
}

#[derive(Deserialize)]
struct AssignRequest {
    shard_id: u32,
    node_id: String,
}

async fn assign_shard(
    State(state): State<CoordinatorState>,
    Json(body): Json<AssignRequest>,
) -> AppResult<StatusCode> {
    // is_primary is always true; the replica code path is unused, see DESIGN.md.
    state.registry.assign(body.shard_id, body.node_id, true)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct CoordinatorStats {
    num_shards: u32,
    registered_nodes: usize,
    healthy_nodes: usize,
    unhealthy_nodes: usize,
}

async fn stats(State(state): State<CoordinatorState>) -> Json<CoordinatorStats> {
    let nodes: Vec<NodeInfo> = state
        .membership
        .list_nodes()
        .into_iter()
        .map(|n| merge_health(n, &state))
        .collect();
    let healthy_nodes = nodes.iter().filter(|n| n.status == NodeStatus::Healthy).count();
    let unhealthy_nodes = nodes.iter().filter(|n| n.status == NodeStatus::Unhealthy).count();

    Json(CoordinatorStats {
        num_shards: state.registry.num_shards(),
        registered_nodes: nodes.len(),
        healthy_nodes,
        unhealthy_nodes,
    })
}

#[derive(Deserialize)]
struct BroadcastRequest {
    path: String,
    payload: Value,
}

#[derive(Serialize)]
struct BroadcastResult {
    node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<String>,
}

#[derive(Serialize)]
struct BroadcastResponse {
    sent_to: usize,
    results: Vec<BroadcastResult>,
}

/// Broadcasts `payload` to every known node's `{addr}{path}`, one at a
/// time, in membership order, under one deadline shared across the whole
/// loop. A node whose turn comes up after the deadline has already passed
/// gets a synthesized "deadline exceeded" entry instead of a shorter,
/// per-node timeout. Individual node failures don't abort the rest of the
/// broadcast.
async fn broadcast(
    State(state): State<CoordinatorState>,
    Json(body): Json<BroadcastRequest>,
) -> AppResult<Json<BroadcastResponse>> {
    if !body.path.starts_with('/') {
        return Err(AppError::Validation("broadcast path must start with '/'".to_string()));
    }

    let nodes = state.membership.list_nodes();
    let deadline = tokio::time::Instant::now() + state.config.broadcast_timeout;
    let mut results = Vec::with_capacity(nodes.len());

    for node in &nodes {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            results.push(BroadcastResult {
                node_id: node.id.clone(),
                err: Some("deadline exceeded".to_string()),
            });
            continue;
        }

        let url = format!("{}{}", normalize_address(&node.address), body.path);
        let remaining = deadline - now;
        let outcome = state
            .client
            .post(&url)
            .json(&body.payload)
            .timeout(remaining)
            .send()
            .await;
        let err = match outcome {
            Ok(resp) if resp.status().is_success() => None,
            Ok(resp) => Some(format!("node returned {}", resp.status())),
            Err(err) => Some(err.to_string()),
        };
        results.push(BroadcastResult {
            node_id: node.id.clone(),
            err,
        });
    }

    Ok(Json(BroadcastResponse {
        sent_to: nodes.len(),
        results,
    }))
}

/// Computes the target shard and resolves its owning node's address,
/// steps 1-3 of the proxying algorithm. Steps 4-5 (URL construction and
/// the actual forward) are method-specific and done by each caller.
async fn resolve_target(state: &CoordinatorState, key: &str) -> AppResult<(u32, String)> {
    let shard_id = state.registry.shard_for_key(key);
    let node_id = state
        .registry
        .get_assignment(shard_id)
        .map(|a| a.node_id)
        .ok_or_else(|| AppError::Unassigned(format!("shard {shard_id} has no assigned owner")))?;
    let node = state
        .membership
        .get_node(&node_id)
        .ok_or_else(|| AppError::Unassigned(format!("node {node_id} is not a known member")))?;
    Ok((shard_id, node.address))
}

/// Streams an upstream node response straight through: status code,
/// `Content-Type` (if the node set one), and body bytes, bit-exact.
async fn forward_response(resp: reqwest::Response) -> AppResult<Response> {
    let status = resp.status();
    let status_code = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = resp
        .bytes()
        .await
        .map_err(|err| AppError::Transport(err.to_string()))?;

    let mut response = (status_code, bytes).into_response();
    if let Some(content_type) = content_type {
        if let Ok(value) = axum::http::HeaderValue::from_str(&content_type) {
            response.headers_mut().insert(CONTENT_TYPE, value);
        }
    }
    Ok(response)
}

fn require_nonempty_key(key: &str) -> AppResult<()> {
    if key.is_empty() {
        return Err(AppError::Validation("key must not be empty".to_string()));
    }
    Ok(())
}

/// Handles any method on `/data/` (no key suffix at all): always the same
/// "empty key" validation error `/data/{*key}` gives for a literal empty
/// key, since axum's wildcard route never matches a bare `/data/`.
async fn empty_key() -> AppError {
    AppError::Validation("key must not be empty".to_string())
}

async fn get_data(State(state): State<CoordinatorState>, Path(key): Path<String>) -> AppResult<Response> {
    require_nonempty_key(&key)?;
    let (shard_id, address) = resolve_target(&state, &key).await?;
    let url = format!("{}/shard/{shard_id}/store/{key}", normalize_address(&address));
    let resp = state
        .client
        .get(&url)
        .timeout(state.config.request_timeout)
        .send()
        .await
        .map_err(|err| AppError::Transport(err.to_string()))?;
    forward_response(resp).await
}

async fn put_data(
    State(state): State<CoordinatorState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    require_nonempty_key(&key)?;
    let (shard_id, address) = resolve_target(&state, &key).await?;
    let url = format!("{}/shard/{shard_id}/store/{key}", normalize_address(&address));
    let mut request = state.client.put(&url).body(body).timeout(state.config.request_timeout);
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        request = request.header(CONTENT_TYPE, content_type);
    }
    let resp = request
        .send()
        .await
        .map_err(|err| AppError::Transport(err.to_string()))?;
    forward_response(resp).await
}

async fn delete_data(State(state): State<CoordinatorState>, Path(key): Path<String>) -> AppResult<Response> {
    require_nonempty_key(&key)?;
    let (shard_id, address) = resolve_target(&state, &key).await?;
    let url = format!("{}/shard/{shard_id}/store/{key}", normalize_address(&address));
    let resp = state
        .client
        .delete(&url)
        .timeout(state.config.request_timeout)
        .send()
        .await
        .map_err(|err| AppError::Transport(err.to_string()))?;
    forward_response(resp).await
}
