//! End-to-end tests driving a real coordinator and one or more real node
//! processes over actual TCP sockets, exercising the proxying path the way
//! a client actually would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use torua::coordinator::{
    router as coordinator_router, CoordinatorState, HealthSupervisor, MembershipCallback,
    MembershipManager, RouterConfig, ShardRegistry, SupervisorParams,
};
use torua::http_client::build_client;
use torua::node::{router as node_router, NodeState, ShardStore};

async fn spawn_node(node_id: &str) -> SocketAddr {
    spawn_node_abortable(node_id, "127.0.0.1:0".parse().unwrap()).await.1
}

/// Like `spawn_node`, but returns the task handle so a test can `abort()`
/// it to simulate the node going dark without tearing down anything else.
async fn spawn_node_abortable(node_id: &str, addr: SocketAddr) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    let state = NodeState {
        node_id: node_id.to_string(),
        store: Arc::new(ShardStore::new()),
    };
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, node_router(state)).await.unwrap();
    });
    (handle, bound_addr)
}

struct CoordinatorHandle {
    addr: SocketAddr,
    registry: Arc<ShardRegistry>,
    membership: Arc<MembershipManager>,
}

async fn spawn_coordinator(num_shards: u32) -> CoordinatorHandle {
    let registry = Arc::new(ShardRegistry::new(num_shards));
    let membership = Arc::new(MembershipManager::new(Arc::clone(&registry)));
    let client = build_client();
    let supervisor = Arc::new(HealthSupervisor::new(
        SupervisorParams {
            interval: Duration::from_millis(50),
            timeout: Duration::from_millis(200),
            max_failures: 3,
        },
        client.clone(),
    ));

    let snapshot_membership = Arc::clone(&membership);
    supervisor
        .start(
            Arc::new(move || snapshot_membership.snapshot_for_supervisor()),
            Arc::new(MembershipCallback {
                membership: Arc::clone(&membership),
            }),
        )
        .await;

    let state = CoordinatorState {
        registry: Arc::clone(&registry),
        membership: Arc::clone(&membership),
        supervisor,
        client,
        config: RouterConfig {
            request_timeout: Duration::from_secs(2),
            broadcast_timeout: Duration::from_secs(2),
        },
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, coordinator_router(state)).await.unwrap();
    });

    CoordinatorHandle {
        addr,
        registry,
        membership,
    }
}

async fn register(client: &reqwest::Client, coordinator: SocketAddr, node_id: &str, node_addr: SocketAddr) {
    let body = json!({ "node": { "id": node_id, "addr": format!("http://{node_addr}") } });
    let resp = client
        .post(format!("http://{coordinator}/register"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn put_then_get_round_trips_through_the_coordinator() {
    let node_addr = spawn_node("n1").await;
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();
    register(&client, coordinator.addr, "n1", node_addr).await;

    let put = client
        .put(format!("http://{}/data/hello", coordinator.addr))
        .body("world")
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), 204);

    let get = client
        .get(format!("http://{}/data/hello", coordinator.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(get.status(), 200);
    assert_eq!(get.text().await.unwrap(), "world");
}

#[tokio::test]
async fn one_mebibyte_value_round_trips() {
    let node_addr = spawn_node("n1").await;
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();
    register(&client, coordinator.addr, "n1", node_addr).await;

    let value = vec![0x5au8; 1024 * 1024];
    let put = client
        .put(format!("http://{}/data/big", coordinator.addr))
        .body(value.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), 204);

    let get = client
        .get(format!("http://{}/data/big", coordinator.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(get.status(), 200);
    assert_eq!(get.bytes().await.unwrap().to_vec(), value);
}

#[tokio::test]
async fn key_containing_slashes_round_trips() {
    let node_addr = spawn_node("n1").await;
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();
    register(&client, coordinator.addr, "n1", node_addr).await;

    let put = client
        .put(format!("http://{}/data/path/to/a/key", coordinator.addr))
        .body("nested")
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), 204);

    let get = client
        .get(format!("http://{}/data/path/to/a/key", coordinator.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(get.status(), 200);
    assert_eq!(get.text().await.unwrap(), "nested");
}

#[tokio::test]
async fn delete_then_get_is_404() {
    let node_addr = spawn_node("n1").await;
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();
    register(&client, coordinator.addr, "n1", node_addr).await;

    client
        .put(format!("http://{}/data/k", coordinator.addr))
        .body("v")
        .send()
        .await
        .unwrap();
    let delete = client
        .delete(format!("http://{}/data/k", coordinator.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), 204);

    let get = client.get(format!("http://{}/data/k", coordinator.addr)).send().await.unwrap();
    assert_eq!(get.status(), 404);
}

#[tokio::test]
async fn content_type_round_trips_through_the_coordinator_and_node() {
    let node_addr = spawn_node("n1").await;
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();
    register(&client, coordinator.addr, "n1", node_addr).await;

    let put = client
        .put(format!("http://{}/data/hello", coordinator.addr))
        .header("content-type", "text/plain")
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), 204);

    let get = client
        .get(format!("http://{}/data/hello", coordinator.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(get.status(), 200);
    assert_eq!(
        get.headers().get("content-type").unwrap(),
        "text/plain"
    );
    assert_eq!(get.text().await.unwrap(), "hello");
}

#[tokio::test]
async fn empty_key_is_rejected_with_bad_request() {
    let node_addr = spawn_node("n1").await;
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();
    register(&client, coordinator.addr, "n1", node_addr).await;

    let resp = client
        .get(format!("http://{}/data/", coordinator.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn data_request_before_any_node_registers_is_503() {
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/data/anything", coordinator.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn two_nodes_split_the_shard_space() {
    let n1 = spawn_node("n1").await;
    let n2 = spawn_node("n2").await;
    let coordinator = spawn_coordinator(8).await;
    let client = reqwest::Client::new();
    register(&client, coordinator.addr, "n1", n1).await;
    register(&client, coordinator.addr, "n2", n2).await;

    let resp = client
        .get(format!("http://{}/shards", coordinator.addr))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["num_shards"], 8);
    let assignments = body["shards"].as_array().unwrap();
    assert_eq!(assignments.len(), 8);

    let n1_shards = coordinator.registry.get_node_shards("n1").len();
    let n2_shards = coordinator.registry.get_node_shards("n2").len();
    assert_eq!(n1_shards, 4);
    assert_eq!(n2_shards, 4);
}

#[tokio::test]
async fn broadcast_reaches_every_registered_node() {
    let n1 = spawn_node("n1").await;
    let n2 = spawn_node("n2").await;
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();
    register(&client, coordinator.addr, "n1", n1).await;
    register(&client, coordinator.addr, "n2", n2).await;

    let resp = client
        .post(format!("http://{}/broadcast", coordinator.addr))
        .json(&json!({ "path": "/control", "payload": { "op": "ping" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sent_to"], 2);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    for entry in results {
        assert!(entry["err"].is_null());
    }
}

#[tokio::test]
async fn unreachable_node_surfaces_as_bad_gateway() {
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();
    // Nothing listens on this address; registering it still assigns every
    // shard since auto_assign has no way to know the node is unreachable.
    let ghost: SocketAddr = "127.0.0.1:1".parse().unwrap();
    register(&client, coordinator.addr, "ghost", ghost).await;

    let resp = client
        .get(format!("http://{}/data/anything", coordinator.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn health_supervisor_marks_a_dead_node_unhealthy_after_repeated_failures() {
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();
    let ghost: SocketAddr = "127.0.0.1:1".parse().unwrap();
    register(&client, coordinator.addr, "ghost", ghost).await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    let node = coordinator.membership.get_node("ghost").unwrap();
    assert_eq!(node.status, torua::types::NodeStatus::Unhealthy);
}

#[tokio::test]
async fn recovered_node_shows_healthy_in_nodes_listing_with_no_extra_callback() {
    let coordinator = spawn_coordinator(4).await;
    let client = reqwest::Client::new();

    let (handle, addr) = spawn_node_abortable("n1", "127.0.0.1:0".parse().unwrap()).await;
    register(&client, coordinator.addr, "n1", addr).await;

    // Let it go unhealthy: kill the node without freeing anything else.
    handle.abort();
    tokio::time::sleep(Duration::from_millis(400)).await;
    let nodes: Value = client
        .get(format!("http://{}/nodes", coordinator.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let n1 = nodes["nodes"].as_array().unwrap().iter().find(|n| n["id"] == "n1").unwrap();
    assert_eq!(n1["status"], "unhealthy");

    // Bring a fresh listener up on the same address to simulate recovery.
    let _restarted = spawn_node_abortable("n1", addr).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let nodes: Value = client
        .get(format!("http://{}/nodes", coordinator.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let n1 = nodes["nodes"].as_array().unwrap().iter().find(|n| n["id"] == "n1").unwrap();
    assert_eq!(n1["status"], "healthy");
}
