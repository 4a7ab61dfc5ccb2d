//! Thread-safe in-memory key-value store, one instance per node, holding
//! one `ShardData` per owned shard.

use std::collections::HashMap;
use std::sync::RwLock;

/// Error returned by store operations. `Get` is the only operation that can
/// fail in the expected sense; everything else is infallible in-memory work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    KeyNotFound,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::KeyNotFound => write!(f, "key not found"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Exact counts for one shard: number of keys and total bytes of stored
/// values (keys themselves don't count toward `bytes`).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ShardStats {
    pub keys: usize,
    pub bytes: usize,
    pub operations: u64,
}

/// A stored value plus the `Content-Type` the client supplied on `PUT`, so
/// a later `GET` can hand it back unchanged. `bytes()` is what counts
/// toward `ShardStats::bytes`; the content type is metadata, not payload.
#[derive(Clone, Default)]
pub struct StoredValue {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// One shard's worth of key-value data plus its operation counter. Always
/// created as a primary with an empty map (see `ShardStore::get_or_create`).
#[derive(Default)]
struct ShardData {
    map: HashMap<String, StoredValue>,
    operations: u64,
}

impl ShardData {
    fn get(&mut self, key: &str) -> Result<StoredValue, StoreError> {
        self.operations += 1;
        self.map.get(key).cloned().ok_or(StoreError::KeyNotFound)
    }

    fn put(&mut self, key: String, value: StoredValue) {
        self.operations += 1;
        self.map.insert(key, value);
    }

    fn delete(&mut self, key: &str) {
        self.operations += 1;
        self.map.remove(key);
    }

    fn list(&mut self) -> Vec<String> {
        self.operations += 1;
        self.map.keys().cloned().collect()
    }

    fn stats(&self) -> ShardStats {
        ShardStats {
            keys: self.map.len(),
            bytes: self.map.values().map(|v| v.bytes.len()).sum(),
            operations: self.operations,
        }
    }
}

/// Map of shard id to `ShardData`, each behind its own lock so that writes
/// to one shard never block reads or writes to another. The outer lock only
/// ever guards the existence of shards, never the data inside them.
pub struct ShardStore {
    shards: RwLock<HashMap<u32, RwLock<ShardData>>>,
}

impl ShardStore {
    pub fn new() -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
        }
    }

    /// Runs `f` against the shard's data, creating it empty on first access.
    /// This is the on-demand shard creation the coordinator relies on: a
    /// node asked about a shard it has never heard of silently starts
    /// hosting it, as a primary, with an empty store.
    fn with_shard<R>(&self, shard_id: u32, f: impl FnOnce(&mut ShardData) -> R) -> R {
        {
            let shards = self.shards.read().expect("shard map lock poisoned");
            if let Some(shard) = shards.get(&shard_id) {
                let mut guard = shard.write().expect("shard lock poisoned");
                return f(&mut guard);
            }
        }

        // Miss: escalate to a write lock and create the shard, re-checking
        // in case another task created it between the read and write lock.
        let mut shards = self.shards.write().expect("shard map lock poisoned");
        let shard = shards.entry(shard_id).or_insert_with(RwLock::default);
        let mut guard = shard.write().expect("shard lock poisoned");
        f(&mut guard)
    }

    pub fn get(&self, shard_id: u32, key: &str) -> Result<StoredValue, StoreError> {
        self.with_shard(shard_id, |shard| shard.get(key))
    }

    pub fn put(&self, shard_id: u32, key: String, value: Vec<u8>, content_type: Option<String>) {
        self.with_shard(shard_id, |shard| shard.put(key, StoredValue { bytes: value, content_type }));
    }

    pub fn delete(&self, shard_id: u32, key: &str) {
        self.with_shard(shard_id, |shard| shard.delete(key));
    }

    pub fn list(&self, shard_id: u32) -> Vec<String> {
        self.with_shard(shard_id, |shard| shard.list())
    }

    pub fn stats(&self, shard_id: u32) -> ShardStats {
        self.with_shard(shard_id, |shard| shard.stats())
    }

    /// All shard ids currently materialized on this node. There is no
    /// separate assignment table on the node side: a shard exists here iff
    /// some request has touched it, which is the node's whole notion of
    /// ownership under the on-demand-creation contract.
    pub fn shard_ids(&self) -> Vec<u32> {
        let shards = self.shards.read().expect("shard map lock poisoned");
        let mut ids: Vec<u32> = shards.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ShardStore {
    fn default() -> Self {
        Self::new()
    }
}
