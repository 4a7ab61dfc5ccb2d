//! Torua: a sharded in-memory key-value store split across a coordinator
//! process and N node processes. See `coordinator` and `node` for the two
//! halves, `hashing` for the key-to-shard function shared by both, and
//! `types` for the wire-level cluster state types.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod hashing;
pub mod http_client;
pub mod node;
pub mod types;

pub use error::{AppError, AppResult};
