pub mod host;
pub mod registrar;
pub mod store;

pub use host::{router, NodeState};
pub use store::ShardStore;
