pub mod app_state;
pub mod membership;
pub mod registry;
pub mod router;
pub mod supervisor;

pub use app_state::{CoordinatorState, RouterConfig};
pub use membership::{MembershipCallback, MembershipManager};
pub use registry::ShardRegistry;
pub use router::router;
pub use supervisor::{HealthSupervisor, OnUnhealthy, SupervisorParams};
