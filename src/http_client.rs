//! One owned HTTP client per process, built once at start-up.
//!
//! The teacher repo's global-`Client`-style singletons don't generalize:
//! here the coordinator needs one client for health probes and one
//! (semantically the same object, same pool) for proxied data calls, and
//! the node needs one for registration. Rather than a process-wide
//! default, callers construct a client explicitly at start-up and thread
//! it through `CoordinatorState` / the registrar, per spec.md's design
//! note on replacing "global HTTP client" patterns with an explicit, owned
//! instance whose lifecycle is tied to the process.

use std::time::Duration;

/// Builds a `reqwest::Client` with no default per-request timeout — callers
/// attach a deadline per call via `.timeout(..)` since different call sites
/// (health probe, proxy, broadcast) use different bounds.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .expect("reqwest client configuration is always valid")
}
