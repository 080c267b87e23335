//! Rate limiter trait for abstracting the strict limiter and its wrappers.

use async_trait::async_trait;

use super::identity::Identity;
use super::limiter::{Decision, UsageStats};
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// This trait abstracts over the ledger-backed `RateLimiter` and wrappers
/// such as `FailOpen`, so the gRPC service and in-process callers can work
/// with either.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Check (and on success record) an attempt at `action`.
    async fn check_rate_limit(&self, identity: Option<&Identity>, action: &str)
        -> Result<Decision>;

    /// Per-action usage for a signed-in caller.
    async fn usage_stats(&self, identity: Option<&Identity>) -> Result<UsageStats>;
}
