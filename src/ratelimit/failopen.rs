//! Fail-open policy for callers of the limiter.
//!
//! The limiter reports every ledger failure. Callers that guard user-facing
//! actions substitute a permissive decision instead of blocking.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::backend::RateLimiterBackend;
use super::identity::Identity;
use super::limiter::{Decision, UsageStats};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Replace a failed check with an unbounded allow.
pub fn fail_open<E: std::fmt::Display>(
    result: std::result::Result<Decision, E>,
    now: i64,
) -> Decision {
    match result {
        Ok(decision) => decision,
        Err(e) => {
            warn!(error = %e, "Rate limit check failed, allowing");
            Decision::unbounded(now)
        }
    }
}

/// A backend whose checks never fail.
///
/// This is the guard for code that embeds a [`RateLimiter`](super::RateLimiter)
/// in-process and calls it directly. The gRPC service serves the bare
/// limiter so remote callers see `internal` on ledger failure and apply this
/// policy themselves (see `RateLimitClient::check`).
///
/// Usage statistics are passed through unchanged, errors included.
pub struct FailOpen<B> {
    inner: B,
    clock: Arc<dyn Clock>,
}

impl<B: RateLimiterBackend> FailOpen<B> {
    pub fn new(inner: B) -> Self {
        Self::with_clock(inner, Arc::new(SystemClock))
    }

    pub fn with_clock(inner: B, clock: Arc<dyn Clock>) -> Self {
        Self { inner, clock }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: RateLimiterBackend> RateLimiterBackend for FailOpen<B> {
    async fn check_rate_limit(
        &self,
        identity: Option<&Identity>,
        action: &str,
    ) -> Result<Decision> {
        let result = self.inner.check_rate_limit(identity, action).await;
        Ok(fail_open(result, self.clock.now_millis()))
    }

    async fn usage_stats(&self, identity: Option<&Identity>) -> Result<UsageStats> {
        self.inner.usage_stats(identity).await
    }
}
