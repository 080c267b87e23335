//! Core rate limiter implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::identity::{identifier_of, Identity, Tier};
use super::quota::QuotaTable;
use super::window::Window;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerRecord, RecordQuery};

/// `remaining` reported for actions without a quota.
pub const UNBOUNDED: u64 = u64::MAX;

/// Reset horizon reported for actions without a quota.
const UNLISTED_ACTION_RESET_MS: u64 = 60_000;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the guarded action may proceed
    pub allowed: bool,
    /// Attempts left in the current window, [`UNBOUNDED`] when no quota applies
    pub remaining: u64,
    /// When the caller should consider the quota refreshed, epoch milliseconds
    pub reset_at: i64,
}

impl Decision {
    /// The decision for an action no quota applies to.
    pub fn unbounded(now: i64) -> Self {
        Self {
            allowed: true,
            remaining: UNBOUNDED,
            reset_at: Window::trailing(now, UNLISTED_ACTION_RESET_MS).reset_at(),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.remaining == UNBOUNDED
    }
}

/// Usage of one action in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionUsage {
    pub used: u64,
    pub limit: u64,
    pub reset_at: i64,
}

/// Usage per action name.
pub type UsageStats = BTreeMap<String, ActionUsage>;

/// Fixed-window rate limiter over a shared ledger.
///
/// The limiter holds no mutable state of its own: the count is read from the
/// ledger and the admission is written back in a separate round trip. Two
/// concurrent checks for the same caller can therefore both be admitted at
/// the edge of the quota.
pub struct RateLimiter {
    quotas: Arc<QuotaTable>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter reading the system clock.
    pub fn new(quotas: Arc<QuotaTable>, ledger: Arc<dyn Ledger>) -> Self {
        Self::with_clock(quotas, ledger, Arc::new(SystemClock))
    }

    /// Create a limiter with an explicit time source.
    pub fn with_clock(
        quotas: Arc<QuotaTable>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            quotas,
            ledger,
            clock,
        }
    }

    /// The quota table in force.
    pub fn quotas(&self) -> &QuotaTable {
        &self.quotas
    }

    /// Decide whether `identity` may perform `action` now.
    ///
    /// Admitted attempts are recorded in the ledger; refused ones are not.
    /// `remaining` is the headroom seen before this attempt was recorded.
    /// Ledger failures are returned as errors.
    pub async fn check_rate_limit(
        &self,
        identity: Option<&Identity>,
        action: &str,
    ) -> Result<Decision> {
        let now = self.clock.now_millis();
        let tier = Tier::of(identity);

        let Some(quota) = self.quotas.lookup(tier, action) else {
            trace!(tier = %tier, action = action, "No quota configured, allowing");
            return Ok(Decision::unbounded(now));
        };

        let identifier = identifier_of(identity);
        let window = Window::trailing(now, quota.window_ms);

        let count = self
            .ledger
            .query(&RecordQuery::in_window(identifier, action, window))
            .await?
            .len() as u64;

        let allowed = count < quota.limit;
        let decision = Decision {
            allowed,
            remaining: quota.limit.saturating_sub(count),
            reset_at: window.reset_at(),
        };

        if allowed {
            let uid = identity.map(|id| id.uid.clone());
            self.ledger
                .insert(LedgerRecord::new(identifier, action, now, uid))
                .await?;
        }

        debug!(
            identifier = identifier,
            tier = %tier,
            action = action,
            count = count,
            limit = quota.limit,
            allowed = allowed,
            "Rate limit decision"
        );

        Ok(decision)
    }

    /// Report how much of each quota in the caller's tier is used.
    ///
    /// Anonymous callers are rejected with [`Error::Unauthenticated`].
    pub async fn usage_stats(&self, identity: Option<&Identity>) -> Result<UsageStats> {
        let identity = identity.ok_or(Error::Unauthenticated)?;
        let tier = Tier::of(Some(identity));
        let now = self.clock.now_millis();

        let mut stats = UsageStats::new();
        for (action, quota) in self.quotas.actions(tier) {
            let window = Window::trailing(now, quota.window_ms);
            let used = self
                .ledger
                .query(&RecordQuery::in_window(&identity.uid, action, window))
                .await?
                .len() as u64;

            stats.insert(
                action.to_string(),
                ActionUsage {
                    used,
                    limit: quota.limit,
                    reset_at: window.reset_at(),
                },
            );
        }

        Ok(stats)
    }
}

#[async_trait]
impl RateLimiterBackend for RateLimiter {
    async fn check_rate_limit(
        &self,
        identity: Option<&Identity>,
        action: &str,
    ) -> Result<Decision> {
        RateLimiter::check_rate_limit(self, identity, action).await
    }

    async fn usage_stats(&self, identity: Option<&Identity>) -> Result<UsageStats> {
        RateLimiter::usage_stats(self, identity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::testing::UnavailableLedger;
    use crate::ledger::MemoryLedger;
    use crate::ratelimit::quota::{Quota, READ, UPLOAD, WRITE};

    fn create_test_limiter() -> (RateLimiter, Arc<MemoryLedger>, Arc<ManualClock>) {
        let ledger = Arc::new(MemoryLedger::new());
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::with_clock(
            Arc::new(QuotaTable::standard()),
            ledger.clone(),
            clock.clone(),
        );
        (limiter, ledger, clock)
    }

    #[tokio::test]
    async fn test_write_quota_scenario() {
        let (limiter, _ledger, clock) = create_test_limiter();
        let u1 = Identity::user("u1");

        for i in 0..100 {
            let decision = limiter.check_rate_limit(Some(&u1), WRITE).await.unwrap();
            assert!(decision.allowed, "check {} should be allowed", i + 1);
            assert_eq!(decision.remaining, 100 - i);
            assert_eq!(decision.reset_at, 60_000);
        }

        clock.set(100);
        let decision = limiter.check_rate_limit(Some(&u1), WRITE).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);

        clock.set(61_000);
        let decision = limiter.check_rate_limit(Some(&u1), WRITE).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_every_configured_quota_is_enforced() {
        let quotas = QuotaTable::standard();
        let identities = [None, Some(Identity::user("u1")), Some(Identity::admin("a1"))];

        for identity in identities.iter() {
            let tier = Tier::of(identity.as_ref());
            for (action, quota) in quotas.actions(tier) {
                let (limiter, _ledger, clock) = create_test_limiter();

                for _ in 0..quota.limit {
                    let decision = limiter
                        .check_rate_limit(identity.as_ref(), action)
                        .await
                        .unwrap();
                    assert!(decision.allowed);
                }

                clock.advance(quota.window_ms as i64 - 1);
                let decision = limiter
                    .check_rate_limit(identity.as_ref(), action)
                    .await
                    .unwrap();
                assert!(!decision.allowed, "{}/{} over limit", tier, action);
                assert_eq!(decision.remaining, 0);

                clock.advance(1);
                let decision = limiter
                    .check_rate_limit(identity.as_ref(), action)
                    .await
                    .unwrap();
                assert!(decision.allowed, "{}/{} after window", tier, action);
            }
        }
    }

    #[tokio::test]
    async fn test_first_check_reports_full_quota() {
        let (limiter, _ledger, _clock) = create_test_limiter();

        let decision = limiter
            .check_rate_limit(Some(&Identity::user("u1")), WRITE)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 100);

        let decision = limiter
            .check_rate_limit(Some(&Identity::user("u1")), WRITE)
            .await
            .unwrap();
        assert_eq!(decision.remaining, 99);
    }

    /// Holds every query until all concurrent checks have counted.
    struct LockstepLedger {
        inner: MemoryLedger,
        counted: tokio::sync::Barrier,
    }

    #[async_trait]
    impl Ledger for LockstepLedger {
        async fn insert(
            &self,
            record: LedgerRecord,
        ) -> std::result::Result<(), crate::ledger::LedgerError> {
            self.inner.insert(record).await
        }

        async fn query(
            &self,
            query: &RecordQuery,
        ) -> std::result::Result<Vec<LedgerRecord>, crate::ledger::LedgerError> {
            let records = self.inner.query(query).await;
            self.counted.wait().await;
            records
        }

        async fn delete_batch(
            &self,
            ids: &[uuid::Uuid],
        ) -> std::result::Result<usize, crate::ledger::LedgerError> {
            self.inner.delete_batch(ids).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_can_over_admit() {
        const CALLERS: usize = 4;
        let ledger = Arc::new(LockstepLedger {
            inner: MemoryLedger::new(),
            counted: tokio::sync::Barrier::new(CALLERS),
        });
        let quotas = QuotaTable::empty().with(Tier::Authenticated, WRITE, Quota::new(1, 60_000));
        let limiter = Arc::new(RateLimiter::with_clock(
            Arc::new(quotas),
            ledger.clone(),
            Arc::new(ManualClock::new(0)),
        ));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter
                        .check_rate_limit(Some(&Identity::user("u1")), WRITE)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                admitted += 1;
            }
        }

        // Count and insert are separate round trips, so every caller that
        // counted before the first insert is admitted.
        assert_eq!(admitted, CALLERS);
        assert_eq!(ledger.inner.len(), CALLERS);
    }

    #[tokio::test]
    async fn test_rejected_attempts_are_not_recorded() {
        let quotas = QuotaTable::empty().with(Tier::Authenticated, WRITE, Quota::new(2, 1_000));
        let ledger = Arc::new(MemoryLedger::new());
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::with_clock(Arc::new(quotas), ledger.clone(), clock);
        let u1 = Identity::user("u1");

        for _ in 0..5 {
            limiter.check_rate_limit(Some(&u1), WRITE).await.unwrap();
        }
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_remaining_never_increases_within_window() {
        let quotas = QuotaTable::empty().with(Tier::Anonymous, READ, Quota::new(5, 60_000));
        let clock = Arc::new(ManualClock::new(1_000));
        let limiter =
            RateLimiter::with_clock(Arc::new(quotas), Arc::new(MemoryLedger::new()), clock.clone());

        let mut previous = u64::MAX;
        for _ in 0..8 {
            clock.advance(10);
            let decision = limiter.check_rate_limit(None, READ).await.unwrap();
            assert!(decision.remaining <= previous);
            previous = decision.remaining;
        }
        assert_eq!(previous, 0);
    }

    #[tokio::test]
    async fn test_anonymous_callers_share_one_bucket() {
        let (limiter, ledger, _clock) = create_test_limiter();

        for _ in 0..100 {
            assert!(limiter.check_rate_limit(None, READ).await.unwrap().allowed);
        }
        // A second unauthenticated caller sees the exhausted shared quota.
        let decision = limiter.check_rate_limit(None, READ).await.unwrap();
        assert!(!decision.allowed);

        let records = ledger.query(&RecordQuery::new()).await.unwrap();
        assert!(records.iter().all(|r| r.identifier == "anonymous" && r.uid.is_none()));
    }

    #[tokio::test]
    async fn test_anonymous_has_no_write_quota() {
        let (limiter, ledger, _clock) = create_test_limiter();

        let decision = limiter.check_rate_limit(None, WRITE).await.unwrap();
        assert!(decision.allowed);
        assert!(decision.is_unbounded());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_always_allowed() {
        let (limiter, ledger, clock) = create_test_limiter();
        clock.set(5_000);
        let admin = Identity::admin("a1");

        for identity in [None, Some(&admin)] {
            for _ in 0..2_000 {
                let decision = limiter
                    .check_rate_limit(identity, "nonexistent-action")
                    .await
                    .unwrap();
                assert!(decision.allowed);
                assert_eq!(decision.remaining, UNBOUNDED);
                assert_eq!(decision.reset_at, 65_000);
            }
        }
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_tiers_are_counted_per_identifier() {
        let (limiter, _ledger, _clock) = create_test_limiter();
        let u1 = Identity::user("u1");
        let u2 = Identity::user("u2");

        for _ in 0..20 {
            assert!(limiter.check_rate_limit(Some(&u1), UPLOAD).await.unwrap().allowed);
        }
        assert!(!limiter.check_rate_limit(Some(&u1), UPLOAD).await.unwrap().allowed);
        assert!(limiter.check_rate_limit(Some(&u2), UPLOAD).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_records_carry_uid() {
        let (limiter, ledger, clock) = create_test_limiter();
        clock.set(42);

        limiter
            .check_rate_limit(Some(&Identity::admin("a1")), READ)
            .await
            .unwrap();

        let records = ledger.query(&RecordQuery::new()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "a1");
        assert_eq!(records[0].action, READ);
        assert_eq!(records[0].timestamp, 42);
        assert_eq!(records[0].uid.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_ledger_failure_propagates() {
        let limiter = RateLimiter::with_clock(
            Arc::new(QuotaTable::standard()),
            Arc::new(UnavailableLedger),
            Arc::new(ManualClock::new(0)),
        );

        let result = limiter.check_rate_limit(Some(&Identity::user("u1")), WRITE).await;
        assert!(matches!(result, Err(Error::Ledger(_))));

        // Unlisted actions never touch the ledger.
        let result = limiter.check_rate_limit(None, "nonexistent-action").await;
        assert!(result.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_usage_stats_requires_identity() {
        let (limiter, _ledger, _clock) = create_test_limiter();
        let result = limiter.usage_stats(None).await;
        assert!(matches!(result, Err(Error::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_usage_stats_reports_tier_actions() {
        let (limiter, _ledger, clock) = create_test_limiter();
        let u1 = Identity::user("u1");

        for _ in 0..3 {
            limiter.check_rate_limit(Some(&u1), WRITE).await.unwrap();
        }
        limiter.check_rate_limit(Some(&u1), UPLOAD).await.unwrap();

        clock.set(1_000);
        let stats = limiter.usage_stats(Some(&u1)).await.unwrap();
        assert_eq!(stats.len(), 3);
        assert_eq!(
            stats[WRITE],
            ActionUsage {
                used: 3,
                limit: 100,
                reset_at: 61_000
            }
        );
        assert_eq!(stats[UPLOAD].used, 1);
        assert_eq!(stats[UPLOAD].reset_at, 3_601_000);
        assert_eq!(stats[READ].used, 0);

        let admin_stats = limiter
            .usage_stats(Some(&Identity::admin("a1")))
            .await
            .unwrap();
        assert_eq!(admin_stats.len(), 3);
        assert_eq!(admin_stats[WRITE].limit, 500);
        assert_eq!(admin_stats[WRITE].used, 0);
    }

    #[tokio::test]
    async fn test_usage_stats_drops_expired_records() {
        let (limiter, _ledger, clock) = create_test_limiter();
        let u1 = Identity::user("u1");

        limiter.check_rate_limit(Some(&u1), READ).await.unwrap();
        limiter.check_rate_limit(Some(&u1), UPLOAD).await.unwrap();

        clock.set(60_000);
        let stats = limiter.usage_stats(Some(&u1)).await.unwrap();
        assert_eq!(stats[READ].used, 0);
        assert_eq!(stats[UPLOAD].used, 1);
    }
}
