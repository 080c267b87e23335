//! Rate limiting logic: quotas, decisions, fail-open policy and retention.

mod backend;
mod failopen;
mod identity;
mod limiter;
mod quota;
mod sweep;
mod window;

pub use backend::RateLimiterBackend;
pub use failopen::{fail_open, FailOpen};
pub use identity::{identifier_of, Identity, Tier, ANONYMOUS_IDENTIFIER};
pub use limiter::{ActionUsage, Decision, RateLimiter, UsageStats, UNBOUNDED};
pub use quota::{Quota, QuotaTable, READ, UPLOAD, WRITE};
pub use sweep::{RetentionSweep, DEFAULT_BATCH_SIZE, DEFAULT_RETENTION_MS};
pub use window::Window;
