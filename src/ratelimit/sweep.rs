//! Retention sweep for expired ledger records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::clock::{Clock, SystemClock};
use crate::ledger::{Ledger, LedgerError, RecordQuery};

/// Records older than this are past every configured window.
pub const DEFAULT_RETENTION_MS: u64 = 3_600_000;
/// Most records removed per cycle.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Deletes ledger records that have aged past the retention horizon.
///
/// Each cycle removes at most one batch; anything left over waits for the
/// next cycle.
pub struct RetentionSweep {
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    retention_ms: u64,
    batch_size: usize,
}

impl RetentionSweep {
    /// Create a sweep with the default horizon and batch size.
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            clock: Arc::new(SystemClock),
            retention_ms: DEFAULT_RETENTION_MS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retention_ms(mut self, retention_ms: u64) -> Self {
        self.retention_ms = retention_ms;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run one cycle, returning the number of records deleted.
    pub async fn run_once(&self) -> Result<usize, LedgerError> {
        let horizon = self
            .clock
            .now_millis()
            .saturating_sub(i64::try_from(self.retention_ms).unwrap_or(i64::MAX));

        let expired = self
            .ledger
            .query(&RecordQuery::new().older_than(horizon).limit(self.batch_size))
            .await?;
        if expired.is_empty() {
            debug!(horizon = horizon, "No expired ledger records");
            return Ok(0);
        }

        let ids: Vec<_> = expired.iter().map(|r| r.id).collect();
        let deleted = self.ledger.delete_batch(&ids).await?;

        info!(deleted = deleted, horizon = horizon, "Removed expired ledger records");
        Ok(deleted)
    }

    /// Run a cycle every `interval` until `shutdown` flips to true.
    ///
    /// The first cycle runs immediately. Failed cycles are logged and the
    /// schedule continues.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Ledger retention sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Retention sweep stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
