//! The ledger: a durable record of every permitted attempt.
//!
//! The limiter counts ledger records to decide whether a request fits its
//! quota, and the retention sweep deletes records that have aged past every
//! window. Records are immutable once written.

mod journal;
mod memory;
mod query;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use journal::JournalLedger;
pub use memory::MemoryLedger;
pub use query::RecordQuery;

use crate::config::{LedgerBackend, LedgerConfig};

/// Errors raised by ledger backends.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// One permitted attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Backend-independent record id, used for deletes
    pub id: Uuid,
    /// The uid, or the anonymous sentinel
    pub identifier: String,
    /// The guarded action
    pub action: String,
    /// When the attempt was admitted, epoch milliseconds
    pub timestamp: i64,
    /// The verified uid, absent for anonymous callers
    pub uid: Option<String>,
}

impl LedgerRecord {
    /// Create a record with a fresh id.
    pub fn new(
        identifier: impl Into<String>,
        action: impl Into<String>,
        timestamp: i64,
        uid: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier: identifier.into(),
            action: action.into(),
            timestamp,
            uid,
        }
    }
}

/// Storage for ledger records.
///
/// Implementations must make `delete_batch` all-or-nothing.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append a record.
    async fn insert(&self, record: LedgerRecord) -> Result<(), LedgerError>;

    /// Fetch the records matching `query`, oldest first.
    async fn query(&self, query: &RecordQuery) -> Result<Vec<LedgerRecord>, LedgerError>;

    /// Delete every record in `ids`, returning how many existed.
    async fn delete_batch(&self, ids: &[Uuid]) -> Result<usize, LedgerError>;
}

/// Open the ledger described by `config`.
pub async fn open(config: &LedgerConfig) -> Result<Arc<dyn Ledger>, LedgerError> {
    match config.backend {
        LedgerBackend::Memory => Ok(Arc::new(MemoryLedger::new())),
        LedgerBackend::Journal => {
            let path = config.path.as_ref().ok_or_else(|| {
                LedgerError::Unavailable("journal backend configured without a path".to_string())
            })?;
            Ok(Arc::new(JournalLedger::open(path, config.compact_after).await?))
        }
    }
}
