//! In-process ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{Ledger, LedgerError, LedgerRecord, RecordQuery};

/// A ledger held entirely in memory.
///
/// Contents are lost on restart. Batch deletes happen under a single write
/// lock, so readers never observe half of a batch.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<HashMap<Uuid, LedgerRecord>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the ledger holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn insert(&self, record: LedgerRecord) -> Result<(), LedgerError> {
        self.records.write().insert(record.id, record);
        Ok(())
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<LedgerRecord>, LedgerError> {
        let records = self.records.read();
        Ok(query.select(records.values()))
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<usize, LedgerError> {
        let mut records = self.records.write();
        Ok(ids.iter().filter(|id| records.remove(*id).is_some()).count())
    }
}
