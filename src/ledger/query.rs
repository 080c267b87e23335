//! Record filters.

use super::LedgerRecord;
use crate::ratelimit::Window;

/// Equality and range filters over ledger records.
///
/// Unset filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    identifier: Option<String>,
    action: Option<String>,
    window: Option<Window>,
    older_than: Option<i64>,
    limit: Option<usize>,
}

impl RecordQuery {
    /// A query matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// The records counted against `identifier`'s quota for `action` in `window`.
    pub fn in_window(identifier: &str, action: &str, window: Window) -> Self {
        Self::new()
            .identifier(identifier)
            .action(action)
            .within(window)
    }

    /// Only records for this identifier.
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Only records for this action.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Only records inside the window.
    pub fn within(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    /// Only records stamped strictly before `timestamp`.
    pub fn older_than(mut self, timestamp: i64) -> Self {
        self.older_than = Some(timestamp);
        self
    }

    /// Return at most `limit` records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The result cap, if any.
    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    /// Whether a record satisfies every filter.
    pub fn matches(&self, record: &LedgerRecord) -> bool {
        if let Some(ref identifier) = self.identifier {
            if &record.identifier != identifier {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if &record.action != action {
                return false;
            }
        }
        if let Some(window) = self.window {
            if !window.contains(record.timestamp) {
                return false;
            }
        }
        if let Some(cutoff) = self.older_than {
            if record.timestamp >= cutoff {
                return false;
            }
        }
        true
    }

    /// Filter, sort oldest first and truncate a set of candidate records.
    pub(crate) fn select<'a, I>(&self, records: I) -> Vec<LedgerRecord>
    where
        I: IntoIterator<Item = &'a LedgerRecord>,
    {
        let mut selected: Vec<LedgerRecord> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        selected.sort_by_key(|r| (r.timestamp, r.id));
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}
