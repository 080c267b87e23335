//! Per-tier, per-action quota configuration.
//!
//! The table is built once at startup (from the compiled-in defaults or a
//! configuration file) and shared read-only with the limiter and the sweep.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::identity::Tier;
use crate::error::{Error, Result};

pub const READ: &str = "read";
pub const WRITE: &str = "write";
pub const UPLOAD: &str = "upload";

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 3_600_000;

/// How many attempts an action allows over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Attempts admitted per window
    pub limit: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Quota {
    pub const fn new(limit: u64, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }

    pub const fn per_minute(limit: u64) -> Self {
        Self::new(limit, MINUTE_MS)
    }

    pub const fn per_hour(limit: u64) -> Self {
        Self::new(limit, HOUR_MS)
    }
}

/// Quotas keyed by tier, then by action name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaTable {
    tiers: BTreeMap<Tier, BTreeMap<String, Quota>>,
}

impl QuotaTable {
    /// An empty table. Every action is unlimited.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The production table.
    pub fn standard() -> Self {
        Self::empty()
            .with(Tier::Anonymous, READ, Quota::per_minute(100))
            .with(Tier::Anonymous, UPLOAD, Quota::per_hour(5))
            .with(Tier::Authenticated, READ, Quota::per_minute(500))
            .with(Tier::Authenticated, WRITE, Quota::per_minute(100))
            .with(Tier::Authenticated, UPLOAD, Quota::per_hour(20))
            .with(Tier::Privileged, READ, Quota::per_minute(1000))
            .with(Tier::Privileged, WRITE, Quota::per_minute(500))
            .with(Tier::Privileged, UPLOAD, Quota::per_hour(100))
    }

    /// Add or replace one entry.
    pub fn with(mut self, tier: Tier, action: impl Into<String>, quota: Quota) -> Self {
        self.tiers.entry(tier).or_default().insert(action.into(), quota);
        self
    }

    /// Parse a table from YAML of the form `tier: { action: { limit, window_ms } }`.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let table: QuotaTable = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse quota table: {}", e)))?;
        table.validate()?;
        Ok(table)
    }

    /// The quota for an action under a tier, if one is configured.
    pub fn lookup(&self, tier: Tier, action: &str) -> Option<&Quota> {
        self.tiers.get(&tier)?.get(action)
    }

    /// Every configured action for a tier, in name order.
    pub fn actions(&self, tier: Tier) -> impl Iterator<Item = (&str, &Quota)> {
        self.tiers
            .get(&tier)
            .into_iter()
            .flat_map(|actions| actions.iter().map(|(name, quota)| (name.as_str(), quota)))
    }

    /// The longest window in the table, in milliseconds.
    pub fn largest_window_ms(&self) -> u64 {
        self.tiers
            .values()
            .flat_map(|actions| actions.values())
            .map(|quota| quota.window_ms)
            .max()
            .unwrap_or(0)
    }

    /// Reject zero limits and zero-length windows.
    pub fn validate(&self) -> Result<()> {
        for (tier, actions) in &self.tiers {
            for (action, quota) in actions {
                if quota.limit == 0 {
                    return Err(Error::Config(format!(
                        "quota {}/{} has a zero limit",
                        tier, action
                    )));
                }
                if quota.window_ms == 0 {
                    return Err(Error::Config(format!(
                        "quota {}/{} has a zero-length window",
                        tier, action
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_entries() {
        let table = QuotaTable::standard();

        assert_eq!(
            table.lookup(Tier::Authenticated, WRITE),
            Some(&Quota::new(100, 60_000))
        );
        assert_eq!(table.lookup(Tier::Anonymous, UPLOAD), Some(&Quota::new(5, 3_600_000)));
        assert_eq!(table.lookup(Tier::Anonymous, WRITE), None);
        assert_eq!(table.lookup(Tier::Privileged, "nonexistent-action"), None);
    }

    #[test]
    fn test_standard_quotas_grow_with_privilege() {
        let table = QuotaTable::standard();
        let tiers = [Tier::Anonymous, Tier::Authenticated, Tier::Privileged];

        for action in [READ, WRITE, UPLOAD] {
            let limits: Vec<u64> = tiers
                .iter()
                .filter_map(|tier| table.lookup(*tier, action))
                .map(|q| q.limit)
                .collect();
            assert!(
                limits.windows(2).all(|pair| pair[0] < pair[1]),
                "{} limits not increasing: {:?}",
                action,
                limits
            );
        }
    }

    #[test]
    fn test_actions_per_tier() {
        let table = QuotaTable::standard();
        let anonymous: Vec<&str> = table.actions(Tier::Anonymous).map(|(a, _)| a).collect();
        assert_eq!(anonymous, vec![READ, UPLOAD]);

        let privileged: Vec<&str> = table.actions(Tier::Privileged).map(|(a, _)| a).collect();
        assert_eq!(privileged, vec![READ, UPLOAD, WRITE]);

        assert_eq!(QuotaTable::empty().actions(Tier::Authenticated).count(), 0);
    }

    #[test]
    fn test_largest_window() {
        assert_eq!(QuotaTable::standard().largest_window_ms(), 3_600_000);
        assert_eq!(QuotaTable::empty().largest_window_ms(), 0);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
anonymous:
  read:
    limit: 10
    window_ms: 1000
privileged:
  export:
    limit: 3
    window_ms: 60000
"#;
        let table = QuotaTable::from_yaml(yaml).unwrap();
        assert_eq!(table.lookup(Tier::Anonymous, READ), Some(&Quota::new(10, 1000)));
        assert_eq!(table.lookup(Tier::Privileged, "export"), Some(&Quota::new(3, 60_000)));
        assert_eq!(table.lookup(Tier::Authenticated, READ), None);
    }

    #[test]
    fn test_parse_rejects_unknown_tier() {
        let yaml = r#"
superuser:
  read:
    limit: 10
    window_ms: 1000
"#;
        assert!(QuotaTable::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let zero_limit = QuotaTable::empty().with(Tier::Anonymous, READ, Quota::new(0, 1000));
        assert!(zero_limit.validate().is_err());

        let zero_window = QuotaTable::empty().with(Tier::Anonymous, READ, Quota::new(1, 0));
        assert!(zero_window.validate().is_err());

        assert!(QuotaTable::standard().validate().is_ok());
    }
}
