//! Caller identities and the quota tier they map to.

use serde::{Deserialize, Serialize};

/// Ledger identifier shared by every caller without a verified identity.
pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable unique id of the caller
    pub uid: String,
    /// Whether the credential carries the admin assertion
    pub privileged: bool,
}

impl Identity {
    /// A regular signed-in caller.
    pub fn user(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            privileged: false,
        }
    }

    /// A signed-in caller with the admin assertion.
    pub fn admin(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            privileged: true,
        }
    }
}

/// Quota class of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// No verified identity
    Anonymous,
    /// Verified identity
    Authenticated,
    /// Verified identity with the admin assertion
    Privileged,
}

impl Tier {
    /// The tier for a caller, `None` meaning anonymous.
    pub fn of(identity: Option<&Identity>) -> Self {
        match identity {
            None => Tier::Anonymous,
            Some(id) if id.privileged => Tier::Privileged,
            Some(_) => Tier::Authenticated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Authenticated => "authenticated",
            Tier::Privileged => "privileged",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ledger identifier for a caller.
pub fn identifier_of(identity: Option<&Identity>) -> &str {
    identity.map_or(ANONYMOUS_IDENTIFIER, |id| id.uid.as_str())
}
