//! Wire messages for `ledgerlimit.v1.RateLimitService`.
//!
//! Service and client stubs are generated by `build.rs`.

use std::collections::HashMap;

use crate::ratelimit::{self, Decision, UsageStats};

/// Request body of `CheckRateLimit`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckRateLimitRequest {
    #[prost(string, tag = "1")]
    pub action: ::prost::alloc::string::String,
}

/// Response body of `CheckRateLimit`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckRateLimitResponse {
    #[prost(bool, tag = "1")]
    pub allowed: bool,
    /// `u64::MAX` when the action has no quota
    #[prost(uint64, tag = "2")]
    pub remaining: u64,
    #[prost(int64, tag = "3")]
    pub reset_at: i64,
}

/// Request body of `GetUsageStats`. The caller is taken from the credentials.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UsageStatsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActionUsage {
    #[prost(uint64, tag = "1")]
    pub used: u64,
    #[prost(uint64, tag = "2")]
    pub limit: u64,
    #[prost(int64, tag = "3")]
    pub reset_at: i64,
}

/// Response body of `GetUsageStats`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UsageStatsResponse {
    #[prost(map = "string, message", tag = "1")]
    pub actions: HashMap<::prost::alloc::string::String, ActionUsage>,
}

include!(concat!(env!("OUT_DIR"), "/ledgerlimit.v1.RateLimitService.rs"));

impl From<Decision> for CheckRateLimitResponse {
    fn from(decision: Decision) -> Self {
        Self {
            allowed: decision.allowed,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
        }
    }
}

impl From<CheckRateLimitResponse> for Decision {
    fn from(response: CheckRateLimitResponse) -> Self {
        Self {
            allowed: response.allowed,
            remaining: response.remaining,
            reset_at: response.reset_at,
        }
    }
}

impl From<ratelimit::ActionUsage> for ActionUsage {
    fn from(usage: ratelimit::ActionUsage) -> Self {
        Self {
            used: usage.used,
            limit: usage.limit,
            reset_at: usage.reset_at,
        }
    }
}

impl From<ActionUsage> for ratelimit::ActionUsage {
    fn from(usage: ActionUsage) -> Self {
        Self {
            used: usage.used,
            limit: usage.limit,
            reset_at: usage.reset_at,
        }
    }
}

impl From<UsageStats> for UsageStatsResponse {
    fn from(stats: UsageStats) -> Self {
        Self {
            actions: stats
                .into_iter()
                .map(|(action, usage)| (action, usage.into()))
                .collect(),
        }
    }
}

impl From<UsageStatsResponse> for UsageStats {
    fn from(response: UsageStatsResponse) -> Self {
        response
            .actions
            .into_iter()
            .map(|(action, usage)| (action, usage.into()))
            .collect()
    }
}
