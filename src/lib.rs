//! Ledgerlimit - Ledger-backed Rate Limiting Service
//!
//! This crate decides whether a caller may perform an action under a
//! fixed-window quota chosen by the caller's tier (anonymous, authenticated
//! or privileged). Every admitted attempt is recorded in a ledger; the count
//! of in-window records is the caller's usage. A scheduled sweep removes
//! records once they are older than every window.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod grpc;
pub mod ledger;
pub mod ratelimit;
pub mod telemetry;
