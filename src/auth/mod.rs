//! Caller credentials.
//!
//! Callers authenticate with a signed bearer token. The token's subject is
//! the caller's uid and an `admin` claim marks privileged callers.

mod token;

pub use token::{Claims, TokenAuthority};

/// Metadata key carrying the bearer token.
pub const AUTHORIZATION: &str = "authorization";

/// Extract the token from an `authorization` value of the form `Bearer <token>`.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
