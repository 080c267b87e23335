//! Signed identity tokens.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ratelimit::{Identity, ANONYMOUS_IDENTIFIER};

/// Claims carried by an identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (caller uid)
    pub sub: String,
    /// Admin assertion
    #[serde(default)]
    pub admin: bool,
    /// Issued at, epoch seconds
    pub iat: u64,
    /// Expiration, epoch seconds
    pub exp: u64,
    /// Issuer
    pub iss: String,
}

/// Issues and verifies identity tokens with a shared HS256 secret.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    ttl_secs: u64,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl_secs)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl TokenAuthority {
    pub fn new(secret: &str, issuer: impl Into<String>, ttl_secs: u64) -> Self {
        let secret = secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            issuer: issuer.into(),
            ttl_secs,
        }
    }

    /// Issue a token for `uid`, asserting admin rights when `admin` is set.
    pub fn mint(&self, uid: &str, admin: bool) -> Result<String> {
        if uid.is_empty() {
            return Err(Error::InvalidArgument("uid must not be empty".to_string()));
        }
        if uid == ANONYMOUS_IDENTIFIER {
            return Err(Error::InvalidArgument(format!(
                "uid {:?} is reserved for unauthenticated callers",
                uid
            )));
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: uid.to_string(),
            admin,
            iat: now,
            exp: now + self.ttl_secs,
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        debug!(uid = uid, admin = admin, "Issued identity token");
        Ok(token)
    }

    /// Verify a token and return the identity it asserts.
    pub fn verify(&self, token: &str) -> Result<Identity> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        // The anonymous sentinel would share the unauthenticated bucket.
        if data.claims.sub.is_empty() || data.claims.sub == ANONYMOUS_IDENTIFIER {
            return Err(Error::Unauthenticated);
        }

        Ok(Identity {
            uid: data.claims.sub,
            privileged: data.claims.admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new("test-secret", "ledgerlimit", 3600)
    }

    #[test]
    fn test_mint_and_verify_user() {
        let auth = authority();
        let token = auth.mint("u1", false).unwrap();
        assert_eq!(auth.verify(&token).unwrap(), Identity::user("u1"));
    }

    #[test]
    fn test_mint_and_verify_admin() {
        let auth = authority();
        let token = auth.mint("a1", true).unwrap();
        assert_eq!(auth.verify(&token).unwrap(), Identity::admin("a1"));
    }

    #[test]
    fn test_missing_admin_claim_is_not_privileged() {
        #[derive(Serialize)]
        struct Plain<'a> {
            sub: &'a str,
            iat: u64,
            exp: u64,
            iss: &'a str,
        }
        let now = chrono::Utc::now().timestamp() as u64;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Plain {
                sub: "u1",
                iat: now,
                exp: now + 600,
                iss: "ledgerlimit",
            },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(!authority().verify(&token).unwrap().privileged);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenAuthority::new("other", "ledgerlimit", 3600)
            .mint("u1", true)
            .unwrap();
        assert!(matches!(authority().verify(&token), Err(Error::Token(_))));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let token = TokenAuthority::new("test-secret", "someone-else", 3600)
            .mint("u1", false)
            .unwrap();
        assert!(authority().verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = chrono::Utc::now().timestamp() as u64;
        let claims = Claims {
            sub: "u1".to_string(),
            admin: false,
            iat: now - 7200,
            exp: now - 3600,
            iss: "ledgerlimit".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(authority().verify(&token).is_err());
    }

    #[test]
    fn test_empty_uid_cannot_be_minted() {
        assert!(matches!(
            authority().mint("", false),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_anonymous_uid_is_reserved() {
        let auth = authority();
        assert!(matches!(
            auth.mint(ANONYMOUS_IDENTIFIER, false),
            Err(Error::InvalidArgument(_))
        ));

        let now = chrono::Utc::now().timestamp() as u64;
        let claims = Claims {
            sub: ANONYMOUS_IDENTIFIER.to_string(),
            admin: true,
            iat: now,
            exp: now + 600,
            iss: "ledgerlimit".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(auth.verify(&token), Err(Error::Unauthenticated)));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let debug = format!("{:?}", authority());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("test-secret"));
    }
}
