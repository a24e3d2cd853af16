//! Password-bound session token authority.
//!
//! Tokens carry no server-side state. Each validation recomputes the
//! password digest from the currently configured password, so rotating the
//! password invalidates every outstanding token at once.

use super::clock::{Clock, SystemClock};
use super::error::TokenError;
use super::token::{SessionToken, HASH_PREFIX_LEN};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum session age: 7 days.
pub const MAX_SESSION_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MAX_SESSION_AGE_MS: i64 = MAX_SESSION_AGE.as_millis() as i64;

/// The shared inventory password and the server-held signing secret.
#[derive(Clone)]
pub struct Credentials {
    password: Option<String>,
    signing_secret: String,
}

impl Credentials {
    /// An empty password is treated the same as an unset one.
    pub fn new(password: Option<String>, signing_secret: impl Into<String>) -> Self {
        Self {
            password: password.filter(|p| !p.is_empty()),
            signing_secret: signing_secret.into(),
        }
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("signing_secret", &"***")
            .finish()
    }
}

/// What a valid token proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClaims {
    pub issued_at_millis: i64,
    pub expires_at_millis: i64,
}

/// Issues and validates inventory session tokens.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct SessionAuthority {
    credentials: Credentials,
    clock: Arc<dyn Clock>,
}

impl SessionAuthority {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_clock(credentials, Arc::new(SystemClock))
    }

    pub fn with_clock(credentials: Credentials, clock: Arc<dyn Clock>) -> Self {
        Self { credentials, clock }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.has_password()
    }

    pub fn max_session_age(&self) -> Duration {
        MAX_SESSION_AGE
    }

    /// Check a login candidate against the configured password.
    pub fn verify_password(&self, candidate: &str) -> bool {
        let Some(expected) = self.credentials.password.as_deref() else {
            tracing::error!("Inventory password is not configured; refusing login");
            return false;
        };
        candidate.as_bytes().ct_eq(expected.as_bytes()).into()
    }

    /// Mint a token for a password that already passed [`Self::verify_password`].
    pub fn issue_token(&self, candidate: &str) -> String {
        let digest = password_digest(candidate, &self.credentials.signing_secret);
        let issued_at_millis = self.clock.now_millis();
        let signature = sign(&digest, &issued_at_millis.to_string());
        SessionToken::new(&digest[..HASH_PREFIX_LEN], signature, issued_at_millis).encode()
    }

    /// `true` iff the token is well-formed, was issued under the current
    /// password, carries a valid signature and is inside its validity window.
    pub fn validate_token(&self, token: &str) -> bool {
        self.authenticate(token).is_some()
    }

    /// Like [`Self::validate_token`] but returns the claims of an accepted token.
    /// The rejection reason is logged, never returned.
    pub fn authenticate(&self, token: &str) -> Option<SessionClaims> {
        match self.check_token(token) {
            Ok(claims) => Some(claims),
            Err(TokenError::NotConfigured) => {
                tracing::error!("Inventory password is not configured; rejecting session token");
                None
            }
            Err(err @ TokenError::IssuedInFuture { .. }) => {
                tracing::warn!(reason = err.kind(), "Rejected inventory session: {err}");
                None
            }
            Err(err) => {
                tracing::debug!(reason = err.kind(), "Rejected inventory session: {err}");
                None
            }
        }
    }

    /// Full diagnostic validation. Checks run in a fixed order and stop at the
    /// first failure: shape, configuration, hash prefix, signature, age.
    pub fn check_token(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let token = SessionToken::decode(token)?;

        let password = self
            .credentials
            .password
            .as_deref()
            .ok_or(TokenError::NotConfigured)?;
        let current = password_digest(password, &self.credentials.signing_secret);

        let prefix = token.hash_prefix().as_bytes();
        let prefix_matches = prefix.len() <= current.len()
            && bool::from(current.as_bytes()[..prefix.len()].ct_eq(prefix));
        if !prefix_matches {
            return Err(TokenError::Rotated);
        }

        let expected = sign(&current, token.issued_at());
        if !bool::from(expected.as_bytes().ct_eq(token.signature().as_bytes())) {
            return Err(TokenError::BadSignature);
        }

        let issued_at_millis = token.issued_at_millis();
        let age_ms = self.clock.now_millis().saturating_sub(issued_at_millis);
        if age_ms < 0 {
            return Err(TokenError::IssuedInFuture { skew_ms: -age_ms });
        }
        if age_ms >= MAX_SESSION_AGE_MS {
            return Err(TokenError::Expired { age_ms });
        }

        Ok(SessionClaims {
            issued_at_millis,
            expires_at_millis: issued_at_millis.saturating_add(MAX_SESSION_AGE_MS),
        })
    }
}

impl fmt::Debug for SessionAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthority")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

/// Lowercase hex SHA-256 of `password || secret`.
fn password_digest(password: &str, secret: &str) -> String {
    let mut h = Sha256::new();
    h.update(password.as_bytes());
    h.update(secret.as_bytes());
    hex::encode(h.finalize())
}

/// HMAC-SHA256 over the timestamp text, keyed by the hex digest string.
fn sign(digest_hex: &str, issued_at: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(digest_hex.as_bytes())
        .expect("HMAC can accept any key length");
    mac.update(issued_at.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
