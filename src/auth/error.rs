//! Rejection reasons for inventory session tokens.
//!
//! These never cross the HTTP boundary. The gateway collapses every variant
//! into the same 401 response; the variants exist for operator logs and the
//! `token inspect` command.

/// Why a presented session token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// No inventory password is configured, so nothing can validate.
    #[error("inventory password is not configured")]
    NotConfigured,

    /// The token does not have the `<prefix>.<signature>.<issued_at>` shape.
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    /// The hash prefix no longer matches: the password was rotated since issuance.
    #[error("token was issued under a previous password")]
    Rotated,

    /// The signature does not match the recomputed HMAC.
    #[error("token signature mismatch")]
    BadSignature,

    /// The token is older than the maximum session age.
    #[error("token expired ({age_ms} ms old)")]
    Expired { age_ms: i64 },

    /// The issuance timestamp lies in the future relative to this server's clock.
    #[error("token issued {skew_ms} ms in the future")]
    IssuedInFuture { skew_ms: i64 },
}

impl TokenError {
    /// Short machine-friendly label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Malformed(_) => "malformed",
            Self::Rotated => "rotated",
            Self::BadSignature => "bad_signature",
            Self::Expired { .. } => "expired",
            Self::IssuedInFuture { .. } => "issued_in_future",
        }
    }
}
