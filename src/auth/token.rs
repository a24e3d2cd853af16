//! Wire format for inventory session tokens.
//!
//! A token is three dot-separated fields:
//!
//! ```text
//! <hash_prefix>.<signature>.<issued_at_millis>
//! ```
//!
//! All shape checks live in [`SessionToken::decode`]; the authority never
//! splits token strings itself.

use super::error::TokenError;
use std::fmt;
use std::str::FromStr;

/// Number of hex characters of the password digest embedded in a token.
pub const HASH_PREFIX_LEN: usize = 16;

const SEPARATOR: char = '.';

/// A structurally valid (not necessarily authentic) session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    hash_prefix: String,
    signature: String,
    /// Timestamp exactly as it appears on the wire; this is the signed message.
    issued_at: String,
    issued_at_millis: i64,
}

impl SessionToken {
    pub fn new(hash_prefix: impl Into<String>, signature: impl Into<String>, issued_at_millis: i64) -> Self {
        Self {
            hash_prefix: hash_prefix.into(),
            signature: signature.into(),
            issued_at: issued_at_millis.to_string(),
            issued_at_millis,
        }
    }

    /// Parse a raw token string. Rejects anything that is not exactly three
    /// non-empty segments with an all-digit timestamp.
    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        let [hash_prefix, signature, issued_at] = parts.as_slice() else {
            return Err(TokenError::Malformed("expected three segments"));
        };

        if hash_prefix.is_empty() || signature.is_empty() || issued_at.is_empty() {
            return Err(TokenError::Malformed("empty segment"));
        }

        if !issued_at.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::Malformed("non-numeric timestamp"));
        }

        let issued_at_millis = issued_at
            .parse::<i64>()
            .map_err(|_| TokenError::Malformed("timestamp out of range"))?;

        Ok(Self {
            hash_prefix: (*hash_prefix).to_owned(),
            signature: (*signature).to_owned(),
            issued_at: (*issued_at).to_owned(),
            issued_at_millis,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.hash_prefix, self.signature, self.issued_at
        )
    }

    pub fn hash_prefix(&self) -> &str {
        &self.hash_prefix
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The timestamp segment verbatim, as fed to the HMAC.
    pub fn issued_at(&self) -> &str {
        &self.issued_at
    }

    pub fn issued_at_millis(&self) -> i64 {
        self.issued_at_millis
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for SessionToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, TokenError> {
        Self::decode(s)
    }
}
