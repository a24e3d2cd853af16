//! Inventory dashboard authentication.
//!
//! Provides:
//! - A shared-password check for the inventory login
//! - Self-verifying session tokens bound to the current password (HMAC-SHA256)
//! - A fixed 7-day validity window
//!
//! ## Design Decisions
//! - No server-side session store. A token is recomputed from the configured
//!   password and its own timestamp on every request, so rotating the password
//!   revokes every outstanding session.
//! - Every rejection collapses to `false` at the public boundary. The reason
//!   is only available through [`SessionAuthority::check_token`] and the logs.
//! - Password, hash prefix and signature comparisons are constant-time.

pub mod authority;
pub mod clock;
pub mod error;
pub mod token;

pub use authority::{Credentials, SessionAuthority, SessionClaims, MAX_SESSION_AGE};
pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub use clock::FixedClock;
pub use error::TokenError;
pub use token::SessionToken;
