//! CadetMart inventory session gateway.
//!
//! A single shared password unlocks the inventory dashboard. A successful
//! login mints a self-verifying session token that is carried in an
//! `HttpOnly` cookie and revalidated on every request.

pub mod auth;
pub mod config;
pub mod gateway;
