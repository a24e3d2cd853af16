//! Inventory dashboard session routes.
//!
//! ## Flow
//!
//! 1. `POST /api/inventory/auth` with `{"password": "..."}` → session cookie
//! 2. `GET /api/inventory/validate` → 200 while the cookie holds a valid token
//! 3. `POST /api/inventory/validate` → cookie removed (logout)
//!
//! Every rejected session gets the same `401 {"valid": false}`; the reason
//! only shows up in the server logs.

use super::{client_key, AppState, RATE_LIMIT_WINDOW_SECS};
use crate::auth::{SessionClaims, MAX_SESSION_AGE};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use tower_cookies::cookie::{time, SameSite};
use tower_cookies::{Cookie, Cookies};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE_NAME: &str = "inventory_session";

/// Concrete return type for inventory handlers.
type AuthResponse = (StatusCode, Json<serde_json::Value>);

/// Attributes applied to the session cookie.
#[derive(Debug, Clone, Copy)]
pub struct SessionCookie {
    secure: bool,
}

impl SessionCookie {
    /// `secure` should be true in production (HTTPS only).
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    /// `HttpOnly`, `SameSite=Lax`, `Path=/`, `Max-Age` equal to the session lifetime.
    pub fn build(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, token))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(MAX_SESSION_AGE.as_secs() as i64))
            .path("/")
            .build()
    }

    /// Cookie used to clear the session on logout. Path must match [`Self::build`].
    pub fn removal(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, "")).path("/").build()
    }
}

/// Login request body.
#[derive(Debug, Default, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    pub password: Option<String>,
}

fn unauthorized() -> AuthResponse {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"valid": false})),
    )
}

/// Extractor for routes that need a valid inventory session.
///
/// Rejects with `401 {"valid": false}` whether the cookie is missing,
/// malformed, expired or minted under a rotated password.
#[derive(Debug, Clone, Copy)]
pub struct InventorySession {
    pub claims: SessionClaims,
}

impl FromRequestParts<AppState> for InventorySession {
    type Rejection = AuthResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| {
                tracing::error!("Session cookie jar unavailable: {msg}");
                unauthorized()
            })?;

        let Some(cookie) = cookies.get(SESSION_COOKIE_NAME) else {
            tracing::debug!("Inventory request without a session cookie");
            return Err(unauthorized());
        };

        state
            .authority
            .authenticate(cookie.value())
            .map(|claims| Self { claims })
            .ok_or_else(unauthorized)
    }
}

/// POST /api/inventory/auth — exchange the inventory password for a session cookie.
pub async fn handle_login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    cookies: Cookies,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> AuthResponse {
    let client_key = client_key(&headers, peer, state.trust_forwarded_headers);
    if !state.rate_limiter.allow_login(&client_key) {
        tracing::warn!("Inventory login rate limit exceeded for key: {client_key}");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Too many login attempts. Please retry later.",
                "retry_after": RATE_LIMIT_WINDOW_SECS,
            })),
        );
    }

    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            return (
                e.status(),
                Json(serde_json::json!({"error": "Invalid request body"})),
            );
        }
    };

    let Some(password) = body.password.filter(|p| !p.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Password required"})),
        );
    };

    if !state.authority.verify_password(&password) {
        tracing::warn!("Inventory login failed for key: {client_key}");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Invalid password"})),
        );
    }

    let token = state.authority.issue_token(&password);
    cookies.add(state.cookie.build(token));
    tracing::info!("Inventory session issued for key: {client_key}");

    (StatusCode::OK, Json(serde_json::json!({"success": true})))
}

/// GET /api/inventory/validate — report whether the session cookie is valid.
pub async fn handle_validate(_session: InventorySession) -> AuthResponse {
    (StatusCode::OK, Json(serde_json::json!({"valid": true})))
}

/// POST /api/inventory/validate — log out by discarding the session cookie.
///
/// There is no server-side session to revoke.
pub async fn handle_logout(State(state): State<AppState>, cookies: Cookies) -> AuthResponse {
    cookies.remove(state.cookie.removal());
    (StatusCode::OK, Json(serde_json::json!({"success": true})))
}
