//! Axum-based HTTP gateway for the inventory dashboard session.
//!
//! - Request body size limits (64KB max)
//! - Request timeouts (30s)
//! - Session cookie handling via `tower-cookies`
//! - Per-client sliding-window rate limiting on login attempts

pub mod inventory;

use crate::auth::SessionAuthority;
use crate::config::Config;
use anyhow::Result;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_cookies::CookieManagerLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

pub use inventory::{InventorySession, SessionCookie, SESSION_COOKIE_NAME};

/// Maximum request body size (64KB) — login bodies are tiny
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Sliding window used by login rate limiting.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// How often stale clients are dropped from the login limiter.
const RATE_LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
/// Upper bound on clients tracked at once; the least recently seen is evicted past it.
const RATE_LIMITER_MAX_CLIENTS: usize = 10_000;

#[derive(Debug)]
struct LoginAttempts {
    by_client: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl LoginAttempts {
    fn sweep(&mut self, now: Instant, window: Duration) {
        self.by_client.retain(|_, attempts| {
            attempts
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < window)
        });
        self.last_sweep = now;
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .by_client
            .iter()
            .min_by_key(|(_, attempts)| attempts.back().copied())
            .map(|(client, _)| client.clone());
        if let Some(client) = oldest {
            self.by_client.remove(&client);
        }
    }
}

/// Sliding-window throttle for `POST /api/inventory/auth`, keyed by client address.
#[derive(Debug)]
pub struct LoginRateLimiter {
    limit: u32,
    window: Duration,
    max_clients: usize,
    attempts: Mutex<LoginAttempts>,
}

impl LoginRateLimiter {
    /// `limit_per_minute == 0` disables throttling.
    pub fn new(limit_per_minute: u32) -> Self {
        Self::with_window(
            limit_per_minute,
            Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            RATE_LIMITER_MAX_CLIENTS,
        )
    }

    fn with_window(limit: u32, window: Duration, max_clients: usize) -> Self {
        Self {
            limit,
            window,
            max_clients,
            attempts: Mutex::new(LoginAttempts {
                by_client: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Record a login attempt from `client`; `false` once it is over the limit.
    pub fn allow_login(&self, client: &str) -> bool {
        self.allow_at(client, Instant::now())
    }

    fn allow_at(&self, client: &str, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }

        let mut state = self.attempts.lock();
        if now.saturating_duration_since(state.last_sweep) >= RATE_LIMITER_SWEEP_INTERVAL {
            state.sweep(now, self.window);
        }
        if !state.by_client.contains_key(client) && state.by_client.len() >= self.max_clients {
            state.sweep(now, self.window);
            if state.by_client.len() >= self.max_clients {
                state.evict_least_recent();
            }
        }

        let attempts = state.by_client.entry(client.to_owned()).or_default();
        while attempts
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            attempts.pop_front();
        }

        if attempts.len() >= self.limit as usize {
            return false;
        }
        attempts.push_back(now);
        true
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.attempts.lock().by_client.len()
    }
}

/// First client address named by `X-Forwarded-For` or `X-Real-IP`.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    ["X-Forwarded-For", "X-Real-IP"].iter().find_map(|name| {
        headers
            .get(*name)?
            .to_str()
            .ok()?
            .split(',')
            .next()?
            .trim()
            .parse()
            .ok()
    })
}

/// Key used for login throttling. Forwarded headers are only honoured when
/// the gateway is configured to trust the proxy in front of it; otherwise
/// the socket peer address is used.
fn client_key(headers: &HeaderMap, peer: SocketAddr, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(ip) = forwarded_client_ip(headers) {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

/// True when `host` would expose the gateway beyond the local machine.
fn is_public_bind(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return false;
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => !ip.is_loopback(),
        Err(_) => true,
    }
}

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub authority: Arc<SessionAuthority>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    /// Attributes for the session cookie (the `Secure` flag depends on environment).
    pub cookie: SessionCookie,
    /// Key login throttling on `X-Forwarded-For` / `X-Real-IP` instead of the peer address.
    pub trust_forwarded_headers: bool,
}

impl AppState {
    pub fn new(authority: Arc<SessionAuthority>, config: &Config) -> Self {
        Self {
            authority,
            rate_limiter: Arc::new(LoginRateLimiter::new(
                config.gateway.login_rate_limit_per_minute,
            )),
            cookie: SessionCookie::new(config.environment.is_production()),
            trust_forwarded_headers: config.gateway.trust_forwarded_headers,
        }
    }
}

/// Build the gateway router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/inventory/auth", post(inventory::handle_login))
        .route(
            "/api/inventory/validate",
            get(inventory::handle_validate).post(inventory::handle_logout),
        )
        .with_state(state)
        .layer(CookieManagerLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Run the HTTP gateway until Ctrl+C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    // ── Security: refuse public bind without explicit opt-in ──
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "🛑 Refusing to bind to {host} — the inventory gateway would be exposed.\n\
             Fix: use --host 127.0.0.1 (default) behind a reverse proxy, or set\n\
             [gateway] allow_public_bind = true in config.toml."
        );
    }

    let credentials = config.credentials()?;
    let authority = Arc::new(SessionAuthority::new(credentials));
    let state = AppState::new(Arc::clone(&authority), &config);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();

    tracing::info!(
        address = %format!("{host}:{actual_port}"),
        environment = %config.environment,
        password_configured = authority.is_configured(),
        secure_cookie = state.cookie.secure(),
        trust_forwarded_headers = state.trust_forwarded_headers,
        "CadetMart inventory gateway listening"
    );
    println!("🛒 CadetMart inventory gateway listening on http://{host}:{actual_port}");
    println!("  POST /api/inventory/auth      — log in with the inventory password");
    println!("  GET  /api/inventory/validate  — check the session cookie");
    println!("  POST /api/inventory/validate  — log out");
    println!("  GET  /health                  — health check");
    if !authority.is_configured() {
        println!("  ⚠️  INVENTORY_PASSWORD is not set — every login will be refused");
    }
    println!("  Press Ctrl+C to stop.\n");

    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Inventory gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

/// GET /health — always public (no secrets leaked)
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "password_configured": state.authority.is_configured(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, FixedClock};
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(password: Option<&str>, login_limit: u32) -> AppState {
        let credentials = Credentials::new(password.map(str::to_owned), "gateway-test-secret");
        let authority = SessionAuthority::with_clock(
            credentials,
            Arc::new(FixedClock::new(1_700_000_000_000)),
        );
        AppState {
            authority: Arc::new(authority),
            rate_limiter: Arc::new(LoginRateLimiter::new(login_limit)),
            cookie: SessionCookie::new(false),
            trust_forwarded_headers: false,
        }
    }

    #[test]
    fn security_body_limit_is_64kb() {
        assert_eq!(MAX_BODY_SIZE, 65_536);
    }

    #[test]
    fn app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn login_rate_limiter_blocks_after_limit() {
        let limiter = LoginRateLimiter::new(2);
        assert!(limiter.allow_login("127.0.0.1"));
        assert!(limiter.allow_login("127.0.0.1"));
        assert!(!limiter.allow_login("127.0.0.1"));
        assert!(limiter.allow_login("10.0.0.2"));
    }

    #[test]
    fn login_rate_limiter_window_slides() {
        let limiter = LoginRateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.allow_at("10.0.0.1", start));
        assert!(!limiter.allow_at("10.0.0.1", start + Duration::from_secs(59)));
        assert!(limiter.allow_at("10.0.0.1", start + Duration::from_secs(RATE_LIMIT_WINDOW_SECS)));
    }

    #[test]
    fn periodic_sweep_drops_idle_clients() {
        let limiter = LoginRateLimiter::new(10);
        let start = Instant::now();
        for client in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            assert!(limiter.allow_at(client, start));
        }
        assert_eq!(limiter.tracked_clients(), 3);

        let later = start + RATE_LIMITER_SWEEP_INTERVAL;
        assert!(limiter.allow_at("10.0.0.1", later));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn tracked_clients_are_capped() {
        let limiter = LoginRateLimiter::with_window(5, Duration::from_secs(60), 3);
        let start = Instant::now();
        for (i, client) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            assert!(limiter.allow_at(client, start + Duration::from_millis(i as u64)));
        }
        assert_eq!(limiter.tracked_clients(), 3);

        // The most recent clients keep their history.
        let now = start + Duration::from_millis(10);
        for _ in 0..4 {
            assert!(limiter.allow_at("e", now));
        }
        assert!(!limiter.allow_at("e", now));
    }

    #[test]
    fn zero_limit_disables_throttling() {
        let limiter = LoginRateLimiter::new(0);
        for _ in 0..100 {
            assert!(limiter.allow_login("any-key"));
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn client_key_uses_peer_address_by_default() {
        let peer: SocketAddr = "192.0.2.10:51234".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, peer, false), "192.0.2.10");

        headers.insert("X-Forwarded-For", "203.0.113.7".parse().unwrap());
        headers.insert("X-Real-IP", "10.1.1.1".parse().unwrap());
        assert_eq!(client_key(&headers, peer, false), "192.0.2.10");
    }

    #[test]
    fn client_key_honours_forwarded_headers_when_trusted() {
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, peer, true), "127.0.0.1");

        headers.insert("X-Real-IP", "10.1.1.1".parse().unwrap());
        assert_eq!(client_key(&headers, peer, true), "10.1.1.1");

        headers.insert("X-Forwarded-For", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_key(&headers, peer, true), "203.0.113.7");

        // Junk is not an address; fall back rather than bucket on arbitrary text.
        headers.insert("X-Forwarded-For", "not-an-ip".parse().unwrap());
        headers.remove("X-Real-IP");
        assert_eq!(client_key(&headers, peer, true), "127.0.0.1");
    }

    #[test]
    fn public_bind_detection() {
        assert!(!is_public_bind("127.0.0.1"));
        assert!(!is_public_bind("::1"));
        assert!(!is_public_bind("localhost"));
        assert!(is_public_bind("0.0.0.0"));
        assert!(is_public_bind("192.168.1.10"));
        assert!(is_public_bind("shop.example.com"));
    }

    #[tokio::test]
    async fn run_gateway_refuses_public_bind() {
        let err = run_gateway("0.0.0.0", 0, Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("Refusing to bind"));
    }

    #[test]
    fn app_state_follows_gateway_config() {
        let mut config = Config::default();
        config.gateway.trust_forwarded_headers = true;
        config.environment = crate::config::Environment::Production;
        let authority = Arc::new(SessionAuthority::new(Credentials::new(None, "s")));
        let state = AppState::new(authority, &config);
        assert!(state.trust_forwarded_headers);
        assert!(state.cookie.secure());
    }

    #[tokio::test]
    async fn health_reports_configuration_without_secrets() {
        let app = build_router(test_state(Some("hunter2"), 10));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let payload = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(payload.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["password_configured"], true);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = build_router(test_state(Some("hunter2"), 10));
        let body = format!(r#"{{"password":"{}"}}"#, "x".repeat(MAX_BODY_SIZE + 1));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/inventory/auth")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::CONTENT_LENGTH, body.len())
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
