use crate::auth::Credentials;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Signing secret used when none is configured outside production.
const DEV_FALLBACK_SIGNING_SECRET: &str = "fallback-secret-change-in-production";

/// Deployment environment. Controls the `Secure` cookie flag and whether a
/// missing signing secret is fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => bail!("Unknown environment '{other}' (expected 'production' or 'development')"),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
        })
    }
}

/// Top-level configuration, read once at process start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
}

/// `[auth]` section.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared inventory password. Overridden by `INVENTORY_PASSWORD`.
    pub password: Option<String>,
    /// Server-held secret mixed into every token hash. Overridden by `SESSION_SECRET`.
    pub signing_secret: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Login attempts allowed per client per minute (0 = unlimited).
    pub login_rate_limit_per_minute: u32,
    /// Allow binding to a non-loopback address.
    pub allow_public_bind: bool,
    /// Key login throttling on `X-Forwarded-For` / `X-Real-IP`. Only enable
    /// behind a reverse proxy that overwrites those headers.
    pub trust_forwarded_headers: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            login_rate_limit_per_minute: 10,
            allow_public_bind: false,
            trust_forwarded_headers: false,
        }
    }
}

impl Config {
    /// Default location: `<platform config dir>/cadetmart/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "cadetmart", "cadetmart")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides. An explicit path must exist; a missing default
    /// file just yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(password) = lookup("INVENTORY_PASSWORD") {
            self.auth.password = Some(password);
        }
        if let Some(secret) = lookup("SESSION_SECRET") {
            self.auth.signing_secret = Some(secret);
        }
        if let Some(env) = lookup("CADETMART_ENV") {
            self.environment = env.parse()?;
        }
        if let Some(host) = lookup("CADETMART_GATEWAY_HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = lookup("CADETMART_GATEWAY_PORT") {
            self.gateway.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid CADETMART_GATEWAY_PORT '{port}'"))?;
        }
        Ok(())
    }

    /// Resolve the credentials the session authority runs with.
    ///
    /// Production refuses to start without a signing secret; development falls
    /// back to a fixed placeholder and warns.
    pub fn credentials(&self) -> Result<Credentials> {
        let secret = self
            .auth
            .signing_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let secret = match secret {
            Some(secret) => secret.to_owned(),
            None if self.environment.is_production() => {
                bail!("SESSION_SECRET must be set in production");
            }
            None => {
                tracing::warn!("SESSION_SECRET not set; using the development fallback secret");
                DEV_FALLBACK_SIGNING_SECRET.to_owned()
            }
        };

        let credentials = Credentials::new(self.auth.password.clone(), secret);
        if !credentials.has_password() {
            tracing::error!("INVENTORY_PASSWORD not set; inventory logins will be refused");
        }
        Ok(credentials)
    }
}
