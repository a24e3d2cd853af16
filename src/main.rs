use anyhow::{bail, Result};
use cadetmart::auth::{SessionAuthority, SessionClaims};
use cadetmart::config::Config;
use chrono::{DateTime, SecondsFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CadetMart inventory session gateway
#[derive(Parser, Debug)]
#[command(name = "cadetmart", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        /// Bind address (overrides [gateway] host)
        #[arg(long)]
        host: Option<String>,
        /// Listen port (overrides [gateway] port; 0 picks a free port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Issue or inspect session tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Verify the inventory password and print a fresh session token
    Issue {
        /// Password to verify (defaults to the configured one, else prompts)
        #[arg(long)]
        password: Option<String>,
    },
    /// Report whether a token is currently valid
    Inspect {
        token: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("{millis} ms"))
}

fn issue(config: &Config, password: Option<String>) -> Result<()> {
    let authority = SessionAuthority::new(config.credentials()?);
    if !authority.is_configured() {
        bail!("INVENTORY_PASSWORD is not configured; no token can be issued");
    }

    let password = match password.or_else(|| config.auth.password.clone()) {
        Some(p) if !p.is_empty() => p,
        _ => dialoguer::Password::new()
            .with_prompt("Inventory password")
            .interact()?,
    };

    if !authority.verify_password(&password) {
        bail!("Invalid password");
    }
    println!("{}", authority.issue_token(&password));
    Ok(())
}

fn inspect(config: &Config, token: &str) -> Result<bool> {
    let authority = SessionAuthority::new(config.credentials()?);
    match authority.check_token(token) {
        Ok(SessionClaims {
            issued_at_millis,
            expires_at_millis,
        }) => {
            println!("valid");
            println!("  issued:  {}", format_millis(issued_at_millis));
            println!("  expires: {}", format_millis(expires_at_millis));
            Ok(true)
        }
        Err(e) => {
            println!("invalid ({}): {e}", e.kind());
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            cadetmart::gateway::run_gateway(&host, port, config).await
        }
        Command::Token { action } => match action {
            TokenAction::Issue { password } => issue(&config, password),
            TokenAction::Inspect { token } => {
                if !inspect(&config, &token)? {
                    std::process::exit(1);
                }
                Ok(())
            }
        },
    }
}
