use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    DEFAULT_JWT_SECRET,
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl_days: i64,
}

impl Config {
    /// Read `TASKI_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("TASKI_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_JWT_SECRET.into());
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            warn!("TASKI_JWT_SECRET is unset or still a placeholder; tokens are forgeable");
        }

        let db_path: PathBuf = lookup("TASKI_DB_PATH").unwrap_or_else(|| "taski.db".into()).into();
        let host = lookup("TASKI_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("TASKI_PORT")
            .unwrap_or_else(|| "8000".into())
            .parse()
            .context("TASKI_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let token_ttl_days: i64 = lookup("TASKI_TOKEN_TTL_DAYS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("TASKI_TOKEN_TTL_DAYS must be a whole number of days")?;
        if token_ttl_days <= 0 {
            anyhow::bail!("TASKI_TOKEN_TTL_DAYS must be positive");
        }

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_ttl_days,
        })
    }
}
