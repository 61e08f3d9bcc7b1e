use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl: chrono::Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup, so parsing can be tested without
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = match lookup("PARLEY_JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ if cfg!(debug_assertions) => DEV_JWT_SECRET.to_string(),
            _ => bail!("PARLEY_JWT_SECRET must be set"),
        };

        let db_path = PathBuf::from(lookup("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into()));
        let host = lookup("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&lookup, "PARLEY_PORT", 8080)?;
        let ttl_minutes: i64 = parse_or(&lookup, "PARLEY_TOKEN_TTL_MINUTES", 24 * 60)?;
        let timeout_secs: u64 = parse_or(&lookup, "PARLEY_REQUEST_TIMEOUT_SECS", 10)?;

        if ttl_minutes <= 0 {
            bail!("PARLEY_TOKEN_TTL_MINUTES must be positive");
        }

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_ttl: chrono::Duration::minutes(ttl_minutes),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} has invalid value {raw:?}")),
        None => Ok(default),
    }
}
