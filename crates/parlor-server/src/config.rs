use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Runtime configuration, read from `PARLOR_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Snapshot file for users and the timeline.
    pub db_path: PathBuf,
    pub flush_interval: Duration,
    /// Largest accepted photo payload. HTTP bodies and WebSocket messages
    /// may exceed it by a fixed allowance for the surrounding JSON.
    pub max_body_bytes: usize,
    /// Served at `/` when the directory exists.
    pub static_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("PARLOR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&lookup, "PARLOR_PORT", 3000)?;
        let db_path = lookup("PARLOR_DB_PATH").unwrap_or_else(|| "chat.db".into()).into();
        let flush_secs: u64 = parse_or(&lookup, "PARLOR_FLUSH_INTERVAL_SECS", 5)?;
        if flush_secs == 0 {
            bail!("PARLOR_FLUSH_INTERVAL_SECS must be at least 1");
        }
        let max_body_bytes: usize = parse_or(&lookup, "PARLOR_MAX_BODY_BYTES", 10 * 1024 * 1024)?;
        let static_dir = lookup("PARLOR_STATIC_DIR").unwrap_or_else(|| "public".into()).into();

        Ok(Self {
            host,
            port,
            db_path,
            flush_interval: Duration::from_secs(flush_secs),
            max_body_bytes,
            static_dir,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
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
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value {:?}", key, raw)),
        None => Ok(default),
    }
}
