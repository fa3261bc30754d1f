use std::net::SocketAddr;

use anyhow::Context;

/// Settings read from `.env` and the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origin: String,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: var_or("DATABASE_URL", "sqlite://devtalk.db"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080")
                .parse()
                .context("BIND_ADDR must be host:port")?,
            cors_origin: var_or("CORS_ORIGIN", "http://localhost:5173"),
            db_max_connections: var_or("DB_MAX_CONNECTIONS", "16")
                .parse()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_owned())
}
