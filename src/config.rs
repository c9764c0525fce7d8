use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

pub const DEFAULT_BIND_PORT: u16 = 3000;
pub const DEFAULT_SSE_KEEP_ALIVE_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: Option<String>,
    pub bind_addr: String,
    pub bind_port: u16,
    pub sse_keep_alive: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("MCP_SSE_KEEP_ALIVE_SECS must be a whole number of seconds, at least 1")]
    InvalidKeepAlive,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = env::var("MCP_API_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let bind_port = env::var("PORT")
            .ok()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_BIND_PORT);
        let keep_alive_secs = env::var("MCP_SSE_KEEP_ALIVE_SECS")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs >= 1)
                    .ok_or(ConfigError::InvalidKeepAlive)
            })
            .transpose()?
            .unwrap_or(DEFAULT_SSE_KEEP_ALIVE_SECS);

        let config = Self {
            api_token,
            bind_addr,
            bind_port,
            sse_keep_alive: Duration::from_secs(keep_alive_secs),
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}
