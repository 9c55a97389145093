//! Server configuration from the environment

use crate::runtime::DEFAULT_MAX_SESSIONS;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be an IP address, got {value:?}")]
    InvalidHost { var: &'static str, value: String },
    #[error("{var} must be a port number, got {value:?}")]
    InvalidPort { var: &'static str, value: String },
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidCount { var: &'static str, value: String },
    #[error("CONCIERGE_ALLOWED_ORIGINS contains an invalid origin: {0:?}")]
    InvalidOrigin(String),
}

/// Settings for the HTTP server and session defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
    pub greeting: Option<String>,
    pub tools_file: Option<PathBuf>,
    /// In-memory session bound; idle sessions beyond it are evicted
    pub max_sessions: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = match get("CONCIERGE_HOST") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidHost {
                var: "CONCIERGE_HOST",
                value,
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let port = match get("CONCIERGE_PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidPort {
                var: "CONCIERGE_PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let max_sessions = match get("CONCIERGE_MAX_SESSIONS") {
            Some(value) => value
                .trim()
                .parse()
                .ok()
                .filter(|n: &usize| *n > 0)
                .ok_or(ConfigError::InvalidCount {
                    var: "CONCIERGE_MAX_SESSIONS",
                    value,
                })?,
            None => DEFAULT_MAX_SESSIONS,
        };

        let allowed_origins = get("CONCIERGE_ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            allowed_origins,
            greeting: get("CONCIERGE_GREETING"),
            tools_file: get("CONCIERGE_TOOLS_FILE").map(PathBuf::from),
            max_sessions,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|origin| {
            if origin.starts_with("http://") || origin.starts_with("https://") {
                Ok(origin.trim_end_matches('/').to_string())
            } else {
                Err(ConfigError::InvalidOrigin(origin.to_string()))
            }
        })
        .collect()
}
