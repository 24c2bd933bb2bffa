//! Process configuration read from the environment.
//!
//! `main` loads a `.env` file with dotenvy first, so every key below can be
//! set either way.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::HeaderValue;
use manifest::ArchiveLayout;

pub const DEFAULT_ARCHIVE_PATH: &str = "./";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_CORS_ORIGINS: &str =
    "http://localhost:3000,https://api.isoarchives.org,https://isoarchives.org";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Origins allowed to make cross-origin requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub archive_path: PathBuf,
    pub download_url: String,
    pub variant_depth: usize,
    pub bind_addr: SocketAddr,
    pub cors_origins: AllowedOrigins,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Unset and blank
    /// values take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let archive_path = PathBuf::from(
            get("ARCHIVE_PATH").unwrap_or_else(|| DEFAULT_ARCHIVE_PATH.to_string()),
        );
        let download_url = lookup("DOWNLOAD_URL").unwrap_or_default();

        let variant_depth = match get("VARIANT_DEPTH") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|error| ConfigError::invalid("VARIANT_DEPTH", &raw, error))?,
            None => ArchiveLayout::DEFAULT_VARIANT_DEPTH,
        };

        let raw_addr = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|error| ConfigError::invalid("BIND_ADDR", &raw_addr, error))?;

        let raw_origins = get("CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string());
        let cors_origins = parse_origins(&raw_origins)?;

        Ok(Self {
            archive_path,
            download_url,
            variant_depth,
            bind_addr,
            cors_origins,
        })
    }

    pub fn layout(&self) -> ArchiveLayout {
        ArchiveLayout::new(self.archive_path.clone(), self.download_url.clone())
            .with_variant_depth(self.variant_depth)
    }
}

fn parse_origins(raw: &str) -> Result<AllowedOrigins, ConfigError> {
    let origins: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .collect();
    if origins.iter().any(|origin| *origin == "*") {
        return Ok(AllowedOrigins::Any);
    }
    origins
        .into_iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|error| ConfigError::invalid("CORS_ORIGINS", origin, error))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(AllowedOrigins::List)
}
