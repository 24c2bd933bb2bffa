//! HTTP service over the archive manifest.

pub mod config;
pub mod error;
pub mod server;

pub use crate::config::{AllowedOrigins, Config, ConfigError};
pub use crate::error::{ServerError, ServerResult};
pub use crate::server::Server;
