//! Server configuration loaded from the environment.
//!
//! # Environment Variables
//!
//! - `POSTAL_SERVER_HOST` (default: `0.0.0.0`)
//! - `POSTAL_SERVER_PORT` (default: `4001`)
//! - `POSTAL_SERVER_MAX_BODY_BYTES` (default: `1048576`)
//!
//! An unset or empty variable selects the default. A value that does not
//! parse also selects the default and logs a warning. Configuration is read
//! once at startup.

use thiserror::Error;
use tracing::warn;

pub const HOST_ENV: &str = "POSTAL_SERVER_HOST";
pub const PORT_ENV: &str = "POSTAL_SERVER_PORT";
pub const MAX_BODY_BYTES_ENV: &str = "POSTAL_SERVER_MAX_BODY_BYTES";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host must not contain whitespace: '{host}'")]
    InvalidHost { host: String },

    #[error("max body size must be greater than zero")]
    ZeroBodyLimit,
}

/// Listener and request-size settings for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind (IP literal or resolvable hostname)
    pub host: String,
    /// TCP port; `0` asks the OS for an ephemeral port
    pub port: u16,
    /// Upper bound for a request body, larger bodies are unreadable
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            host: non_empty_var(HOST_ENV).unwrap_or(default.host),
            port: parsed_var(PORT_ENV).unwrap_or(default.port),
            max_body_bytes: parsed_var(MAX_BODY_BYTES_ENV).unwrap_or(default.max_body_bytes),
        }
    }

    /// Check values that parse but cannot be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidHost {
                host: self.host.clone(),
            });
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }
        Ok(())
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    #[must_use]
    pub fn bind_string(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = non_empty_var(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(
                var = name,
                value = %raw,
                "Ignoring unparsable environment value, using default"
            );
            None
        }
    }
}
