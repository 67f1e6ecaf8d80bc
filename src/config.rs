//! Environment-sourced configuration.
//!
//! The core treats every value as opaque; validation beyond presence happens
//! at the consuming component (the transport rejects an unusable URL, the
//! homeserver rejects bad credentials).

use thiserror::Error;

/// Environment variables, kept compatible with the usual Matrix tooling.
pub const ENV_SERVER_URL: &str = "MATRIX_SERVER_URL";
pub const ENV_USERNAME: &str = "MATRIX_USERNAME";
pub const ENV_PASSWORD: &str = "MATRIX_PASSWORD";
pub const ENV_ROOM: &str = "MATRIX_ROOM";
pub const ENV_DEBUG: &str = "MATRIX_DEBUG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0} (example: {1})")]
    Missing(&'static str, &'static str),
}

/// Startup configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub room_alias: String,
    pub debug: bool,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_url: require(ENV_SERVER_URL, "https://matrix.org")?,
            username: require(ENV_USERNAME, "alice")?,
            password: require(ENV_PASSWORD, "hunter2")?,
            room_alias: require(ENV_ROOM, "#room:matrix.org")?,
            debug: flag(ENV_DEBUG),
        })
    }
}

fn require(name: &'static str, example: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name, example)),
    }
}

fn flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => !matches!(value.trim(), "" | "0" | "false" | "no"),
        Err(_) => false,
    }
}
