//! Application configuration management.
//!
//! Configuration is read from environment variables with the `envy` crate,
//! after an optional `.env` file has been loaded.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `MAX_BODY_BYTES` (optional): largest accepted request body, defaults to 1 MiB
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
}

fn default_port() -> u16 {
    3000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_max_connections() -> u32 {
    5
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or a variable cannot be
    /// parsed into its field type.
    pub fn from_env() -> Result<Self, envy::Error> {
        // Missing .env is fine
        dotenvy::dotenv().ok();

        Self::from_vars(std::env::vars())
    }

    /// Build configuration from an explicit set of variables.
    ///
    /// Keys use the same upper-case names as the process environment.
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(vars)
    }
}
