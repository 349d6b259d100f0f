/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Identity stamped into every job view as `handled_by`.
    pub replica_id: String,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{key} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                          |
    /// |------------------------|----------------------------------|
    /// | `HOST`                 | `0.0.0.0`                        |
    /// | `PORT`                 | `5000`                           |
    /// | `REPLICA_ID`           | `HOSTNAME`, else `producer-<ulid>` |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                             |
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port = match var("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError {
                key: "PORT",
                value: raw,
                expected: "a valid port number",
            })?,
            None => 5000,
        };

        let request_timeout_secs = match var("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError {
                key: "REQUEST_TIMEOUT_SECS",
                value: raw,
                expected: "a whole number of seconds",
            })?,
            None => 30,
        };

        let replica_id = var("REPLICA_ID")
            .or_else(|| var("HOSTNAME"))
            .unwrap_or_else(|| format!("producer-{}", ulid::Ulid::new()));

        Ok(Self {
            host,
            port,
            replica_id,
            request_timeout_secs,
        })
    }
}
