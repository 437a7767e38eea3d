use tripod_core::config::ConfigError;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Largest accepted upload in bytes (default: 16 MiB).
    pub max_upload_bytes: usize,
    /// Upper bound for `/wait` timeouts in seconds (default: `25`).
    /// Clamped below `request_timeout_secs`.
    pub max_await_secs: u64,
    /// Externally reachable base URL, used to build genome browser track
    /// links. No track link is offered when unset.
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".into()],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            max_upload_bytes: 16 * 1024 * 1024,
            max_await_secs: 25,
            public_base_url: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `3000`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                       |
    /// | `MAX_UPLOAD_BYTES`      | `16777216`                 |
    /// | `MAX_AWAIT_SECS`        | `25`                       |
    /// | `PUBLIC_BASE_URL`       | unset                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(v) = lookup("PORT") {
            config.port = parse_var("PORT", &v)?;
        }
        if let Some(v) = lookup("CORS_ORIGINS") {
            config.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("SHUTDOWN_TIMEOUT_SECS") {
            config.shutdown_timeout_secs = parse_var("SHUTDOWN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = lookup("MAX_AWAIT_SECS") {
            config.max_await_secs = parse_var("MAX_AWAIT_SECS", &v)?;
        }
        config.public_base_url = lookup("PUBLIC_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());

        config.max_await_secs = config
            .max_await_secs
            .min(config.request_timeout_secs.saturating_sub(1));

        Ok(config)
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
