use std::fmt;
use std::time::Duration;

/// Default number of authority sessions in the dispatch pool.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default lifetime of an authority login before re-authentication.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Default timeout of a single authority HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for the partner authority.
#[derive(Clone)]
pub struct AuthorityConfig {
    /// Base URL of the authority REST API, e.g. `https://authority.example/api`.
    pub base_url: String,
    /// Service account email used for `/user/login`.
    pub email: String,
    /// Service account password used for `/user/login`.
    pub password: String,
    /// Number of sessions in the dispatch pool (default: `10`).
    pub pool_size: usize,
    /// How long a login stays valid (default: 3600 s).
    pub session_ttl: Duration,
    /// Per-request HTTP timeout (default: 30 s).
    pub request_timeout: Duration,
}

impl AuthorityConfig {
    /// Configuration with default pool size and timings.
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            email: email.into(),
            password: password.into(),
            pool_size: DEFAULT_POOL_SIZE,
            session_ttl: DEFAULT_SESSION_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Required | Default |
    /// |----------------------------------|----------|---------|
    /// | `AUTHORITY_API_URL`              | **yes**  | --      |
    /// | `AUTHORITY_EMAIL`                | **yes**  | --      |
    /// | `AUTHORITY_PASSWORD`             | **yes**  | --      |
    /// | `AUTHORITY_POOL_SIZE`            | no       | `10`    |
    /// | `AUTHORITY_SESSION_TTL_SECS`     | no       | `3600`  |
    /// | `AUTHORITY_REQUEST_TIMEOUT_SECS` | no       | `30`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(var))
        };

        let mut config = Self::new(
            required("AUTHORITY_API_URL")?,
            required("AUTHORITY_EMAIL")?,
            required("AUTHORITY_PASSWORD")?,
        );

        if let Some(value) = lookup("AUTHORITY_POOL_SIZE") {
            config.pool_size = parse_number("AUTHORITY_POOL_SIZE", &value)?;
            if config.pool_size == 0 {
                return Err(ConfigError::Invalid {
                    var: "AUTHORITY_POOL_SIZE",
                    value,
                    reason: "pool must hold at least one session".to_string(),
                });
            }
        }
        if let Some(value) = lookup("AUTHORITY_SESSION_TTL_SECS") {
            config.session_ttl =
                Duration::from_secs(parse_number("AUTHORITY_SESSION_TTL_SECS", &value)?);
        }
        if let Some(value) = lookup("AUTHORITY_REQUEST_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse_number("AUTHORITY_REQUEST_TIMEOUT_SECS", &value)?);
        }

        Ok(config)
    }
}

// The password stays out of logs.
impl fmt::Debug for AuthorityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorityConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("pool_size", &self.pool_size)
            .field("session_ttl", &self.session_ttl)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn parse_number<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
