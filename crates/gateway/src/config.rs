use std::path::PathBuf;
use std::sync::Arc;

use notigate_authority::{AuthorityConfig, ConfigError};
use notigate_core::{CoreError, EventCatalog, KeyEncoding, TopicKeyCodec};

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Authority connection and session pool settings.
    pub authority: AuthorityConfig,
    /// Encoding new topic keys are built in (default: segmented).
    pub key_encoding: KeyEncoding,
    /// Whether encoded keys still parse while segmented is active
    /// (default: true).
    pub legacy_parse: bool,
    /// JSON event catalog replacing the built-in one.
    pub catalog_path: Option<PathBuf>,
    /// Log every pooled session in at startup (default: true).
    pub warm_up: bool,
}

impl GatewayConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Required | Default     |
    /// |--------------------------|----------|-------------|
    /// | `AUTHORITY_*`            | see [`AuthorityConfig::from_env`] | |
    /// | `TOPIC_KEY_ENCODING`     | no       | `segmented` |
    /// | `TOPIC_KEY_LEGACY_PARSE` | no       | `true`      |
    /// | `EVENT_CATALOG_PATH`     | no       | built-in    |
    /// | `GATEWAY_WARM_UP`        | no       | `true`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let authority = AuthorityConfig::from_lookup(&lookup)?;

        let key_encoding = match lookup("TOPIC_KEY_ENCODING") {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                var: "TOPIC_KEY_ENCODING",
                value,
                reason,
            })?,
            None => KeyEncoding::default(),
        };

        Ok(Self {
            authority,
            key_encoding,
            legacy_parse: flag(&lookup, "TOPIC_KEY_LEGACY_PARSE", true)?,
            catalog_path: lookup("EVENT_CATALOG_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            warm_up: flag(&lookup, "GATEWAY_WARM_UP", true)?,
        })
    }

    /// The configured event catalog, or the built-in one.
    pub fn load_catalog(&self) -> Result<EventCatalog, CoreError> {
        match &self.catalog_path {
            Some(path) => EventCatalog::load(path),
            None => Ok(EventCatalog::default()),
        }
    }

    /// A codec with the configured encoding, legacy parsing and catalog.
    pub fn codec(&self) -> Result<TopicKeyCodec, CoreError> {
        Ok(TopicKeyCodec::new(Arc::new(self.load_catalog()?))
            .with_encoding(self.key_encoding)
            .with_legacy_fallback(self.legacy_parse))
    }
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected true or false".to_string(),
        }),
    }
}
