//! Configuration for the authentication dispatcher.
//!
//! Sources, later ones winning:
//! - Defaults
//! - TOML file (`xauth.toml`, or the path in `XAUTH_CONFIG_FILE`)
//! - Environment variables prefixed `XAUTH__`, e.g. `XAUTH__QUEUE__RETRY_COUNT=2`

use crate::dispatcher::AuthSettings;
use crate::error::ConfigError;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use xauth_console::NintendoSettings;
use xauth_core::{ClientAuthenticationType, ProviderConfig};
use xauth_queue::QueueSettings;

const CONFIG_FILE_VAR: &str = "XAUTH_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "xauth.toml";
const ENV_PREFIX: &str = "XAUTH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct XauthConfig {
    pub application: ApplicationConfig,
    pub queue: QueueConfig,
    pub providers: Vec<ProviderEntry>,
    pub nintendo: NintendoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub application_id: String,
    pub allow_anonymous: bool,
}

/// Limits shared by every provider queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    #[serde(default = "default_max_queued_requests")]
    pub max_queued_requests: usize,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Longest time a request may wait before it is sent
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,

    /// Connection retries per request
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_offline_error_threshold")]
    pub offline_error_threshold: u32,

    #[serde(default = "default_offline_retry_interval_ms")]
    pub offline_retry_interval_ms: u64,
}

/// One enabled identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Variant name or wire code, e.g. `Steam` or `1`
    pub auth_type: String,

    #[serde(default)]
    pub base_uri: String,

    /// Dashboard parameters in query-string form, e.g. `appid=1&secret=s`
    #[serde(default)]
    pub static_params: String,

    #[serde(default)]
    pub forward_as_json: bool,

    #[serde(default = "default_true")]
    pub reject_if_unavailable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NintendoConfig {
    /// Environment key (e.g. `lp1`) to issuer base URL
    pub environments: BTreeMap<String, String>,

    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,

    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_requests() -> usize {
    50
}

fn default_max_queued_requests() -> usize {
    5000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_queue_timeout_ms() -> u64 {
    60_000
}

fn default_retry_count() -> u32 {
    1
}

fn default_offline_error_threshold() -> u32 {
    10
}

fn default_offline_retry_interval_ms() -> u64 {
    30_000
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_retrieval_timeout_ms() -> u64 {
    5000
}

fn default_clock_skew_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            max_queued_requests: default_max_queued_requests(),
            request_timeout_ms: default_request_timeout_ms(),
            queue_timeout_ms: default_queue_timeout_ms(),
            retry_count: default_retry_count(),
            offline_error_threshold: default_offline_error_threshold(),
            offline_retry_interval_ms: default_offline_retry_interval_ms(),
        }
    }
}

impl Default for NintendoConfig {
    fn default() -> Self {
        Self {
            environments: BTreeMap::new(),
            refresh_interval_secs: default_refresh_interval_secs(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
            clock_skew_secs: default_clock_skew_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl XauthConfig {
    /// Load from the config file named by `XAUTH_CONFIG_FILE` (if it exists)
    /// and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let path = Path::new(&config_path);
        if path.exists() {
            info!("Loading configuration from {}", config_path);
            Self::load_with(Some(path), None)
        } else {
            debug!("No config file found at {}, using defaults", config_path);
            Self::load_with(None, None)
        }
    }

    /// Load from an optional TOML file plus environment variables.
    ///
    /// `env` replaces the process environment when given.
    pub fn load_with(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let settings: XauthConfig = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings: XauthConfig = ConfigBuilder::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_concurrent_requests == 0 {
            return Err(invalid("queue.max_concurrent_requests must be greater than 0"));
        }
        if self.queue.request_timeout_ms == 0 {
            return Err(invalid("queue.request_timeout_ms must be greater than 0"));
        }
        if self.nintendo.refresh_interval_secs == 0 {
            return Err(invalid("nintendo.refresh_interval_secs must be greater than 0"));
        }

        self.provider_configs()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !is_filter_directive(&self.logging.level)
            && !valid_levels.contains(&level_lower.as_str())
        {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["pretty", "json", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format, valid_formats
            )));
        }

        Ok(())
    }

    /// Provider snapshots in configuration order.
    pub fn provider_configs(&self) -> Result<Vec<ProviderConfig>, ConfigError> {
        self.providers
            .iter()
            .map(|entry| {
                let auth_type = ClientAuthenticationType::from_str(&entry.auth_type)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;

                if is_http_provider(auth_type) && entry.base_uri.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "Provider {auth_type} requires a base_uri"
                    )));
                }

                Ok(ProviderConfig::new(auth_type, entry.base_uri.trim())
                    .with_static_query(&entry.static_params)
                    .with_forward_as_json(entry.forward_as_json)
                    .with_reject_if_unavailable(entry.reject_if_unavailable))
            })
            .collect()
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings::default()
            .with_max_concurrent_requests(self.queue.max_concurrent_requests)
            .with_max_queued_requests(self.queue.max_queued_requests)
            .with_request_timeout(Duration::from_millis(self.queue.request_timeout_ms))
            .with_queue_timeout(Duration::from_millis(self.queue.queue_timeout_ms))
            .with_offline_threshold(
                self.queue.offline_error_threshold,
                Duration::from_millis(self.queue.offline_retry_interval_ms),
            )
    }

    pub fn nintendo_settings(&self) -> NintendoSettings {
        NintendoSettings {
            environments: self.nintendo.environments.clone(),
            refresh_interval: Duration::from_secs(self.nintendo.refresh_interval_secs),
            retrieval_timeout: Duration::from_millis(self.nintendo.retrieval_timeout_ms),
            clock_skew: Duration::from_secs(self.nintendo.clock_skew_secs),
        }
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings::new(self.application.application_id.clone())
            .with_allow_anonymous(self.application.allow_anonymous)
    }

    /// Filter string for `tracing_subscriber::EnvFilter`.
    pub fn log_filter(&self) -> String {
        if is_filter_directive(&self.logging.level) {
            self.logging.level.clone()
        } else {
            let level = &self.logging.level;
            format!(
                "xauth_dispatch={level},xauth_queue={level},xauth_console={level},xauth_token={level},{level}"
            )
        }
    }
}

fn is_http_provider(auth_type: ClientAuthenticationType) -> bool {
    !matches!(
        auth_type,
        ClientAuthenticationType::Jwt
            | ClientAuthenticationType::PlayerIo
            | ClientAuthenticationType::Nintendo
    )
}

fn is_filter_directive(level: &str) -> bool {
    level.contains('=') || level.contains(',')
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[application]
application_id = "0x01004B9000490000"
allow_anonymous = false

[queue]
max_concurrent_requests = 8
retry_count = 2

[[providers]]
auth_type = "Steam"
base_uri = "https://auth.example.com/steam"
static_params = "appid=480&apiKeySecret=k"
forward_as_json = true

[[providers]]
auth_type = "13"
static_params = "secret=a;b;c"
reject_if_unavailable = false

[nintendo]
refresh_interval_secs = 120

[nintendo.environments]
lp1 = "https://e0d67c509fb203858ebcb2fe3f88c2aa.baas.nintendo.com"

[logging]
level = "debug"
format = "json"
"#;

    #[test]
    fn test_defaults() {
        let config = XauthConfig::default();

        assert!(config.validate().is_ok());
        assert!(config.providers.is_empty());
        assert_eq!(config.queue_settings(), QueueSettings::default());
        assert_eq!(config.nintendo_settings(), NintendoSettings::default());
        assert_eq!(config.queue.retry_count, 1);
        assert!(!config.application.allow_anonymous);
    }

    #[test]
    fn test_from_toml() {
        let config = XauthConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.queue.max_concurrent_requests, 8);
        assert_eq!(config.queue.max_queued_requests, 5000);
        assert_eq!(config.queue.retry_count, 2);
        assert_eq!(config.logging.format, "json");

        let providers = config.provider_configs().unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].authentication_type, ClientAuthenticationType::Steam);
        assert_eq!(providers[0].dashboard_param("apiKeySecret"), Some("k"));
        assert!(providers[0].forward_as_json);
        assert!(providers[0].reject_if_unavailable);
        assert_eq!(providers[1].authentication_type, ClientAuthenticationType::Jwt);
        assert_eq!(providers[1].dashboard_param("secret"), Some("a;b;c"));
        assert!(!providers[1].reject_if_unavailable);

        let nintendo = config.nintendo_settings();
        assert_eq!(nintendo.refresh_interval, Duration::from_secs(120));
        assert_eq!(nintendo.environments.len(), 1);
        assert!(nintendo.environments.contains_key("lp1"));

        let settings = config.auth_settings();
        assert_eq!(settings.application_id, "0x01004B9000490000");
        assert!(!settings.allow_anonymous);
    }

    #[test]
    fn test_file_and_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let env: config::Map<String, String> = [
            ("XAUTH__QUEUE__MAX_CONCURRENT_REQUESTS", "3"),
            ("XAUTH__APPLICATION__ALLOW_ANONYMOUS", "true"),
            ("UNRELATED", "x"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = XauthConfig::load_with(Some(file.path()), Some(env)).unwrap();

        assert_eq!(config.queue.max_concurrent_requests, 3);
        assert_eq!(config.queue.retry_count, 2);
        assert!(config.application.allow_anonymous);
        assert_eq!(config.providers.len(), 2);
    }

    #[test]
    fn test_environment_only() {
        let env: config::Map<String, String> =
            [("XAUTH__LOGGING__LEVEL".to_string(), "warn".to_string())]
                .into_iter()
                .collect();

        let config = XauthConfig::load_with(None, Some(env)).unwrap();

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.queue.max_concurrent_requests, 50);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        assert!(matches!(
            XauthConfig::load_with(Some(&missing), Some(config::Map::new())),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = XauthConfig::default();
        config.queue.max_concurrent_requests = 0;
        assert!(config.validate().is_err());

        let mut config = XauthConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = XauthConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = XauthConfig::default();
        config.providers.push(ProviderEntry {
            auth_type: "Facebook".to_string(),
            base_uri: " ".to_string(),
            static_params: String::new(),
            forward_as_json: false,
            reject_if_unavailable: true,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_uri"));

        let mut config = XauthConfig::default();
        config.providers.push(ProviderEntry {
            auth_type: "Stadia".to_string(),
            base_uri: "https://a".to_string(),
            static_params: String::new(),
            forward_as_json: false,
            reject_if_unavailable: true,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_providers_need_no_base_uri() {
        let mut config = XauthConfig::default();
        config.providers.push(ProviderEntry {
            auth_type: "Nintendo".to_string(),
            base_uri: String::new(),
            static_params: "appid=0x0100".to_string(),
            forward_as_json: false,
            reject_if_unavailable: true,
        });

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_filter() {
        let mut config = XauthConfig::default();
        assert!(config.log_filter().starts_with("xauth_dispatch=info,"));
        assert!(config.log_filter().ends_with(",info"));

        config.logging.level = "xauth_queue=trace,warn".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.log_filter(), "xauth_queue=trace,warn");
    }
}
