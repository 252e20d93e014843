use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    #[serde(default)]
    pub metadata: Option<MetadataConfig>,
    #[serde(default)]
    pub backend: Option<BackendConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8777
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("seerrbridge.db")
}

/// Log output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info,tower_http=debug".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Dispatch queue sizing and promotion cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Maximum queued movies.
    #[serde(default = "default_queue_size")]
    pub movie_max_size: usize,
    /// Maximum queued shows.
    #[serde(default = "default_queue_size")]
    pub tv_max_size: usize,
    /// Average processing time per item, used only for wait estimates.
    #[serde(default = "default_average_item_secs")]
    pub average_item_secs: u64,
    /// How often each queue tries to promote its head.
    #[serde(default = "default_promote_interval_secs")]
    pub promote_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            movie_max_size: default_queue_size(),
            tv_max_size: default_queue_size(),
            average_item_secs: default_average_item_secs(),
            promote_interval_secs: default_promote_interval_secs(),
        }
    }
}

fn default_queue_size() -> usize {
    250
}

fn default_average_item_secs() -> u64 {
    180
}

fn default_promote_interval_secs() -> u64 {
    5
}

/// Backoff parameters for failed records
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Zero disables the limit.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Records re-queued per sweep, per media kind.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_secs: default_max_delay_secs(),
            max_attempts: default_max_attempts(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

fn default_initial_delay_secs() -> u64 {
    2 * 3600
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_secs() -> u64 {
    24 * 3600
}

fn default_max_attempts() -> u32 {
    3
}

fn default_sweep_interval_secs() -> u64 {
    1800
}

fn default_sweep_batch_size() -> usize {
    10
}

/// Periodic re-check of subscribed shows
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_subscription_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: default_subscription_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_subscription_interval_secs() -> u64 {
    6 * 3600
}

/// Audit channel sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_buffer")]
    pub buffer_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_audit_buffer(),
        }
    }
}

fn default_audit_buffer() -> usize {
    1000
}

/// Overseerr/Jellyseerr connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL (e.g., "http://localhost:5055")
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

/// Trakt connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    pub client_id: String,
    #[serde(default = "default_trakt_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_trakt_url() -> String {
    "https://api.trakt.tv".to_string()
}

/// Fetch automation backend connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL of the automation service (e.g., "http://localhost:8778")
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Capacity of the outbound side-effect channel.
    #[serde(default = "default_dispatch_buffer")]
    pub dispatch_buffer: usize,
}

fn default_timeout() -> u32 {
    10
}

fn default_dispatch_buffer() -> usize {
    256
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    pub subscription: SubscriptionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<SanitizedUpstreamConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SanitizedMetadataConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,
}

/// Upstream config with the API key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUpstreamConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

/// Trakt config with the client id hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMetadataConfig {
    pub base_url: String,
    pub client_id_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            logging: config.logging.clone(),
            queue: config.queue.clone(),
            retry: config.retry.clone(),
            subscription: config.subscription.clone(),
            upstream: config.upstream.as_ref().map(|u| SanitizedUpstreamConfig {
                url: u.url.clone(),
                api_key_configured: !u.api_key.is_empty(),
                timeout_secs: u.timeout_secs,
            }),
            metadata: config.metadata.as_ref().map(|m| SanitizedMetadataConfig {
                base_url: m.base_url.clone(),
                client_id_configured: !m.client_id.is_empty(),
                timeout_secs: m.timeout_secs,
            }),
            backend: config.backend.clone(),
        }
    }
}

impl SanitizedConfig {
    /// Hex SHA-256 of the serialized sanitized config, recorded at startup.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&json);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8777);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "seerrbridge.db");
        assert_eq!(config.queue.movie_max_size, 250);
        assert_eq!(config.queue.tv_max_size, 250);
        assert_eq!(config.retry.initial_delay_secs, 7200);
        assert_eq!(config.retry.max_delay_secs, 86400);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.upstream.is_none());
    }

    #[test]
    fn test_deserialize_sections() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[queue]
movie_max_size = 10
tv_max_size = 5

[retry]
initial_delay_secs = 3600
max_attempts = 0

[logging]
format = "json"

[upstream]
url = "http://localhost:5055"
api_key = "secret"

[metadata]
client_id = "trakt-id"

[backend]
url = "http://localhost:8778"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.queue.movie_max_size, 10);
        assert_eq!(config.queue.tv_max_size, 5);
        assert_eq!(config.retry.initial_delay_secs, 3600);
        assert_eq!(config.retry.max_attempts, 0);
        assert_eq!(config.logging.format, LogFormat::Json);

        let upstream = config.upstream.as_ref().unwrap();
        assert_eq!(upstream.timeout_secs, 10); // default
        let metadata = config.metadata.as_ref().unwrap();
        assert_eq!(metadata.base_url, "https://api.trakt.tv");
        let backend = config.backend.as_ref().unwrap();
        assert_eq!(backend.dispatch_buffer, 256);
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let config = Config {
            upstream: Some(UpstreamConfig {
                url: "http://localhost:5055".to_string(),
                api_key: "secret-key".to_string(),
                timeout_secs: 30,
            }),
            metadata: Some(MetadataConfig {
                client_id: String::new(),
                base_url: default_trakt_url(),
                timeout_secs: 10,
            }),
            ..Config::default()
        };

        let sanitized = SanitizedConfig::from(&config);
        let upstream = sanitized.upstream.as_ref().unwrap();
        assert!(upstream.api_key_configured);
        assert!(!sanitized.metadata.as_ref().unwrap().client_id_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-key"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let config = Config::default();
        let a = SanitizedConfig::from(&config).fingerprint();
        let b = SanitizedConfig::from(&config).fingerprint();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
