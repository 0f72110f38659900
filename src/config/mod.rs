use crate::error::{GatekeeperError, Result};
use crate::rate_limit::types::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `GATEKEEPER__RATE_LIMITING__THRESHOLD=50`
pub const ENV_PREFIX: &str = "GATEKEEPER";

/// Main gatekeeper configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,
    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Deployment environment reported by the health endpoint
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Which counter store backs the rate limiter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process counters, single instance only
    #[default]
    Memory,
    /// Redis, shared by every instance
    Redis,
}

/// Counter store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Redis connection settings (required for the redis backend)
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Logical database, overrides the one in the URL
    #[serde(default)]
    pub db: Option<i64>,
    /// Password, overrides the one in the URL
    #[serde(default)]
    pub password: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the compact format
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    60
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
            environment: default_environment(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            db: None,
            password: None,
        }
    }
}

impl GatekeeperConfig {
    /// Load configuration from an optional YAML file layered under
    /// `GATEKEEPER__*` environment variables
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path.as_ref()).format(config::FileFormat::Yaml),
            );
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| GatekeeperError::Config(format!("Failed to load config: {}", e)))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.timeout_secs == 0 {
            return Err(GatekeeperError::InvalidConfiguration(
                "server timeout must be > 0".to_string(),
            ));
        }

        // A disabled limiter is never built, so its settings are irrelevant
        if !self.rate_limiting.enabled {
            return Ok(());
        }

        self.rate_limiting.validate()?;

        if self.store.backend == StoreBackend::Redis {
            match &self.store.redis {
                Some(redis) if !redis.url.is_empty() => {}
                Some(_) => {
                    return Err(GatekeeperError::InvalidConfiguration(
                        "Redis URL cannot be empty".to_string(),
                    ))
                }
                None => {
                    return Err(GatekeeperError::InvalidConfiguration(
                        "store.redis is required when store.backend is redis".to_string(),
                    ))
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::types::FailurePolicy;
    use std::io::Write;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 3000
  timeout_secs: 30
  environment: "development"

rate_limiting:
  enabled: true
  threshold: 50
  window_secs: 60
  failure_policy: fail_closed
  store_timeout_ms: 100

store:
  backend: redis
  redis:
    url: "redis://cache:6379"
    db: 2
"#;

        let config = GatekeeperConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.environment, "development");
        assert_eq!(config.rate_limiting.threshold, 50);
        assert_eq!(config.rate_limiting.window_secs, 60);
        assert_eq!(config.rate_limiting.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        let redis = config.store.redis.as_ref().unwrap();
        assert_eq!(redis.url, "redis://cache:6379");
        assert_eq!(redis.db, Some(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = GatekeeperConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.timeout_secs, 60);
        assert!(config.rate_limiting.enabled);
        assert_eq!(config.rate_limiting.threshold, 20);
        assert_eq!(config.rate_limiting.window_secs, 120);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_threshold() {
        let yaml = r#"
rate_limiting:
  threshold: 0
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(GatekeeperError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_zero_window() {
        let mut config = GatekeeperConfig::default();
        config.rate_limiting.window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled_limiter_skips_rate_limit_validation() {
        let mut config = GatekeeperConfig::default();
        config.rate_limiting.enabled = false;
        config.rate_limiting.threshold = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_redis_backend_requires_settings() {
        let mut config = GatekeeperConfig::default();
        config.store.backend = StoreBackend::Redis;
        assert!(config.validate().is_err());

        config.store.redis = Some(RedisConfig {
            url: String::new(),
            ..RedisConfig::default()
        });
        assert!(config.validate().is_err());

        config.store.redis = Some(RedisConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = GatekeeperConfig::from_yaml("rate_limiting: [").unwrap_err();
        assert!(matches!(err, GatekeeperError::Config(_)));
    }

    #[test]
    fn test_load_layers_environment_over_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "rate_limiting:\n  threshold: 10\n  window_secs: 30\nserver:\n  port: 9000"
        )
        .unwrap();

        std::env::set_var("GATEKEEPER__RATE_LIMITING__THRESHOLD", "75");
        let config = GatekeeperConfig::load(Some(file.path()));
        std::env::remove_var("GATEKEEPER__RATE_LIMITING__THRESHOLD");

        let config = config.unwrap();
        assert_eq!(config.rate_limiting.threshold, 75);
        assert_eq!(config.rate_limiting.window_secs, 30);
        assert_eq!(config.server.port, 9000);
    }
}
