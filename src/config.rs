use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub policy: PolicyDefaults,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub sweeper: SweeperIntervals,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health server port (default: 8080)
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

fn default_health_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Engine defaults applied when a SPENDING_LIMIT policy does not
/// override them.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyDefaults {
    /// Cooldown for DELAY-tier transactions, seconds
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: i64,
    /// Approval window for APPROVAL-tier transactions, seconds
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_seconds: i64,
}

fn default_delay_seconds() -> i64 {
    300
}

fn default_approval_timeout() -> i64 {
    3600
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            delay_seconds: 300,
            approval_timeout_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// How long to wait for on-chain confirmation, seconds
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

fn default_confirmation_timeout() -> u64 {
    60
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperIntervals {
    /// Interval between delay-promotion sweeps, seconds
    #[serde(default = "default_delay_interval")]
    pub delay_interval_secs: u64,
    /// Interval between approval-expiry sweeps, seconds
    #[serde(default = "default_approval_interval")]
    pub approval_interval_secs: u64,
}

fn default_delay_interval() -> u64 {
    5
}

fn default_approval_interval() -> u64 {
    30
}

impl Default for SweeperIntervals {
    fn default() -> Self {
        Self {
            delay_interval_secs: 5,
            approval_interval_secs: 30,
        }
    }
}

/// Signing-key storage for the bundled file provider.
#[derive(Debug, Clone, Deserialize)]
pub struct KeysConfig {
    /// Directory holding per-wallet key files
    #[serde(default = "default_keys_dir")]
    pub dir: String,
}

fn default_keys_dir() -> String {
    "keys".to_string()
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            dir: default_keys_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .set_default("keys.dir", "keys")?
            .set_default("health_port", 8080)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("WARDEN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (WARDEN_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("WARDEN")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.is_empty() {
            errors.push("database.url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be at least 1".to_string());
        }

        if self.policy.delay_seconds <= 0 {
            errors.push("policy.delay_seconds must be positive".to_string());
        }
        if self.policy.approval_timeout_seconds <= 0 {
            errors.push("policy.approval_timeout_seconds must be positive".to_string());
        }

        if self.executor.confirmation_timeout_secs == 0 {
            errors.push("executor.confirmation_timeout_secs must be positive".to_string());
        }

        if self.sweeper.delay_interval_secs == 0 {
            errors.push("sweeper.delay_interval_secs must be positive".to_string());
        }
        if self.sweeper.approval_interval_secs == 0 {
            errors.push("sweeper.approval_interval_secs must be positive".to_string());
        }

        if self.keys.dir.is_empty() {
            errors.push("keys.dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: "postgres://localhost/warden".to_string(),
                max_connections: 5,
            },
            policy: PolicyDefaults::default(),
            executor: ExecutorConfig::default(),
            sweeper: SweeperIntervals::default(),
            keys: KeysConfig::default(),
            logging: LoggingConfig::default(),
            health_port: 8080,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = base_config();
        config.database.url = String::new();
        config.policy.delay_seconds = 0;
        config.sweeper.delay_interval_secs = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("database.url")));
        assert!(errors.iter().any(|e| e.contains("delay_seconds")));
        assert!(errors.iter().any(|e| e.contains("delay_interval_secs")));
    }

    #[test]
    fn test_section_defaults() {
        let policy = PolicyDefaults::default();
        assert_eq!(policy.delay_seconds, 300);
        assert_eq!(policy.approval_timeout_seconds, 3600);

        let sweeper = SweeperIntervals::default();
        assert_eq!(sweeper.delay_interval_secs, 5);
        assert_eq!(sweeper.approval_interval_secs, 30);

        assert_eq!(KeysConfig::default().dir, "keys");
        assert_eq!(LoggingConfig::default().level, "info");
    }
}
