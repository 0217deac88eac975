//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\contact-enricher\config.toml
//! - macOS: ~/Library/Application Support/contact-enricher/config.toml
//! - Linux: ~/.config/contact-enricher/config.toml
//!
//! The config file is human-readable and editable. Every section is
//! optional; missing keys fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::enrichment::batch::BatchConfig;
use crate::enrichment::cache::CacheConfig;
use crate::enrichment::circuit::CircuitConfig;
use crate::enrichment::domain::EnrichmentError;
use crate::enrichment::explorium;
use crate::enrichment::governor::GovernorConfig;
use crate::enrichment::retry::RetryPolicy;
use crate::enrichment::service::EnrichmentConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API credentials (keep separate for potential future encryption)
    pub credentials: Credentials,
    pub provider: ProviderSettings,
    pub cache: CacheSettings,
    pub governor: GovernorSettings,
    pub circuit: CircuitSettings,
    pub retry: RetrySettings,
    pub batch: BatchSettings,
    pub service: ServiceSettings,
}

/// API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Explorium API key
    pub explorium_api_key: Option<String>,
}

/// Provider endpoint and billing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Name used for spend ledgers and logs
    pub name: String,
    pub base_url: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
    /// Credits charged per identity looked up
    pub cost_per_lookup: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: explorium::PROVIDER_NAME.to_string(),
            base_url: explorium::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 15,
            cost_per_lookup: 1,
        }
    }
}

/// Cache TTLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Lifetime of identity matches (default 7 days)
    pub identity_ttl_secs: u64,
    /// Lifetime of full enrichment payloads (default 24 hours)
    pub payload_ttl_secs: u64,
    /// Background sweep period, 0 disables the sweep
    pub sweep_interval_secs: u64,
    pub tombstone_retention_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            identity_ttl_secs: 7 * 24 * 60 * 60,
            payload_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 300,
            tombstone_retention_secs: 60 * 60,
        }
    }
}

/// Spend caps in credits; unset means unlimited
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorSettings {
    pub daily_cap: Option<u64>,
    pub monthly_cap: Option<u64>,
    pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitSettings {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Collection window for cache-miss batching
    pub window_ms: u64,
    pub max_batch_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            window_ms: 50,
            max_batch_size: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Longest a caller waits for one enrichment
    pub caller_timeout_secs: u64,
    /// Background workers for stored-contact enrichment
    pub workers: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            caller_timeout_secs: 30,
            workers: 4,
        }
    }
}

impl Config {
    /// Enrichment settings in the service's own types.
    pub fn enrichment_config(&self) -> EnrichmentConfig {
        let sweep = self.cache.sweep_interval_secs;
        EnrichmentConfig {
            cache: CacheConfig {
                identity_ttl: Duration::from_secs(self.cache.identity_ttl_secs),
                payload_ttl: Duration::from_secs(self.cache.payload_ttl_secs),
                tombstone_retention: Duration::from_secs(self.cache.tombstone_retention_secs),
            },
            governor: GovernorConfig {
                daily_cap: self.governor.daily_cap,
                monthly_cap: self.governor.monthly_cap,
                requests_per_minute: self.governor.requests_per_minute,
            },
            circuit: CircuitConfig {
                failure_threshold: self.circuit.failure_threshold,
                cooldown: Duration::from_secs(self.circuit.cooldown_secs),
            },
            retry: RetryPolicy {
                max_retries: self.retry.max_retries,
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                multiplier: self.retry.multiplier,
            },
            batch: BatchConfig {
                window: Duration::from_millis(self.batch.window_ms),
                max_batch_size: self.batch.max_batch_size,
            },
            cost_per_lookup: self.provider.cost_per_lookup,
            attempt_timeout: Duration::from_secs(self.provider.request_timeout_secs),
            caller_timeout: Duration::from_secs(self.service.caller_timeout_secs),
            sweep_interval: (sweep > 0).then(|| Duration::from_secs(sweep)),
        }
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), EnrichmentError> {
        if self.provider.name.trim().is_empty() {
            return Err(EnrichmentError::InvalidConfig(
                "provider name must not be empty".into(),
            ));
        }
        if self.service.workers == 0 {
            return Err(EnrichmentError::InvalidConfig(
                "service workers must be at least 1".into(),
            ));
        }
        self.enrichment_config().validate()
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("contact-enricher"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a specific file, with the same fallbacks as [`load`].
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save configuration to a specific file
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        for section in [
            "[credentials]",
            "[provider]",
            "[cache]",
            "[governor]",
            "[circuit]",
            "[retry]",
            "[batch]",
            "[service]",
        ] {
            assert!(toml.contains(section), "missing {section}");
        }
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.credentials.explorium_api_key = Some("test-key-123".to_string());
        config.governor.daily_cap = Some(500);
        config.retry.multiplier = 1.5;

        save_to(&config, &path).unwrap();
        let parsed = load_from(&path);

        assert_eq!(
            parsed.credentials.explorium_api_key,
            Some("test-key-123".to_string())
        );
        assert_eq!(parsed.governor.daily_cap, Some(500));
        assert_eq!(parsed.retry.multiplier, 1.5);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // Config with only some fields
        let toml = r#"
[credentials]
explorium_api_key = "my-key"

[batch]
window_ms = 10
"#;
        let config: Config = toml::from_str(toml).unwrap();

        // Specified fields are set
        assert_eq!(
            config.credentials.explorium_api_key,
            Some("my-key".to_string())
        );
        assert_eq!(config.batch.window_ms, 10);

        // Other fields use defaults
        assert_eq!(config.batch.max_batch_size, 25);
        assert_eq!(config.circuit.failure_threshold, 5);
        assert_eq!(config.provider.name, "explorium");
        assert!(config.governor.daily_cap.is_none());
    }

    #[test]
    fn test_unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let config = load_from(&path);
        assert_eq!(config.service.workers, 4);
    }

    #[test]
    fn test_enrichment_config_conversion() {
        let mut config = Config::default();
        config.cache.sweep_interval_secs = 0;
        config.batch.window_ms = 75;

        let enrichment = config.enrichment_config();

        assert_eq!(enrichment.cache.identity_ttl, Duration::from_secs(604_800));
        assert_eq!(enrichment.cache.payload_ttl, Duration::from_secs(86_400));
        assert_eq!(enrichment.batch.window, Duration::from_millis(75));
        assert!(enrichment.sweep_interval.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.retry.max_delay_ms = 10;
        assert_eq!(config.validate().unwrap_err().code(), "invalid_config");

        let mut config = Config::default();
        config.service.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.payload_ttl_secs = 0;
        assert!(config.validate().is_err());
    }
}
