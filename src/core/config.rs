use crate::core::price::Timeframe;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::PathBuf};
use tracing::debug;

/// Overrides `providers.coingecko.api_key` when set.
pub const API_KEY_ENV: &str = "ARGOS_COINGECKO_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for CoinGeckoProviderConfig {
    fn default() -> Self {
        CoinGeckoProviderConfig {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub coingecko: Option<CoinGeckoProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: Some(CoinGeckoProviderConfig::default()),
        }
    }
}

/// Freshness window of a cached series, in seconds, per timeframe.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CacheDurations {
    #[serde(rename = "1h")]
    pub one_hour: u64,
    #[serde(rename = "24h")]
    pub one_day: u64,
    #[serde(rename = "7d")]
    pub seven_days: u64,
}

impl Default for CacheDurations {
    fn default() -> Self {
        CacheDurations {
            one_hour: 60,
            one_day: 300,
            seven_days: 900,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PricingConfig {
    pub rate_limit_per_minute: u32,
    pub monthly_limit: u64,
    pub monthly_buffer: u64,
    pub max_cache_age_secs: u64,
    pub cleanup_probability: f64,
    pub sweep_interval_secs: u64,
    pub cache_durations: CacheDurations,
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig {
            rate_limit_per_minute: 30,
            monthly_limit: 9900,
            monthly_buffer: 100,
            max_cache_age_secs: 24 * 60 * 60,
            cleanup_probability: 0.01,
            sweep_interval_secs: 60 * 60,
            cache_durations: CacheDurations::default(),
        }
    }
}

impl PricingConfig {
    pub fn cache_duration(&self, timeframe: Timeframe) -> chrono::Duration {
        let secs = match timeframe {
            Timeframe::OneHour => self.cache_durations.one_hour,
            Timeframe::OneDay => self.cache_durations.one_day,
            Timeframe::SevenDays => self.cache_durations.seven_days,
        };
        chrono::Duration::seconds(secs as i64)
    }

    pub fn max_cache_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_cache_age_secs as i64)
    }

    /// Usable monthly calls once the safety buffer is set aside.
    pub fn monthly_ceiling(&self) -> u64 {
        self.monthly_limit.saturating_sub(self.monthly_buffer)
    }
}

fn default_token_ids() -> HashMap<String, String> {
    HashMap::from([("89".to_string(), "project89".to_string())])
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    /// Caller token id to upstream coin id. Unmapped ids are used as-is.
    #[serde(default = "default_token_ids")]
    pub token_ids: HashMap<String, String>,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            providers: ProvidersConfig::default(),
            pricing: PricingConfig::default(),
            token_ids: default_token_ids(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "argos", "argos")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "argos", "argos")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.apply_env_overrides(std::env::var(API_KEY_ENV).ok());
        debug!("Successfully loaded config");
        Ok(config)
    }

    fn apply_env_overrides(&mut self, api_key: Option<String>) {
        let Some(api_key) = api_key.filter(|key| !key.trim().is_empty()) else {
            return;
        };
        debug!("Using API key from {}", API_KEY_ENV);
        self.providers
            .coingecko
            .get_or_insert_with(CoinGeckoProviderConfig::default)
            .api_key = Some(api_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
providers:
  coingecko:
    base_url: "http://example.com/api/v3"
    api_key: "demo-key"
pricing:
  rate_limit_per_minute: 10
  monthly_limit: 500
  cache_durations:
    1h: 30
    24h: 120
    7d: 600
token_ids:
  "42": "answer-token"
data_path: "/tmp/argos"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        let coingecko = config.providers.coingecko.as_ref().unwrap();
        assert_eq!(coingecko.base_url, "http://example.com/api/v3");
        assert_eq!(coingecko.api_key.as_deref(), Some("demo-key"));

        assert_eq!(config.pricing.rate_limit_per_minute, 10);
        assert_eq!(config.pricing.monthly_limit, 500);
        // Unset fields keep their defaults
        assert_eq!(config.pricing.monthly_buffer, 100);
        assert_eq!(config.pricing.cleanup_probability, 0.01);
        assert_eq!(
            config.pricing.cache_duration(Timeframe::OneDay),
            chrono::Duration::seconds(120)
        );

        assert_eq!(
            config.token_ids.get("42").map(String::as_str),
            Some("answer-token")
        );
        // An explicit table replaces the default mapping
        assert!(!config.token_ids.contains_key("89"));
        assert_eq!(config.data_path.as_deref(), Some("/tmp/argos"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(
            config.providers.coingecko.unwrap().base_url,
            "https://api.coingecko.com/api/v3"
        );
        assert_eq!(config.pricing.rate_limit_per_minute, 30);
        assert_eq!(config.pricing.monthly_ceiling(), 9800);
        assert_eq!(config.pricing.max_cache_age(), chrono::Duration::hours(24));
        assert_eq!(
            config.pricing.cache_duration(Timeframe::OneHour),
            chrono::Duration::seconds(60)
        );
        assert_eq!(
            config.pricing.cache_duration(Timeframe::SevenDays),
            chrono::Duration::seconds(900)
        );
        assert_eq!(config.token_ids.get("89").map(String::as_str), Some("project89"));
    }

    #[test]
    fn test_env_api_key_overrides_config() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(Some("env-key".to_string()));
        assert_eq!(
            config.providers.coingecko.unwrap().api_key.as_deref(),
            Some("env-key")
        );

        let mut config = AppConfig::default();
        config.apply_env_overrides(Some("   ".to_string()));
        assert!(config.providers.coingecko.unwrap().api_key.is_none());
    }
}
