use super::conversion::CurrencyPair;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf, time::Duration};
use tracing::debug;

pub const DEFAULT_BASE_CURRENCY: &str = "USD";
pub const DEFAULT_API_URL: &str = "https://api.exchangerate-api.com/v4/latest";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExchangeRateApiConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub exchange_rate_api: Option<ExchangeRateApiConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            exchange_rate_api: Some(ExchangeRateApiConfig {
                base_url: DEFAULT_API_URL.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_hour_ms")]
    pub cache_duration_ms: u64,
    #[serde(default = "default_hour_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_popular_pairs")]
    pub popular_pairs: Vec<CurrencyPair>,
    #[serde(default = "default_currency_names")]
    pub currency_names: BTreeMap<String, String>,
    pub data_path: Option<String>,
}

fn default_base_currency() -> String {
    DEFAULT_BASE_CURRENCY.to_string()
}

fn default_hour_ms() -> u64 {
    3_600_000
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_popular_pairs() -> Vec<CurrencyPair> {
    [
        ("USD", "EUR"),
        ("GBP", "USD"),
        ("EUR", "GBP"),
        ("USD", "JPY"),
        ("USD", "CAD"),
        ("USD", "AUD"),
    ]
    .into_iter()
    .map(|(from, to)| CurrencyPair::new(from, to))
    .collect()
}

fn default_currency_names() -> BTreeMap<String, String> {
    [
        ("USD", "US Dollar"),
        ("EUR", "Euro"),
        ("GBP", "British Pound"),
        ("JPY", "Japanese Yen"),
        ("AUD", "Australian Dollar"),
        ("CAD", "Canadian Dollar"),
        ("CHF", "Swiss Franc"),
        ("CNY", "Chinese Yuan"),
        ("INR", "Indian Rupee"),
        ("MXN", "Mexican Peso"),
        ("BRL", "Brazilian Real"),
        ("ZAR", "South African Rand"),
        ("SGD", "Singapore Dollar"),
        ("HKD", "Hong Kong Dollar"),
        ("SEK", "Swedish Krona"),
        ("NOK", "Norwegian Krone"),
        ("DKK", "Danish Krone"),
        ("NZD", "New Zealand Dollar"),
        ("KRW", "South Korean Won"),
        ("TRY", "Turkish Lira"),
        ("RUB", "Russian Ruble"),
        ("PLN", "Polish Zloty"),
        ("THB", "Thai Baht"),
        ("MYR", "Malaysian Ringgit"),
        ("IDR", "Indonesian Rupiah"),
        ("PHP", "Philippine Peso"),
        ("CZK", "Czech Koruna"),
        ("ILS", "Israeli Shekel"),
        ("AED", "UAE Dirham"),
        ("SAR", "Saudi Riyal"),
        ("DOP", "Dominican Peso"),
    ]
    .into_iter()
    .map(|(code, name)| (code.to_string(), name.to_string()))
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            providers: ProvidersConfig::default(),
            cache_duration_ms: default_hour_ms(),
            refresh_interval_ms: default_hour_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            popular_pairs: default_popular_pairs(),
            currency_names: default_currency_names(),
            data_path: None,
        }
    }
}

impl AppConfig {
    /// Loads the default config file, or built-in defaults when there is none.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "quickcurrency", "quickcurrency")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "quickcurrency", "quickcurrency")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn api_base_url(&self) -> &str {
        self.providers
            .exchange_rate_api
            .as_ref()
            .map_or(DEFAULT_API_URL, |p| &p.base_url)
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_millis(self.cache_duration_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("Failed to deserialize");

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.base_currency, "USD");
        assert_eq!(config.cache_duration(), Duration::from_secs(3600));
        assert_eq!(config.refresh_interval(), Duration::from_secs(3600));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.popular_pairs.len(), 6);
        assert_eq!(config.popular_pairs[1], CurrencyPair::new("GBP", "USD"));
        assert_eq!(config.currency_names.len(), 31);
        assert_eq!(
            config.currency_names.get("DOP").map(String::as_str),
            Some("Dominican Peso")
        );
        assert_eq!(config.api_base_url(), DEFAULT_API_URL);
    }

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
base_currency: "EUR"
cache_duration_ms: 60000
refresh_interval_ms: 300000
fetch_timeout_ms: 2500
popular_pairs:
  - from: "EUR"
    to: "CHF"
currency_names:
  EUR: "Euro"
  CHF: "Swiss Franc"
providers:
  exchange_rate_api:
    base_url: "http://example.com/latest"
data_path: "/tmp/quickcurrency"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.base_currency, "EUR");
        assert_eq!(config.cache_duration(), Duration::from_secs(60));
        assert_eq!(config.refresh_interval(), Duration::from_secs(300));
        assert_eq!(config.fetch_timeout(), Duration::from_millis(2500));
        assert_eq!(config.popular_pairs, vec![CurrencyPair::new("EUR", "CHF")]);
        assert_eq!(config.currency_names.len(), 2);
        assert_eq!(config.api_base_url(), "http://example.com/latest");
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/tmp/quickcurrency")
        );
    }

    #[test]
    fn test_missing_provider_section_falls_back_to_default_url() {
        let config: AppConfig =
            serde_yaml::from_str("providers:\n  exchange_rate_api: null\n").unwrap();
        assert!(config.providers.exchange_rate_api.is_none());
        assert_eq!(config.api_base_url(), DEFAULT_API_URL);
    }

    #[test]
    fn test_load_from_path_reports_parse_errors() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "popular_pairs: 42").unwrap();

        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
