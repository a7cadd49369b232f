use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::reference::StaticReferenceData;
use crate::retry::RetryPolicy;

/// Environment variable holding the warehouse connection string.
pub const WAREHOUSE_URL_ENV: &str = "PAYFLOW_WAREHOUSE_URL";

/// Settings shared by every pipeline stage, read from an optional TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory holding `raw/`, `processed/`, `logs/` and `runs/`.
    pub base_dir: PathBuf,
    /// Seed for synthetic generation; combined with the process date.
    pub seed: u64,
    /// Number of synthetic transactions generated per day.
    pub records_per_day: usize,
    /// Customer keys are drawn from `1..=customer_key_max`.
    pub customer_key_max: i32,
    /// Signup dates fall in the window ending at this date.
    pub signup_anchor: NaiveDate,
    pub signup_window_days: i64,
    pub retry: RetrySettings,
    pub reference: StaticReferenceData,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data"),
            seed: 42,
            records_per_day: 500,
            customer_key_max: 1000,
            signup_anchor: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            signup_window_days: 5 * 365,
            retry: RetrySettings::default(),
            reference: StaticReferenceData::default(),
        }
    }
}

impl PipelineConfig {
    /// Load the config file at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.customer_key_max < 1 {
            return Err(Error::Configuration(
                "customer_key_max must be at least 1".to_string(),
            ));
        }
        if self.signup_window_days < 0 {
            return Err(Error::Configuration(
                "signup_window_days must not be negative".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        self.reference.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Serializable form of [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff: BackoffKind,
    /// Cap for exponential backoff; ignored for fixed delays.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            delay_ms: RetryPolicy::DEFAULT_DELAY.as_millis() as u64,
            backoff: BackoffKind::Fixed,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        let delay = Duration::from_millis(self.delay_ms);
        match self.backoff {
            BackoffKind::Fixed => RetryPolicy::fixed(self.max_attempts, delay),
            BackoffKind::Exponential => RetryPolicy::exponential(
                self.max_attempts,
                delay,
                Duration::from_millis(self.max_delay_ms),
            ),
        }
    }
}

/// Read the warehouse connection string from the process environment.
pub fn warehouse_url() -> Result<String> {
    warehouse_url_with(|key| std::env::var(key).ok())
}

/// Resolve the connection string through `lookup`; blank values count as absent.
pub fn warehouse_url_with(lookup: impl FnOnce(&str) -> Option<String>) -> Result<String> {
    lookup(WAREHOUSE_URL_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "{WAREHOUSE_URL_ENV} is not set; point it at the warehouse database"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;

    #[test]
    fn empty_file_yields_defaults() {
        let config = PipelineConfig::from_toml("").expect("empty config");
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn overrides_are_merged_with_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            base_dir = "/srv/payflow"
            records_per_day = 25

            [retry]
            max_attempts = 5
            delay_ms = 100
            backoff = "exponential"
            max_delay_ms = 1000
            "#,
        )
        .expect("parse config");

        assert_eq!(config.base_dir, PathBuf::from("/srv/payflow"));
        assert_eq!(config.records_per_day, 25);
        assert_eq!(config.seed, 42);
        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(
            policy.backoff(),
            Backoff::Exponential {
                base: Duration::from_millis(100),
                max: Duration::from_millis(1000),
            }
        );
    }

    #[test]
    fn invalid_reference_data_is_a_configuration_error() {
        let result = PipelineConfig::from_toml(
            r#"
            [reference]
            channels = []
            "#,
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn missing_explicit_file_is_a_configuration_error() {
        let path = std::env::temp_dir().join(format!("payflow_{}.toml", uuid::Uuid::new_v4()));
        assert!(matches!(
            PipelineConfig::load(Some(&path)),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn warehouse_url_must_be_present_and_non_blank() {
        assert!(matches!(
            warehouse_url_with(|_| None),
            Err(Error::Configuration(_))
        ));
        assert!(warehouse_url_with(|_| Some("   ".to_string())).is_err());
        assert_eq!(
            warehouse_url_with(|key| {
                assert_eq!(key, WAREHOUSE_URL_ENV);
                Some("postgres://localhost/dw".to_string())
            })
            .unwrap(),
            "postgres://localhost/dw"
        );
    }
}
