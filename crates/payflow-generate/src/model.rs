use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use payflow_core::PipelineConfig;

/// Options for the synthetic transaction generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub seed: u64,
    pub records_per_day: usize,
    pub customer_key_max: i32,
    /// Probability that a generated transaction succeeds.
    pub success_rate: f64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl GenerateOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            seed: config.seed,
            records_per_day: config.records_per_day,
            customer_key_max: config.customer_key_max,
            success_rate: 0.9,
        }
    }
}

/// Options for deriving customer attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerOptions {
    pub seed: u64,
    pub signup_anchor: NaiveDate,
    pub signup_window_days: i64,
}

impl Default for CustomerOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl CustomerOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            seed: config.seed,
            signup_anchor: config.signup_anchor,
            signup_window_days: config.signup_window_days,
        }
    }
}

/// Summary of a generated raw partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub process_date: NaiveDate,
    pub records: u64,
    pub path: PathBuf,
    pub bytes_written: u64,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Summary of a written customer dimension partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDimensionReport {
    pub process_date: NaiveDate,
    pub source_rows: u64,
    pub customers: u64,
    pub path: PathBuf,
    pub bytes_written: u64,
}
