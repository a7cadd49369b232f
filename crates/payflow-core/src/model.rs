use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::date::date_from_key;
use crate::error::{Error, Result};

/// Outcome of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Success,
    Failed,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 2] = [TransactionStatus::Success, TransactionStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(Error::InvalidValue(format!("unknown status '{other}'"))),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse processing latency class derived from `processing_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayBucket {
    Fast,
    Medium,
    Slow,
}

impl DelayBucket {
    /// Upper bound (exclusive) of the `fast` bucket, in seconds.
    pub const FAST_BELOW: f64 = 1.0;
    /// Upper bound (exclusive) of the `medium` bucket, in seconds.
    pub const MEDIUM_BELOW: f64 = 3.0;

    pub fn from_seconds(seconds: f64) -> Self {
        if seconds < Self::FAST_BELOW {
            DelayBucket::Fast
        } else if seconds < Self::MEDIUM_BELOW {
            DelayBucket::Medium
        } else {
            DelayBucket::Slow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DelayBucket::Fast => "fast",
            DelayBucket::Medium => "medium",
            DelayBucket::Slow => "slow",
        }
    }
}

impl FromStr for DelayBucket {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "fast" => Ok(DelayBucket::Fast),
            "medium" => Ok(DelayBucket::Medium),
            "slow" => Ok(DelayBucket::Slow),
            other => Err(Error::InvalidValue(format!("unknown delay bucket '{other}'"))),
        }
    }
}

impl fmt::Display for DelayBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as written by the generator.
///
/// Raw input is untrusted: every field is optional and unparsable values are
/// read as `None` so the transformer can reject the row instead of failing the
/// whole partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub transaction_id: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub date_key: Option<i32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub customer_key: Option<i32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub channel_key: Option<i32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub processing_time: Option<f64>,
}

/// A cleaned and enriched transaction, as loaded into `fact_transactions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionFact {
    /// Dense, partition-local surrogate key assigned by the transformer.
    pub transaction_sk: i64,
    pub transaction_id: String,
    pub date_key: i32,
    pub customer_key: i32,
    pub channel_key: i32,
    pub channel_name: String,
    pub fee_percent: f64,
    pub amount: f64,
    pub status: TransactionStatus,
    pub processing_time: f64,
    pub processing_delay_bucket: DelayBucket,
    pub revenue: f64,
}

impl TransactionFact {
    /// Channel attributes carried by this fact row.
    pub fn channel(&self) -> ChannelDim {
        ChannelDim {
            channel_key: self.channel_key,
            channel_name: self.channel_name.clone(),
            fee_percent: self.fee_percent,
        }
    }
}

/// Payment channel reference row (`dim_channel`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelDim {
    pub channel_key: i32,
    pub channel_name: String,
    pub fee_percent: f64,
}

/// Calendar row (`dim_date`), derived entirely from its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateDim {
    pub date_key: i32,
    pub full_date: NaiveDate,
    pub day: i16,
    pub month: i16,
    pub quarter: i16,
    pub year: i16,
    /// `true` Monday through Friday.
    pub weekday_flag: bool,
}

impl DateDim {
    pub fn from_date_key(date_key: i32) -> Result<Self> {
        let full_date = date_from_key(date_key)
            .ok_or_else(|| Error::InvalidValue(format!("invalid date_key {date_key}")))?;
        let month = full_date.month() as i16;
        Ok(Self {
            date_key,
            full_date,
            day: full_date.day() as i16,
            month,
            quarter: (month - 1) / 3 + 1,
            year: full_date.year() as i16,
            weekday_flag: !matches!(full_date.weekday(), Weekday::Sat | Weekday::Sun),
        })
    }
}

/// Customer descriptive attributes (`dim_customer`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDim {
    pub customer_key: i32,
    pub customer_id: String,
    pub signup_date: NaiveDate,
    pub segment: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}
