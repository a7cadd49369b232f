use std::fmt;

use serde::{Deserialize, Serialize};

use payflow_core::{
    ChannelDim, DelayBucket, RawTransaction, ReferenceData, TransactionFact, TransactionStatus,
    date_from_key, round_to,
};

/// Why a raw row was dropped. Rules run in declaration order; the first
/// failing rule is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingTransactionId,
    NonPositiveAmount,
    UnknownStatus,
    NonPositiveProcessingTime,
    InvalidDateKey,
    MissingCustomerKey,
    UnknownChannel,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MissingTransactionId => "missing_transaction_id",
            RejectReason::NonPositiveAmount => "non_positive_amount",
            RejectReason::UnknownStatus => "unknown_status",
            RejectReason::NonPositiveProcessingTime => "non_positive_processing_time",
            RejectReason::InvalidDateKey => "invalid_date_key",
            RejectReason::MissingCustomerKey => "missing_customer_key",
            RejectReason::UnknownChannel => "unknown_channel",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A raw row that passed every validation rule, before derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTransaction {
    pub transaction_id: String,
    pub date_key: i32,
    pub customer_key: i32,
    pub amount: f64,
    pub status: TransactionStatus,
    pub processing_time: f64,
    pub channel: ChannelDim,
}

pub fn validate(
    raw: &RawTransaction,
    reference: &dyn ReferenceData,
) -> Result<ValidTransaction, RejectReason> {
    let transaction_id = raw
        .transaction_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(RejectReason::MissingTransactionId)?;

    let amount = raw
        .amount
        .filter(|amount| amount.is_finite() && *amount > 0.0)
        .ok_or(RejectReason::NonPositiveAmount)?;

    let status = raw
        .status
        .as_deref()
        .and_then(|status| status.parse::<TransactionStatus>().ok())
        .ok_or(RejectReason::UnknownStatus)?;

    let processing_time = raw
        .processing_time
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .ok_or(RejectReason::NonPositiveProcessingTime)?;

    let date_key = raw
        .date_key
        .filter(|key| date_from_key(*key).is_some())
        .ok_or(RejectReason::InvalidDateKey)?;

    let customer_key = raw.customer_key.ok_or(RejectReason::MissingCustomerKey)?;

    let channel = raw
        .channel_key
        .and_then(|key| reference.channel(key))
        .cloned()
        .ok_or(RejectReason::UnknownChannel)?;

    Ok(ValidTransaction {
        transaction_id: transaction_id.to_string(),
        date_key,
        customer_key,
        amount,
        status,
        processing_time,
        channel,
    })
}

/// Fee revenue in currency units, rounded to cents.
pub fn revenue(amount: f64, fee_percent: f64) -> f64 {
    round_to(amount * fee_percent / 100.0, 2)
}

/// Attach the surrogate key and the derived columns.
pub fn derive(valid: ValidTransaction, transaction_sk: i64) -> TransactionFact {
    let revenue = revenue(valid.amount, valid.channel.fee_percent);
    TransactionFact {
        transaction_sk,
        transaction_id: valid.transaction_id,
        date_key: valid.date_key,
        customer_key: valid.customer_key,
        channel_key: valid.channel.channel_key,
        channel_name: valid.channel.channel_name,
        fee_percent: valid.channel.fee_percent,
        amount: valid.amount,
        status: valid.status,
        processing_time: valid.processing_time,
        processing_delay_bucket: DelayBucket::from_seconds(valid.processing_time),
        revenue,
    }
}
