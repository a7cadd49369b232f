use std::time::Instant;

use chrono::NaiveDate;
use rand::Rng;
use tracing::info;

use payflow_core::{
    Artifact, PartitionLayout, RawTransaction, ReferenceData, RetryPolicy, Sleeper,
    TransactionStatus, date_key, round_to, write_rows,
};

use crate::errors::GenerationError;
use crate::model::{GenerateOptions, GenerationReport};
use crate::seed::day_rng;

const AMOUNT_MIN: f64 = 10.0;
const AMOUNT_MAX: f64 = 1000.0;
const PROCESSING_MIN_SECS: f64 = 0.5;
const PROCESSING_MAX_SECS: f64 = 5.0;

/// Produces a day's batch of synthetic raw transactions.
pub struct TransactionGenerator<'a> {
    reference: &'a dyn ReferenceData,
    options: GenerateOptions,
}

impl<'a> TransactionGenerator<'a> {
    pub fn new(
        reference: &'a dyn ReferenceData,
        options: GenerateOptions,
    ) -> Result<Self, GenerationError> {
        if reference.channels().is_empty() {
            return Err(GenerationError::InvalidOptions(
                "at least one channel is required".to_string(),
            ));
        }
        if options.customer_key_max < 1 {
            return Err(GenerationError::InvalidOptions(
                "customer_key_max must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&options.success_rate) {
            return Err(GenerationError::InvalidOptions(format!(
                "success_rate {} is outside [0, 1]",
                options.success_rate
            )));
        }
        Ok(Self { reference, options })
    }

    /// Deterministic for a given seed and date.
    pub fn generate(&self, date: NaiveDate) -> Vec<RawTransaction> {
        let mut rng = day_rng(self.options.seed, date);
        let key = date_key(date);
        let channels = self.reference.channels();

        (0..self.options.records_per_day)
            .map(|index| {
                let customer_key = rng.random_range(1..=self.options.customer_key_max);
                let channel = &channels[rng.random_range(0..channels.len())];
                let amount = round_to(rng.random_range(AMOUNT_MIN..AMOUNT_MAX), 2);
                let status = if rng.random_bool(self.options.success_rate) {
                    TransactionStatus::Success
                } else {
                    TransactionStatus::Failed
                };
                let processing_time = round_to(
                    rng.random_range(PROCESSING_MIN_SECS..=PROCESSING_MAX_SECS),
                    2,
                );

                RawTransaction {
                    transaction_id: Some(format!("T{key}{index:05}")),
                    date_key: Some(key),
                    customer_key: Some(customer_key),
                    channel_key: Some(channel.channel_key),
                    amount: Some(amount),
                    status: Some(status.as_str().to_string()),
                    processing_time: Some(processing_time),
                }
            })
            .collect()
    }

    /// Generate and write `raw/YYYY/MM/DD/transactions.csv`, retrying I/O failures.
    pub async fn write_partition(
        &self,
        layout: &PartitionLayout,
        date: NaiveDate,
        policy: &RetryPolicy,
        sleeper: &dyn Sleeper,
    ) -> Result<GenerationReport, GenerationError> {
        let start = Instant::now();
        info!(event = "generation_started", date = %date, records = self.options.records_per_day);

        let generator = self;
        let outcome = policy
            .run(sleeper, move |attempt| async move {
                info!(event = "generation_attempt", date = %date, attempt);
                let rows = generator.generate(date);
                let path = layout.artifact_path(Artifact::RawTransactions, date);
                write_rows(&path, &rows).map_err(GenerationError::from)
            })
            .await;

        let retried = outcome.map_err(|failure| {
            if failure.exhausted {
                GenerationError::RetriesExhausted {
                    attempts: failure.attempts,
                    source: Box::new(failure.error),
                }
            } else {
                failure.error
            }
        })?;

        let written = retried.value;
        let report = GenerationReport {
            process_date: date,
            records: written.rows,
            path: written.path,
            bytes_written: written.bytes,
            attempts: retried.attempts,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            event = "generation_finished",
            date = %date,
            records = report.records,
            attempts = report.attempts,
            path = %report.path.display(),
            "ingestion successful"
        );
        Ok(report)
    }
}
