use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use payflow_core::{
    Artifact, CustomerDim, PartitionLayout, Retried, RetryPolicy, Sleeper, TransactionFact,
    read_rows,
};

use crate::adapter::{MergeStats, MergeTable, Warehouse, WarehouseTransaction};
use crate::errors::{LoadError, LoadResult};
use crate::staging::LoadBatch;
use crate::state::{LoadState, LoadStateMachine};

/// Per-table results of one committed load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub dates: MergeStats,
    pub channels: MergeStats,
    pub customers: Option<MergeStats>,
    pub facts: MergeStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub process_date: NaiveDate,
    pub engine: &'static str,
    pub attempts: u32,
    pub state: LoadState,
    pub state_history: Vec<LoadState>,
    pub fact_rows: u64,
    pub duplicate_facts: u64,
    pub customer_rows: u64,
    pub duplicate_customers: u64,
    pub unmatched_customer_keys: u64,
    pub merged: MergeSummary,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Committed(LoadReport),
    /// The partition held no rows; nothing was written.
    Skipped {
        process_date: NaiveDate,
        reason: String,
    },
}

struct Applied {
    merged: MergeSummary,
    fact_rows: u64,
    duplicate_facts: u64,
    customer_rows: u64,
    duplicate_customers: u64,
    unmatched_customer_keys: u64,
}

/// Merges one day's processed partitions into a [`Warehouse`] inside a
/// single transaction, retrying transient failures under a [`RetryPolicy`].
pub struct WarehouseLoader<'a> {
    warehouse: &'a dyn Warehouse,
    layout: &'a PartitionLayout,
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> WarehouseLoader<'a> {
    pub fn new(
        warehouse: &'a dyn Warehouse,
        layout: &'a PartitionLayout,
        policy: RetryPolicy,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            warehouse,
            layout,
            policy,
            sleeper,
        }
    }

    pub async fn load(&self, date: NaiveDate) -> LoadResult<LoadOutcome> {
        let start = Instant::now();
        let machine = Mutex::new(LoadStateMachine::default());
        info!(
            event = "load_started",
            date = %date,
            engine = self.warehouse.engine(),
            max_attempts = self.policy.max_attempts()
        );

        let loader = self;
        let machine_ref = &machine;
        let result = self
            .policy
            .run(self.sleeper, move |attempt| async move {
                loader.attempt(machine_ref, date, attempt).await
            })
            .await;

        match result {
            Ok(Retried {
                value: applied,
                attempts,
            }) => {
                let machine = current(&machine);
                let report = LoadReport {
                    process_date: date,
                    engine: self.warehouse.engine(),
                    attempts,
                    state: machine.current(),
                    state_history: machine.history().to_vec(),
                    fact_rows: applied.fact_rows,
                    duplicate_facts: applied.duplicate_facts,
                    customer_rows: applied.customer_rows,
                    duplicate_customers: applied.duplicate_customers,
                    unmatched_customer_keys: applied.unmatched_customer_keys,
                    merged: applied.merged,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
                info!(
                    event = "load_committed",
                    date = %date,
                    attempts,
                    fact_rows = report.fact_rows,
                    facts_inserted = report.merged.facts.inserted,
                    facts_updated = report.merged.facts.updated,
                    facts_unchanged = report.merged.facts.unchanged,
                    duration_ms = report.duration_ms,
                    "load successful"
                );
                Ok(LoadOutcome::Committed(report))
            }
            Err(failure) => match failure.error {
                LoadError::EmptyBatch { process_date } => {
                    transition(&machine, LoadState::Skipped)?;
                    warn!(event = "load_skipped", date = %process_date, reason = "empty partition");
                    Ok(LoadOutcome::Skipped {
                        process_date,
                        reason: "partition contains no rows".to_string(),
                    })
                }
                err => {
                    if let Err(state_err) = transition(&machine, LoadState::Fatal) {
                        warn!(event = "load_state_error", error = %state_err);
                    }
                    error!(
                        event = "load_failed",
                        date = %date,
                        attempts = failure.attempts,
                        exhausted = failure.exhausted,
                        error = %err,
                        "load failed"
                    );
                    if failure.exhausted {
                        Err(LoadError::RetriesExhausted {
                            attempts: failure.attempts,
                            source: Box::new(err),
                        })
                    } else {
                        Err(err)
                    }
                }
            },
        }
    }

    async fn attempt(
        &self,
        machine: &Mutex<LoadStateMachine>,
        date: NaiveDate,
        attempt: u32,
    ) -> LoadResult<Applied> {
        if attempt > 1 {
            transition(machine, LoadState::Pending)?;
        }

        let batch = match self.read_batch(date) {
            Ok(batch) => batch,
            Err(err @ LoadError::EmptyBatch { .. }) => return Err(err),
            Err(err) => {
                transition(machine, LoadState::FailedAttempt)?;
                return Err(err);
            }
        };

        transition(machine, LoadState::Loading)?;
        debug!(
            event = "load_attempt",
            attempt,
            facts = batch.facts.len(),
            dates = batch.dates.len(),
            channels = batch.channels.len(),
            customers = batch.customers.as_ref().map_or(0, Vec::len)
        );

        match self.apply(&batch).await {
            Ok(merged) => {
                transition(machine, LoadState::Committed)?;
                Ok(Applied {
                    merged,
                    fact_rows: batch.facts.len() as u64,
                    duplicate_facts: batch.duplicate_facts,
                    customer_rows: batch.customers.as_ref().map_or(0, Vec::len) as u64,
                    duplicate_customers: batch.duplicate_customers,
                    unmatched_customer_keys: batch.unmatched_customer_keys().len() as u64,
                })
            }
            Err(err) => {
                transition(machine, LoadState::FailedAttempt)?;
                Err(err)
            }
        }
    }

    fn read_batch(&self, date: NaiveDate) -> LoadResult<LoadBatch> {
        let facts_path = self.layout.artifact_path(Artifact::CleanedTransactions, date);
        let facts: Vec<TransactionFact> = read_rows(&facts_path)?;

        let customers_path = self.layout.artifact_path(Artifact::CustomerDimension, date);
        let customers = if customers_path.exists() {
            Some(read_rows::<CustomerDim>(&customers_path)?)
        } else {
            warn!(
                event = "customer_partition_missing",
                date = %date,
                path = %customers_path.display()
            );
            None
        };

        let batch = LoadBatch::prepare(date, facts, customers)?;
        if batch.duplicate_facts > 0 {
            warn!(event = "duplicate_facts_collapsed", date = %date, dropped = batch.duplicate_facts);
        }
        Ok(batch)
    }

    async fn apply(&self, batch: &LoadBatch) -> LoadResult<MergeSummary> {
        let mut tx = self.warehouse.begin().await?;
        let merged = merge_all(&mut *tx, batch).await;
        match merged {
            Ok(summary) => {
                tx.commit().await?;
                Ok(summary)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(event = "rollback_failed", error = %rollback_err);
                }
                Err(err)
            }
        }
    }
}

async fn merge_all(
    tx: &mut dyn WarehouseTransaction,
    batch: &LoadBatch,
) -> LoadResult<MergeSummary> {
    let dates = tx.merge_dates(&batch.dates).await?;
    log_merge(MergeTable::DimDate, dates);

    let channels = tx.merge_channels(&batch.channels).await?;
    log_merge(MergeTable::DimChannel, channels);

    let customers = match &batch.customers {
        Some(rows) => {
            let stats = tx.merge_customers(rows).await?;
            log_merge(MergeTable::DimCustomer, stats);
            Some(stats)
        }
        None => None,
    };

    let facts = tx.merge_facts(&batch.facts).await?;
    log_merge(MergeTable::FactTransactions, facts);

    Ok(MergeSummary {
        dates,
        channels,
        customers,
        facts,
    })
}

fn log_merge(table: MergeTable, stats: MergeStats) {
    debug!(
        event = "table_merged",
        table = %table,
        inserted = stats.inserted,
        updated = stats.updated,
        unchanged = stats.unchanged
    );
}

fn transition(machine: &Mutex<LoadStateMachine>, next: LoadState) -> LoadResult<()> {
    machine
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .transition(next)
}

fn current(machine: &Mutex<LoadStateMachine>) -> LoadStateMachine {
    machine
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
