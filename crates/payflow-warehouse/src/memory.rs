//! In-process warehouse with the same merge semantics as the Postgres backend.
//!
//! A transaction works on a private copy of the tables and swaps it in on
//! commit, so a rolled back or abandoned attempt leaves no trace.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use payflow_core::{
    ChannelDim, CustomerDim, DateDim, DelayBucket, TransactionFact, TransactionStatus,
};

use crate::adapter::{MergeStats, Warehouse, WarehouseTransaction};
use crate::errors::{LoadError, LoadResult};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCustomer {
    pub row: CustomerDim,
    pub updated_at: DateTime<Utc>,
}

/// A `fact_transactions` row as the warehouse keeps it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFact {
    pub transaction_id: String,
    pub date_key: i32,
    pub customer_key: i32,
    pub channel_key: i32,
    pub amount: f64,
    pub status: TransactionStatus,
    pub processing_time: f64,
    pub processing_delay_bucket: DelayBucket,
    pub revenue: f64,
    pub loaded_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredFact {
    fn new(fact: &TransactionFact, now: DateTime<Utc>) -> Self {
        Self {
            transaction_id: fact.transaction_id.clone(),
            date_key: fact.date_key,
            customer_key: fact.customer_key,
            channel_key: fact.channel_key,
            amount: fact.amount,
            status: fact.status,
            processing_time: fact.processing_time,
            processing_delay_bucket: fact.processing_delay_bucket,
            revenue: fact.revenue,
            loaded_at: now,
            updated_at: None,
        }
    }

    fn tracked_differs(&self, fact: &TransactionFact) -> bool {
        self.amount != fact.amount
            || self.status != fact.status
            || self.processing_time != fact.processing_time
            || self.processing_delay_bucket != fact.processing_delay_bucket
            || self.revenue != fact.revenue
    }

    fn apply_tracked(&mut self, fact: &TransactionFact, now: DateTime<Utc>) {
        self.amount = fact.amount;
        self.status = fact.status;
        self.processing_time = fact.processing_time;
        self.processing_delay_bucket = fact.processing_delay_bucket;
        self.revenue = fact.revenue;
        self.updated_at = Some(now);
    }
}

/// Committed contents of a [`MemoryWarehouse`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarehouseSnapshot {
    pub dates: BTreeMap<i32, DateDim>,
    pub channels: BTreeMap<i32, ChannelDim>,
    pub customers: BTreeMap<i32, StoredCustomer>,
    pub facts: BTreeMap<String, StoredFact>,
}

/// Source of the audit timestamps stamped on written rows.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct MemoryWarehouse {
    committed: Arc<Mutex<WarehouseSnapshot>>,
    connections: Arc<AtomicU32>,
    clock: Clock,
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }
}

impl fmt::Debug for MemoryWarehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryWarehouse")
            .field("connections", &self.connections_opened())
            .finish_non_exhaustive()
    }
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            committed: Arc::default(),
            connections: Arc::default(),
            clock,
        }
    }

    pub fn snapshot(&self) -> WarehouseSnapshot {
        match self.committed.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of transactions ever opened, one per connection.
    pub fn connections_opened(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn engine(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> LoadResult<Box<dyn WarehouseTransaction>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            committed: Arc::clone(&self.committed),
            working: self.snapshot(),
            clock: Arc::clone(&self.clock),
        }))
    }
}

struct MemoryTransaction {
    committed: Arc<Mutex<WarehouseSnapshot>>,
    working: WarehouseSnapshot,
    clock: Clock,
}

#[async_trait]
impl WarehouseTransaction for MemoryTransaction {
    async fn merge_dates(&mut self, rows: &[DateDim]) -> LoadResult<MergeStats> {
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            let previous = self.working.dates.insert(row.date_key, row.clone());
            written.push(previous.is_none());
        }
        Ok(MergeStats::from_written(rows.len(), &written))
    }

    async fn merge_channels(&mut self, rows: &[ChannelDim]) -> LoadResult<MergeStats> {
        let mut written = Vec::new();
        for row in rows {
            match self.working.channels.get_mut(&row.channel_key) {
                None => {
                    self.working.channels.insert(row.channel_key, row.clone());
                    written.push(true);
                }
                Some(existing) if existing != row => {
                    *existing = row.clone();
                    written.push(false);
                }
                Some(_) => {}
            }
        }
        Ok(MergeStats::from_written(rows.len(), &written))
    }

    async fn merge_customers(&mut self, rows: &[CustomerDim]) -> LoadResult<MergeStats> {
        let now = (self.clock)();
        let mut written = Vec::new();
        for row in rows {
            match self.working.customers.get_mut(&row.customer_key) {
                None => {
                    self.working.customers.insert(
                        row.customer_key,
                        StoredCustomer {
                            row: row.clone(),
                            updated_at: now,
                        },
                    );
                    written.push(true);
                }
                Some(existing) if existing.row != *row => {
                    existing.row = row.clone();
                    existing.updated_at = now;
                    written.push(false);
                }
                Some(_) => {}
            }
        }
        Ok(MergeStats::from_written(rows.len(), &written))
    }

    async fn merge_facts(&mut self, rows: &[TransactionFact]) -> LoadResult<MergeStats> {
        let now = (self.clock)();
        let mut written = Vec::new();
        for row in rows {
            if !self.working.dates.contains_key(&row.date_key) {
                return Err(LoadError::Integrity(format!(
                    "fact {} references unknown date_key {}",
                    row.transaction_id, row.date_key
                )));
            }
            if !self.working.channels.contains_key(&row.channel_key) {
                return Err(LoadError::Integrity(format!(
                    "fact {} references unknown channel_key {}",
                    row.transaction_id, row.channel_key
                )));
            }

            match self.working.facts.get_mut(&row.transaction_id) {
                None => {
                    self.working
                        .facts
                        .insert(row.transaction_id.clone(), StoredFact::new(row, now));
                    written.push(true);
                }
                Some(existing) if existing.tracked_differs(row) => {
                    existing.apply_tracked(row, now);
                    written.push(false);
                }
                Some(_) => {}
            }
        }
        Ok(MergeStats::from_written(rows.len(), &written))
    }

    async fn commit(self: Box<Self>) -> LoadResult<()> {
        let mut guard = self
            .committed
            .lock()
            .map_err(|_| LoadError::Store("memory warehouse lock poisoned".to_string()))?;
        *guard = self.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LoadResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn channel(fee: f64) -> ChannelDim {
        ChannelDim {
            channel_key: 1,
            channel_name: "Credit Card".to_string(),
            fee_percent: fee,
        }
    }

    #[tokio::test]
    async fn uncommitted_work_is_invisible() {
        let warehouse = MemoryWarehouse::new();
        let mut tx = warehouse.begin().await.unwrap();
        tx.merge_channels(&[channel(2.5)]).await.unwrap();
        assert!(warehouse.snapshot().channels.is_empty());

        tx.rollback().await.unwrap();
        assert!(warehouse.snapshot().channels.is_empty());
        assert_eq!(warehouse.connections_opened(), 1);
    }

    #[tokio::test]
    async fn channel_merge_rewrites_only_changed_rows() {
        let warehouse = MemoryWarehouse::new();
        let mut tx = warehouse.begin().await.unwrap();
        let first = tx.merge_channels(&[channel(2.5)]).await.unwrap();
        let same = tx.merge_channels(&[channel(2.5)]).await.unwrap();
        let changed = tx.merge_channels(&[channel(3.0)]).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.inserted, 1);
        assert_eq!(same.unchanged, 1);
        assert_eq!(changed.updated, 1);
        assert_eq!(warehouse.snapshot().channels[&1].fee_percent, 3.0);
    }

    #[tokio::test]
    async fn facts_require_their_dimensions() {
        let warehouse = MemoryWarehouse::new();
        let mut tx = warehouse.begin().await.unwrap();
        let fact = TransactionFact {
            transaction_sk: 1,
            transaction_id: "T1".to_string(),
            date_key: 20250101,
            customer_key: 1,
            channel_key: 1,
            channel_name: "Credit Card".to_string(),
            fee_percent: 2.5,
            amount: 10.0,
            status: TransactionStatus::Success,
            processing_time: 0.5,
            processing_delay_bucket: DelayBucket::Fast,
            revenue: 0.25,
        };
        let err = tx.merge_facts(&[fact]).await.unwrap_err();
        assert!(matches!(err, LoadError::Integrity(_)));

        let date = DateDim::from_date_key(20250101).unwrap();
        assert_eq!(date.full_date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }
}
