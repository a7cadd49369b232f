#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use payflow_core::{
    Artifact, ChannelDim, CustomerDim, DateDim, DelayBucket, PartitionLayout, TransactionFact,
    TransactionStatus, round_to, write_rows,
};
use payflow_warehouse::{
    Clock, LoadError, LoadResult, MemoryWarehouse, MergeStats, Warehouse, WarehouseTransaction,
};

pub fn process_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date")
}

/// Clock that advances one second per reading.
pub fn ticking_clock() -> Clock {
    let start = Utc
        .with_ymd_and_hms(2025, 3, 2, 6, 0, 0)
        .single()
        .expect("valid start instant");
    let ticks = Arc::new(AtomicI64::new(0));
    Arc::new(move || start + chrono::Duration::seconds(ticks.fetch_add(1, Ordering::SeqCst)))
}

pub fn temp_layout(label: &str) -> PartitionLayout {
    let mut dir = std::env::temp_dir();
    dir.push(format!("payflow_warehouse_{label}_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp base dir");
    PartitionLayout::new(dir)
}

pub fn fact(id: &str, customer_key: i32, amount: f64) -> TransactionFact {
    TransactionFact {
        transaction_sk: 1,
        transaction_id: id.to_string(),
        date_key: 20250301,
        customer_key,
        channel_key: 1,
        channel_name: "Credit Card".to_string(),
        fee_percent: 2.5,
        amount,
        status: TransactionStatus::Success,
        processing_time: 1.2,
        processing_delay_bucket: DelayBucket::Medium,
        revenue: round_to(amount * 2.5 / 100.0, 2),
    }
}

pub fn customer(key: i32, segment: &str) -> CustomerDim {
    CustomerDim {
        customer_key: key,
        customer_id: format!("CUST-{key:05}"),
        signup_date: NaiveDate::from_ymd_opt(2023, 6, 1).expect("valid date"),
        segment: segment.to_string(),
        city: Some("Pune".to_string()),
        state: Some("Maharashtra".to_string()),
        region: Some("West".to_string()),
    }
}

pub fn write_facts(layout: &PartitionLayout, rows: &[TransactionFact]) -> PathBuf {
    let path = layout.artifact_path(Artifact::CleanedTransactions, process_date());
    write_rows(&path, rows).expect("write cleaned partition");
    path
}

pub fn write_customers(layout: &PartitionLayout, rows: &[CustomerDim]) -> PathBuf {
    let path = layout.artifact_path(Artifact::CustomerDimension, process_date());
    write_rows(&path, rows).expect("write customer partition");
    path
}

/// Wraps a [`MemoryWarehouse`] and injects failures.
pub struct FaultyWarehouse {
    pub inner: MemoryWarehouse,
    begin_failures: AtomicU32,
    fail_facts: bool,
}

impl FaultyWarehouse {
    /// The first `failures` connections drop before the transaction starts.
    pub fn failing_begin(inner: MemoryWarehouse, failures: u32) -> Self {
        Self {
            inner,
            begin_failures: AtomicU32::new(failures),
            fail_facts: false,
        }
    }

    /// Every fact merge fails after the dimensions were merged.
    pub fn failing_facts(inner: MemoryWarehouse) -> Self {
        Self {
            inner,
            begin_failures: AtomicU32::new(0),
            fail_facts: true,
        }
    }
}

#[async_trait]
impl Warehouse for FaultyWarehouse {
    fn engine(&self) -> &'static str {
        "faulty"
    }

    async fn begin(&self) -> LoadResult<Box<dyn WarehouseTransaction>> {
        let tx = self.inner.begin().await?;
        let remaining = self.begin_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.begin_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(LoadError::Store("connection reset by peer".to_string()));
        }
        if self.fail_facts {
            return Ok(Box::new(FailingFacts { inner: tx }));
        }
        Ok(tx)
    }
}

struct FailingFacts {
    inner: Box<dyn WarehouseTransaction>,
}

#[async_trait]
impl WarehouseTransaction for FailingFacts {
    async fn merge_dates(&mut self, rows: &[DateDim]) -> LoadResult<MergeStats> {
        self.inner.merge_dates(rows).await
    }

    async fn merge_channels(&mut self, rows: &[ChannelDim]) -> LoadResult<MergeStats> {
        self.inner.merge_channels(rows).await
    }

    async fn merge_customers(&mut self, rows: &[CustomerDim]) -> LoadResult<MergeStats> {
        self.inner.merge_customers(rows).await
    }

    async fn merge_facts(&mut self, _rows: &[TransactionFact]) -> LoadResult<MergeStats> {
        Err(LoadError::Store("lock timeout".to_string()))
    }

    async fn commit(self: Box<Self>) -> LoadResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> LoadResult<()> {
        self.inner.rollback().await
    }
}
