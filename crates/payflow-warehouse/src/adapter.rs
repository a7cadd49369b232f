use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use payflow_core::{ChannelDim, CustomerDim, DateDim, TransactionFact};

use crate::errors::LoadResult;

/// Warehouse tables touched by a load, in merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeTable {
    DimDate,
    DimChannel,
    DimCustomer,
    FactTransactions,
}

impl MergeTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            MergeTable::DimDate => "dim_date",
            MergeTable::DimChannel => "dim_channel",
            MergeTable::DimCustomer => "dim_customer",
            MergeTable::FactTransactions => "fact_transactions",
        }
    }
}

impl fmt::Display for MergeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Row counts produced by one staged merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

impl MergeStats {
    /// Build stats from the number of staged rows and the insert flag of
    /// every row the merge actually wrote.
    pub fn from_written(staged: usize, written: &[bool]) -> Self {
        let inserted = written.iter().filter(|inserted| **inserted).count() as u64;
        let updated = written.len() as u64 - inserted;
        Self {
            inserted,
            updated,
            unchanged: (staged as u64).saturating_sub(inserted + updated),
        }
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }
}

/// A warehouse the loader can merge partitions into.
///
/// Every call to [`Warehouse::begin`] opens a fresh connection so a retry
/// never reuses a connection that failed mid-transaction.
#[async_trait]
pub trait Warehouse: Send + Sync {
    fn engine(&self) -> &'static str;

    async fn begin(&self) -> LoadResult<Box<dyn WarehouseTransaction>>;
}

/// One open transaction. Nothing is visible to readers until `commit`.
#[async_trait]
pub trait WarehouseTransaction: Send {
    /// Unconditional upsert keyed by `date_key`.
    async fn merge_dates(&mut self, rows: &[DateDim]) -> LoadResult<MergeStats>;

    /// Upsert keyed by `channel_key`; only rows whose name or fee changed are rewritten.
    async fn merge_channels(&mut self, rows: &[ChannelDim]) -> LoadResult<MergeStats>;

    /// Upsert keyed by `customer_key`; the update timestamp moves only on change.
    async fn merge_customers(&mut self, rows: &[CustomerDim]) -> LoadResult<MergeStats>;

    /// Upsert keyed by `transaction_id`; only amount, status, processing time,
    /// delay bucket and revenue are compared and rewritten.
    async fn merge_facts(&mut self, rows: &[TransactionFact]) -> LoadResult<MergeStats>;

    async fn commit(self: Box<Self>) -> LoadResult<()>;

    async fn rollback(self: Box<Self>) -> LoadResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_split_written_rows() {
        let stats = MergeStats::from_written(5, &[true, false, true]);
        assert_eq!(
            stats,
            MergeStats {
                inserted: 2,
                updated: 1,
                unchanged: 2
            }
        );
        assert_eq!(stats.total(), 5);
    }
}
