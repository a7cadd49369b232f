//! Idempotent, transactional loading of processed partitions into the
//! payflow star schema.
//!
//! A load reads the cleaned transaction partition (and the customer
//! partition when present), stages every table, and merges them in one
//! transaction: `dim_date`, `dim_channel`, `dim_customer`, then
//! `fact_transactions`. Re-running a load for the same date converges to the
//! same warehouse contents.

pub mod adapter;
pub mod errors;
pub mod loader;
pub mod memory;
pub mod postgres;
pub mod staging;
pub mod state;

pub use adapter::{MergeStats, MergeTable, Warehouse, WarehouseTransaction};
pub use errors::{LoadError, LoadResult};
pub use loader::{LoadOutcome, LoadReport, MergeSummary, WarehouseLoader};
pub use memory::{Clock, MemoryWarehouse, StoredCustomer, StoredFact, WarehouseSnapshot};
pub use postgres::PostgresWarehouse;
pub use staging::{LoadBatch, dedup_last_wins};
pub use state::{LoadState, LoadStateMachine};
