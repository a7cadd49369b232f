//! Core contracts and helpers for payflow.
//!
//! This crate defines the record types exchanged between pipeline stages, the
//! date-partitioned file layout, reference data, configuration, and the retry
//! policy shared by the generator and the warehouse loader.

pub mod atomic;
pub mod config;
pub mod date;
pub mod error;
pub mod model;
pub mod partition;
pub mod redaction;
pub mod reference;
pub mod retry;

pub use atomic::{write_atomic, write_bytes_atomic};
pub use config::{BackoffKind, PipelineConfig, RetrySettings, WAREHOUSE_URL_ENV, warehouse_url};
pub use date::{date_from_key, date_key, parse_process_date, previous_day, resolve_process_date};
pub use error::{Error, Result};
pub use model::{
    ChannelDim, CustomerDim, DateDim, DelayBucket, RawTransaction, TransactionFact,
    TransactionStatus, round_to,
};
pub use partition::{Artifact, PartitionLayout, WrittenPartition, Zone, read_records, read_rows, write_rows};
pub use redaction::{RedactedConnection, redact_connection_string};
pub use reference::{Geography, ReferenceData, StaticReferenceData};
pub use retry::{
    Backoff, RecordingSleeper, Retried, RetryFailure, RetryPolicy, Retryable, Sleeper,
    TokioSleeper,
};
