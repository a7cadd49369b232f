use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use payflow_core::Retryable;

use crate::state::LoadState;

/// Errors raised while loading a partition into the warehouse.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The expected partition is absent; the upstream stage did not run.
    #[error("missing input partition: {}", .0.display())]
    MissingInput(PathBuf),
    /// The partition exists but holds no rows.
    #[error("partition for {process_date} contains no rows")]
    EmptyBatch { process_date: NaiveDate },
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Rows that can never load (e.g. an impossible date key).
    #[error("invalid batch: {0}")]
    InvalidBatch(String),
    /// Connection drop, lock timeout, or another transient store failure.
    #[error("warehouse error: {0}")]
    Store(String),
    /// Unexpected constraint failure reported by the store.
    #[error("integrity violation: {0}")]
    Integrity(String),
    /// Partition read failure (I/O or decoding).
    #[error("input error: {0}")]
    Input(payflow_core::Error),
    #[error("illegal load state transition {from:?} -> {to:?}")]
    IllegalTransition { from: LoadState, to: LoadState },
    #[error("load failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<LoadError>,
    },
}

impl Retryable for LoadError {
    fn is_retryable(&self) -> bool {
        match self {
            LoadError::Store(_) | LoadError::Integrity(_) => true,
            LoadError::Input(err) => err.is_retryable(),
            LoadError::MissingInput(_)
            | LoadError::EmptyBatch { .. }
            | LoadError::Configuration(_)
            | LoadError::InvalidBatch(_)
            | LoadError::IllegalTransition { .. }
            | LoadError::RetriesExhausted { .. } => false,
        }
    }
}

impl From<payflow_core::Error> for LoadError {
    fn from(value: payflow_core::Error) -> Self {
        match value {
            payflow_core::Error::MissingInput(path) => LoadError::MissingInput(path),
            payflow_core::Error::Configuration(message) => LoadError::Configuration(message),
            payflow_core::Error::InvalidValue(message) => LoadError::InvalidBatch(message),
            other => LoadError::Input(other),
        }
    }
}

impl From<sqlx::Error> for LoadError {
    fn from(value: sqlx::Error) -> Self {
        match &value {
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation() =>
            {
                LoadError::Integrity(db.to_string())
            }
            _ => LoadError::Store(value.to_string()),
        }
    }
}

/// Convenience alias for loader results.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_and_input_failures_are_retried() {
        assert!(LoadError::Store("connection reset".into()).is_retryable());
        assert!(LoadError::Integrity("duplicate key".into()).is_retryable());
        assert!(
            LoadError::Input(payflow_core::Error::Io(std::io::Error::other("disk"))).is_retryable()
        );

        assert!(!LoadError::MissingInput(PathBuf::from("x.csv")).is_retryable());
        assert!(!LoadError::Configuration("no url".into()).is_retryable());
        assert!(!LoadError::InvalidBatch("bad date".into()).is_retryable());
        assert!(
            !LoadError::EmptyBatch {
                process_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
            }
            .is_retryable()
        );
    }

    #[test]
    fn core_missing_input_keeps_its_meaning() {
        let err: LoadError = payflow_core::Error::MissingInput(PathBuf::from("p.csv")).into();
        assert!(matches!(err, LoadError::MissingInput(path) if path == PathBuf::from("p.csv")));
    }

    #[test]
    fn pool_timeouts_are_transient() {
        let err: LoadError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, LoadError::Store(_)));
    }
}
