use std::path::PathBuf;

use thiserror::Error;

/// Core error type shared across payflow crates.
#[derive(Debug, Error)]
pub enum Error {
    /// An expected partition file does not exist (the upstream stage did not run).
    #[error("missing input partition: {}", .0.display())]
    MissingInput(PathBuf),
    /// The pipeline configuration is absent or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A value could not be interpreted (dates, keys, enum labels).
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience alias for results returned by payflow crates.
pub type Result<T> = std::result::Result<T, Error>;
