use thiserror::Error;

/// Errors emitted while transforming a raw partition.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Core(#[from] payflow_core::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl TransformError {
    pub fn is_missing_input(&self) -> bool {
        matches!(self, TransformError::Core(payflow_core::Error::MissingInput(_)))
    }
}
