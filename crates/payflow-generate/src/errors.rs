use thiserror::Error;

use payflow_core::Retryable;

/// Errors emitted by the generator and the customer dimension builder.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Core(#[from] payflow_core::Error),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("generation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<GenerationError>,
    },
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Core(err) => err.is_retryable(),
            GenerationError::InvalidOptions(_) | GenerationError::RetriesExhausted { .. } => false,
        }
    }
}
