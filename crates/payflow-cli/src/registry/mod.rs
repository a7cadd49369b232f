mod logging;
mod run;

pub use logging::init_stage_logging;
pub use run::{RunManifest, RunStatus, digest_file, write_manifest};

use thiserror::Error;

/// Errors raised while writing logs and run manifests.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("write failed: {0}")]
    Storage(#[from] payflow_core::Error),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
