use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("warehouse query failed: {0}")]
    Store(#[from] sqlx::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DashboardResult<T> = std::result::Result<T, DashboardError>;
