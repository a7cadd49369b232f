use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use payflow_core::{ChannelDim, CustomerDim, DateDim, TransactionFact};

use crate::adapter::{MergeStats, Warehouse, WarehouseTransaction};
use crate::errors::LoadResult;

pub mod queries;
pub mod schema;

pub use schema::ensure_schema;

/// Warehouse backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresWarehouse {
    url: String,
    acquire_timeout: Duration,
}

impl PostgresWarehouse {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            acquire_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Open a dedicated single-connection pool.
    pub async fn connect(&self) -> LoadResult<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.url)
            .await?;
        Ok(pool)
    }

    /// Create the star schema if needed.
    pub async fn ensure_schema(&self) -> LoadResult<()> {
        let pool = self.connect().await?;
        let result = schema::ensure_schema(&pool).await;
        pool.close().await;
        result
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> LoadResult<Box<dyn WarehouseTransaction>> {
        let pool = self.connect().await?;
        let tx = pool.begin().await?;
        Ok(Box::new(PostgresTransaction { pool, tx }))
    }
}

struct PostgresTransaction {
    pool: PgPool,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl WarehouseTransaction for PostgresTransaction {
    async fn merge_dates(&mut self, rows: &[DateDim]) -> LoadResult<MergeStats> {
        queries::merge_dates(&mut *self.tx, rows).await
    }

    async fn merge_channels(&mut self, rows: &[ChannelDim]) -> LoadResult<MergeStats> {
        queries::merge_channels(&mut *self.tx, rows).await
    }

    async fn merge_customers(&mut self, rows: &[CustomerDim]) -> LoadResult<MergeStats> {
        queries::merge_customers(&mut *self.tx, rows).await
    }

    async fn merge_facts(&mut self, rows: &[TransactionFact]) -> LoadResult<MergeStats> {
        queries::merge_facts(&mut *self.tx, rows).await
    }

    async fn commit(self: Box<Self>) -> LoadResult<()> {
        let PostgresTransaction { pool, tx } = *self;
        let result = tx.commit().await;
        pool.close().await;
        result.map_err(Into::into)
    }

    async fn rollback(self: Box<Self>) -> LoadResult<()> {
        let PostgresTransaction { pool, tx } = *self;
        let result = tx.rollback().await;
        pool.close().await;
        result.map_err(Into::into)
    }
}
