use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use payflow_core::TransactionStatus;
use payflow_warehouse::{StoredFact, WarehouseSnapshot};

use crate::errors::DashboardResult;
use crate::model::{Aggregates, BreakdownRow, DailyPoint};
use crate::query::{
    DashboardQuery, Dimension, FilterField, UNKNOWN_LABEL, breakdown_query, daily_series_query,
};

/// Read-only access to warehouse aggregates.
#[async_trait]
pub trait DashboardSource: Send + Sync {
    async fn daily_series(&self, query: &DashboardQuery) -> DashboardResult<Vec<DailyPoint>>;

    async fn breakdown(
        &self,
        query: &DashboardQuery,
        dimension: Dimension,
    ) -> DashboardResult<Vec<BreakdownRow>>;
}

#[derive(Debug, Clone)]
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> DashboardResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DashboardSource for PostgresSource {
    async fn daily_series(&self, query: &DashboardQuery) -> DashboardResult<Vec<DailyPoint>> {
        let mut builder = daily_series_query(query);
        debug!(event = "dashboard_query", kind = "daily_series", sql = builder.sql());
        let rows = builder
            .build_query_as::<DailyPoint>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn breakdown(
        &self,
        query: &DashboardQuery,
        dimension: Dimension,
    ) -> DashboardResult<Vec<BreakdownRow>> {
        let mut builder = breakdown_query(query, dimension);
        debug!(event = "dashboard_query", kind = "breakdown", dimension = %dimension, sql = builder.sql());
        let rows = builder
            .build_query_as::<BreakdownRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Aggregates a committed [`WarehouseSnapshot`] with the same join and
/// filter rules as the SQL queries.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    snapshot: WarehouseSnapshot,
}

impl SnapshotSource {
    pub fn new(snapshot: WarehouseSnapshot) -> Self {
        Self { snapshot }
    }

    /// Matching facts with their calendar date.
    fn matching<'a>(
        &'a self,
        query: &'a DashboardQuery,
    ) -> impl Iterator<Item = (NaiveDate, &'a StoredFact)> + 'a {
        self.snapshot.facts.values().filter_map(move |fact| {
            let date = self.snapshot.dates.get(&fact.date_key)?.full_date;
            if !query.contains(date) {
                return None;
            }
            let channel = self.snapshot.channels.get(&fact.channel_key)?;
            let customer = self.snapshot.customers.get(&fact.customer_key);
            for (field, value) in query.filters.active() {
                let actual = match field {
                    FilterField::Channel => Some(channel.channel_name.as_str()),
                    FilterField::Segment => customer.map(|c| c.row.segment.as_str()),
                    FilterField::City => customer.and_then(|c| c.row.city.as_deref()),
                    FilterField::State => customer.and_then(|c| c.row.state.as_deref()),
                    FilterField::Region => customer.and_then(|c| c.row.region.as_deref()),
                };
                if actual != Some(value) {
                    return None;
                }
            }
            Some((date, fact))
        })
    }

    fn label(&self, fact: &StoredFact, dimension: Dimension) -> String {
        let customer = self.snapshot.customers.get(&fact.customer_key).map(|c| &c.row);
        let label = match dimension {
            Dimension::Channel => self
                .snapshot
                .channels
                .get(&fact.channel_key)
                .map(|channel| channel.channel_name.as_str()),
            Dimension::Segment => customer.map(|c| c.segment.as_str()),
            Dimension::Region => customer.and_then(|c| c.region.as_deref()),
            Dimension::State => customer.and_then(|c| c.state.as_deref()),
            Dimension::City => customer.and_then(|c| c.city.as_deref()),
        };
        label.unwrap_or(UNKNOWN_LABEL).to_string()
    }
}

fn accumulate(totals: &mut Aggregates, fact: &StoredFact) {
    totals.transactions += 1;
    totals.processing_time_sum += fact.processing_time;
    match fact.status {
        TransactionStatus::Success => {
            totals.gross_volume += fact.amount;
            totals.fee_revenue += fact.revenue;
        }
        TransactionStatus::Failed => totals.failed += 1,
    }
}

#[async_trait]
impl DashboardSource for SnapshotSource {
    async fn daily_series(&self, query: &DashboardQuery) -> DashboardResult<Vec<DailyPoint>> {
        let mut days: BTreeMap<NaiveDate, Aggregates> = BTreeMap::new();
        for (date, fact) in self.matching(query) {
            accumulate(days.entry(date).or_default(), fact);
        }
        Ok(days
            .into_iter()
            .map(|(day, totals)| DailyPoint { day, totals })
            .collect())
    }

    async fn breakdown(
        &self,
        query: &DashboardQuery,
        dimension: Dimension,
    ) -> DashboardResult<Vec<BreakdownRow>> {
        let mut groups: BTreeMap<String, Aggregates> = BTreeMap::new();
        for (_, fact) in self.matching(query) {
            accumulate(groups.entry(self.label(fact, dimension)).or_default(), fact);
        }
        Ok(groups
            .into_iter()
            .map(|(label, totals)| BreakdownRow { label, totals })
            .collect())
    }
}
