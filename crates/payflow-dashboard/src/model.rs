use chrono::NaiveDate;
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};

use crate::query::{DashboardQuery, Dimension};

/// Aggregates shared by the daily series and breakdowns. Serialized together
/// with the derived `failure_rate` and `avg_processing_time`.
#[derive(Debug, Clone, Copy, Default, PartialEq, sqlx::FromRow)]
pub struct Aggregates {
    pub transactions: i64,
    pub failed: i64,
    /// Sum of successful amounts.
    pub gross_volume: f64,
    /// Sum of successful fee revenue.
    pub fee_revenue: f64,
    pub processing_time_sum: f64,
}

impl Aggregates {
    pub fn add(&mut self, other: &Aggregates) {
        self.transactions += other.transactions;
        self.failed += other.failed;
        self.gross_volume += other.gross_volume;
        self.fee_revenue += other.fee_revenue;
        self.processing_time_sum += other.processing_time_sum;
    }

    /// `failed / transactions`, `0.0` when there are no transactions.
    pub fn failure_rate(&self) -> f64 {
        if self.transactions > 0 {
            self.failed as f64 / self.transactions as f64
        } else {
            0.0
        }
    }

    /// Mean processing time in seconds, `0.0` when there are no transactions.
    pub fn avg_processing_time(&self) -> f64 {
        if self.transactions > 0 {
            self.processing_time_sum / self.transactions as f64
        } else {
            0.0
        }
    }
}

impl Serialize for Aggregates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Aggregates", 7)?;
        state.serialize_field("transactions", &self.transactions)?;
        state.serialize_field("failed", &self.failed)?;
        state.serialize_field("gross_volume", &self.gross_volume)?;
        state.serialize_field("fee_revenue", &self.fee_revenue)?;
        state.serialize_field("processing_time_sum", &self.processing_time_sum)?;
        state.serialize_field("failure_rate", &self.failure_rate())?;
        state.serialize_field("avg_processing_time", &self.avg_processing_time())?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DailyPoint {
    pub day: NaiveDate,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub totals: Aggregates,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BreakdownRow {
    pub label: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub totals: Aggregates,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Kpis {
    pub transactions: i64,
    pub failed: i64,
    pub gross_volume: f64,
    pub fee_revenue: f64,
    /// `failed / transactions`, `0.0` when there are no transactions.
    pub failure_ratio: f64,
    /// Mean processing time in seconds, `0.0` when there are no transactions.
    pub avg_processing_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown {
    pub dimension: Dimension,
    pub rows: Vec<BreakdownRow>,
}

/// Everything the dashboard renders for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub query: DashboardQuery,
    pub kpis: Kpis,
    pub daily: Vec<DailyPoint>,
    pub rolling_window: usize,
    /// Trailing average of daily fee revenue, aligned with `daily`.
    pub smoothed_revenue: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Breakdown>,
}
