//! Read-only reporting over the payflow warehouse.

pub mod errors;
pub mod metrics;
pub mod model;
pub mod query;
pub mod render;
pub mod source;

use tracing::info;

pub use errors::{DashboardError, DashboardResult};
pub use metrics::{compute_kpis, kpis_from, rolling_average, top_n};
pub use model::{Aggregates, Breakdown, BreakdownRow, DailyPoint, DashboardView, Kpis};
pub use query::{
    DashboardFilters, DashboardQuery, Dimension, FilterField, breakdown_query, daily_series_query,
};
pub use render::{OutputFormat, render, render_text};
pub use source::{DashboardSource, PostgresSource, SnapshotSource};

/// Presentation options applied after the queries run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOptions {
    pub rolling_window: usize,
    pub breakdown: Option<Dimension>,
    pub top_n: usize,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            rolling_window: 7,
            breakdown: Some(Dimension::Channel),
            top_n: 5,
        }
    }
}

/// Run the dashboard queries and derive KPIs, smoothing and top-N.
pub async fn build_view(
    source: &dyn DashboardSource,
    query: &DashboardQuery,
    options: ViewOptions,
) -> DashboardResult<DashboardView> {
    let daily = source.daily_series(query).await?;
    let kpis = compute_kpis(&daily);
    let revenue: Vec<f64> = daily.iter().map(|point| point.totals.fee_revenue).collect();
    let smoothed_revenue = rolling_average(&revenue, options.rolling_window);

    let breakdown = match options.breakdown {
        Some(dimension) => {
            let rows = source.breakdown(query, dimension).await?;
            Some(Breakdown {
                dimension,
                rows: top_n(rows, options.top_n),
            })
        }
        None => None,
    };

    info!(
        event = "dashboard_built",
        start = %query.start,
        end = %query.end,
        days = daily.len(),
        transactions = kpis.transactions
    );

    Ok(DashboardView {
        query: query.clone(),
        kpis,
        daily,
        rolling_window: options.rolling_window.max(1),
        smoothed_revenue,
        breakdown,
    })
}
