use std::fmt;
use std::str::FromStr;

use crate::errors::{DashboardError, DashboardResult};
use crate::model::{Aggregates, DashboardView};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(DashboardError::InvalidQuery(format!(
                "unknown output format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        })
    }
}

pub fn render(view: &DashboardView, format: OutputFormat) -> DashboardResult<String> {
    match format {
        OutputFormat::Text => Ok(render_text(view)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(view)?),
    }
}

fn aggregate_columns(totals: &Aggregates) -> String {
    format!(
        "{:>8} {:>8} {:>7.2} {:>9.2} {:>14.2} {:>12.2}",
        totals.transactions,
        totals.failed,
        totals.failure_rate() * 100.0,
        totals.avg_processing_time(),
        totals.gross_volume,
        totals.fee_revenue
    )
}

pub fn render_text(view: &DashboardView) -> String {
    let mut out = String::new();
    let query = &view.query;
    out.push_str(&format!("payflow dashboard {} .. {}\n", query.start, query.end));

    let active = query.filters.active();
    if !active.is_empty() {
        let filters: Vec<String> = active
            .iter()
            .map(|(field, value)| format!("{}={value}", field.name()))
            .collect();
        out.push_str(&format!("filters: {}\n", filters.join(", ")));
    }

    let kpis = &view.kpis;
    out.push('\n');
    out.push_str(&format!("{:<22}{:>14}\n", "transactions", kpis.transactions));
    out.push_str(&format!(
        "{:<22}{:>14} ({:.2}%)\n",
        "failed",
        kpis.failed,
        kpis.failure_ratio * 100.0
    ));
    out.push_str(&format!("{:<22}{:>14.2}\n", "gross volume", kpis.gross_volume));
    out.push_str(&format!("{:<22}{:>14.2}\n", "fee revenue", kpis.fee_revenue));
    out.push_str(&format!(
        "{:<22}{:>13.2}s\n",
        "avg processing time", kpis.avg_processing_time
    ));

    out.push('\n');
    if view.daily.is_empty() {
        out.push_str("no transactions in range\n");
    } else {
        out.push_str(&format!(
            "{:<12}{:>8} {:>8} {:>7} {:>9} {:>14} {:>12} {:>12}\n",
            "day",
            "txns",
            "failed",
            "fail_%",
            "avg_proc",
            "gross_volume",
            "fee_revenue",
            format!("rev_avg_{}d", view.rolling_window)
        ));
        for (point, smoothed) in view.daily.iter().zip(&view.smoothed_revenue) {
            out.push_str(&format!(
                "{:<12}{} {:>12.2}\n",
                point.day.to_string(),
                aggregate_columns(&point.totals),
                smoothed
            ));
        }
    }

    if let Some(breakdown) = &view.breakdown {
        out.push('\n');
        out.push_str(&format!("breakdown by {}\n", breakdown.dimension));
        out.push_str(&format!(
            "{:<20}{:>8} {:>8} {:>7} {:>9} {:>14} {:>12}\n",
            "label", "txns", "failed", "fail_%", "avg_proc", "gross_volume", "fee_revenue"
        ));
        for row in &breakdown.rows {
            out.push_str(&format!(
                "{:<20}{}\n",
                row.label,
                aggregate_columns(&row.totals)
            ));
        }
    }

    out
}
