use std::cmp::Ordering;

use crate::model::{Aggregates, BreakdownRow, DailyPoint, Kpis};

pub fn compute_kpis(points: &[DailyPoint]) -> Kpis {
    let mut totals = Aggregates::default();
    for point in points {
        totals.add(&point.totals);
    }
    kpis_from(&totals)
}

pub fn kpis_from(totals: &Aggregates) -> Kpis {
    Kpis {
        transactions: totals.transactions,
        failed: totals.failed,
        gross_volume: totals.gross_volume,
        fee_revenue: totals.fee_revenue,
        failure_ratio: totals.failure_rate(),
        avg_processing_time: totals.avg_processing_time(),
    }
}

/// Trailing mean over at most `window` values ending at each position.
/// Leading positions average whatever is available; a zero window is treated
/// as one.
pub fn rolling_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (index, value) in values.iter().enumerate() {
        sum += value;
        if index >= window {
            sum -= values[index - window];
        }
        let count = (index + 1).min(window);
        out.push(sum / count as f64);
    }
    out
}

/// Highest fee revenue first; equal revenue orders by label.
pub fn top_n(mut rows: Vec<BreakdownRow>, n: usize) -> Vec<BreakdownRow> {
    rows.sort_by(|a, b| {
        b.totals
            .fee_revenue
            .partial_cmp(&a.totals.fee_revenue)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    rows.truncate(n);
    rows
}
