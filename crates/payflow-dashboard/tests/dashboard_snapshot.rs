use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use payflow_core::{
    Artifact, CustomerDim, DelayBucket, PartitionLayout, RecordingSleeper, RetryPolicy,
    TransactionFact, TransactionStatus, write_rows,
};
use payflow_dashboard::{
    DashboardFilters, DashboardQuery, Dimension, OutputFormat, SnapshotSource, ViewOptions,
    build_view, render,
};
use payflow_warehouse::{LoadOutcome, MemoryWarehouse, WarehouseLoader};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).expect("valid date")
}

fn fact(
    id: &str,
    date_key: i32,
    customer_key: i32,
    channel: (i32, &str, f64),
    amount: f64,
    status: TransactionStatus,
) -> TransactionFact {
    TransactionFact {
        transaction_sk: 1,
        transaction_id: id.to_string(),
        date_key,
        customer_key,
        channel_key: channel.0,
        channel_name: channel.1.to_string(),
        fee_percent: channel.2,
        amount,
        status,
        processing_time: 2.0,
        processing_delay_bucket: DelayBucket::Medium,
        revenue: amount * channel.2 / 100.0,
    }
}

fn customer(key: i32, segment: &str, city: &str, region: &str) -> CustomerDim {
    CustomerDim {
        customer_key: key,
        customer_id: format!("CUST-{key:05}"),
        signup_date: day(1),
        segment: segment.to_string(),
        city: Some(city.to_string()),
        state: None,
        region: Some(region.to_string()),
    }
}

fn temp_base_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("payflow_dashboard_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp base dir");
    dir
}

async fn loaded_warehouse() -> MemoryWarehouse {
    let credit = (1, "Credit Card", 2.5);
    let upi = (3, "UPI", 0.5);
    let layout = PartitionLayout::new(temp_base_dir());
    write_rows(
        &layout.artifact_path(Artifact::CleanedTransactions, day(1)),
        &[
            fact("A", 20250301, 1, credit, 100.0, TransactionStatus::Success),
            fact("B", 20250301, 2, upi, 40.0, TransactionStatus::Failed),
            fact("C", 20250302, 3, upi, 200.0, TransactionStatus::Success),
        ],
    )
    .expect("write facts");
    write_rows(
        &layout.artifact_path(Artifact::CustomerDimension, day(1)),
        &[
            customer(1, "Retail", "Pune", "West"),
            customer(2, "SMB", "Delhi", "North"),
        ],
    )
    .expect("write customers");

    let warehouse = MemoryWarehouse::new();
    let sleeper = RecordingSleeper::new();
    let loader = WarehouseLoader::new(&warehouse, &layout, RetryPolicy::default(), &sleeper);
    let outcome = loader.load(day(1)).await.expect("load partition");
    assert!(matches!(outcome, LoadOutcome::Committed(_)));
    warehouse
}

#[tokio::test]
async fn view_aggregates_loaded_facts() {
    let source = SnapshotSource::new(loaded_warehouse().await.snapshot());
    let query = DashboardQuery::new(day(1), day(2)).expect("query");
    let options = ViewOptions {
        rolling_window: 2,
        breakdown: Some(Dimension::Channel),
        top_n: 5,
    };
    let view = build_view(&source, &query, options).await.expect("view");

    assert_eq!(view.daily.len(), 2);
    assert_eq!(view.daily[0].day, day(1));
    assert_eq!(view.daily[0].totals.transactions, 2);
    assert_eq!(view.daily[0].totals.failed, 1);
    assert_eq!(view.daily[0].totals.gross_volume, 100.0);
    assert_eq!(view.daily[1].totals.fee_revenue, 1.0);

    assert_eq!(view.kpis.transactions, 3);
    assert_eq!(view.kpis.gross_volume, 300.0);
    assert_eq!(view.kpis.fee_revenue, 3.5);
    assert!((view.kpis.failure_ratio - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(view.kpis.avg_processing_time, 2.0);
    assert_eq!(view.smoothed_revenue, vec![2.5, 1.75]);

    let breakdown = view.breakdown.as_ref().expect("breakdown");
    let labels: Vec<&str> = breakdown.rows.iter().map(|row| row.label.as_str()).collect();
    assert_eq!(labels, vec!["Credit Card", "UPI"]);
    assert_eq!(breakdown.rows[1].totals.transactions, 2);
    assert_eq!(breakdown.rows[0].totals.failure_rate(), 0.0);
    assert_eq!(breakdown.rows[1].totals.failure_rate(), 0.5);
    assert_eq!(view.daily[0].totals.failure_rate(), 0.5);
    assert_eq!(view.daily[1].totals.avg_processing_time(), 2.0);

    let json: serde_json::Value =
        serde_json::from_str(&render(&view, OutputFormat::Json).expect("render json"))
            .expect("parse json");
    assert_eq!(json["breakdown"]["rows"][1]["failure_rate"], 0.5);

    let text = render(&view, OutputFormat::Text).expect("render");
    assert!(text.contains("breakdown by channel"));
}

#[tokio::test]
async fn customer_filters_and_unknown_labels() {
    let source = SnapshotSource::new(loaded_warehouse().await.snapshot());
    let query = DashboardQuery::new(day(1), day(2)).expect("query");

    let by_region = build_view(
        &source,
        &query,
        ViewOptions {
            rolling_window: 7,
            breakdown: Some(Dimension::Region),
            top_n: 2,
        },
    )
    .await
    .expect("region view");
    let labels: Vec<&str> = by_region
        .breakdown
        .as_ref()
        .expect("breakdown")
        .rows
        .iter()
        .map(|row| row.label.as_str())
        .collect();
    assert_eq!(labels, vec!["West", "Unknown"]);

    let west = query.clone().with_filters(DashboardFilters {
        region: Some("West".to_string()),
        ..DashboardFilters::default()
    });
    let view = build_view(&source, &west, ViewOptions::default())
        .await
        .expect("filtered view");
    assert_eq!(view.kpis.transactions, 1);
    assert_eq!(view.kpis.fee_revenue, 2.5);

    let upi = query.with_filters(DashboardFilters {
        channel: Some("UPI".to_string()),
        ..DashboardFilters::default()
    });
    let view = build_view(&source, &upi, ViewOptions::default())
        .await
        .expect("channel view");
    assert_eq!(view.kpis.transactions, 2);
    assert_eq!(view.kpis.failed, 1);
}

#[tokio::test]
async fn empty_range_renders_without_rows() {
    let source = SnapshotSource::new(loaded_warehouse().await.snapshot());
    let query = DashboardQuery::new(day(20), day(25)).expect("query");
    let view = build_view(&source, &query, ViewOptions::default())
        .await
        .expect("view");

    assert!(view.daily.is_empty());
    assert_eq!(view.kpis.failure_ratio, 0.0);
    let text = render(&view, OutputFormat::Text).expect("render");
    assert!(text.contains("no transactions in range"));
}
