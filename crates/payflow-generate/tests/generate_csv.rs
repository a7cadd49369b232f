use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use payflow_core::{
    Artifact, PartitionLayout, RawTransaction, RecordingSleeper, RetryPolicy, StaticReferenceData,
    read_rows,
};
use payflow_generate::{GenerateOptions, TransactionGenerator};

fn process_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 14).unwrap_or_default()
}

#[tokio::test]
async fn generate_is_deterministic() {
    let reference = StaticReferenceData::default();
    let options = GenerateOptions {
        records_per_day: 50,
        ..GenerateOptions::default()
    };
    let generator = TransactionGenerator::new(&reference, options).expect("generator");
    let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
    let sleeper = RecordingSleeper::new();

    let layout_a = PartitionLayout::new(temp_base_dir("run_a"));
    let layout_b = PartitionLayout::new(temp_base_dir("run_b"));

    let report_a = generator
        .write_partition(&layout_a, process_date(), &policy, &sleeper)
        .await
        .expect("run generation A");
    let report_b = generator
        .write_partition(&layout_b, process_date(), &policy, &sleeper)
        .await
        .expect("run generation B");

    let csv_a = fs::read_to_string(&report_a.path).expect("read transactions.csv A");
    let csv_b = fs::read_to_string(&report_b.path).expect("read transactions.csv B");
    assert_eq!(csv_a, csv_b, "transactions.csv should be deterministic");
    assert_eq!(report_a.attempts, 1);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn generate_writes_partitioned_raw_file() {
    let reference = StaticReferenceData::default();
    let options = GenerateOptions {
        records_per_day: 40,
        ..GenerateOptions::default()
    };
    let generator = TransactionGenerator::new(&reference, options).expect("generator");
    let layout = PartitionLayout::new(temp_base_dir("run_rows"));

    let report = generator
        .write_partition(&layout, process_date(), &RetryPolicy::default(), &RecordingSleeper::new())
        .await
        .expect("run generation");

    let expected = layout.artifact_path(Artifact::RawTransactions, process_date());
    assert_eq!(report.path, expected);
    assert!(expected.ends_with("raw/2025/04/14/transactions.csv"));
    assert_eq!(report.records, 40);
    assert!(report.bytes_written > 0);

    let header = fs::read_to_string(&expected)
        .expect("read raw file")
        .lines()
        .next()
        .map(str::to_string)
        .unwrap_or_default();
    assert_eq!(
        header,
        "transaction_id,date_key,customer_key,channel_key,amount,status,processing_time"
    );

    let rows: Vec<RawTransaction> = read_rows(&expected).expect("parse raw rows");
    assert_eq!(rows.len(), 40);
    assert!(rows.iter().all(|row| row.date_key == Some(20250414)));
}

fn temp_base_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("payflow_generate_{label}_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp base dir");
    dir
}
