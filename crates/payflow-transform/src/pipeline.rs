use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use payflow_core::{
    Artifact, PartitionLayout, RawTransaction, ReferenceData, TransactionFact, read_records,
    write_rows,
};

use crate::errors::TransformError;
use crate::rules::{RejectReason, derive, validate};

/// Outcome of cleaning one raw partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformReport {
    pub initial_records: u64,
    pub duplicates_removed: u64,
    pub malformed_records: u64,
    pub rejected_by_rule: BTreeMap<String, u64>,
    pub final_records: u64,
}

impl TransformReport {
    pub fn rejected_total(&self) -> u64 {
        self.rejected_by_rule.values().sum()
    }

    fn record_rejection(&mut self, reason: RejectReason) {
        *self
            .rejected_by_rule
            .entry(reason.code().to_string())
            .or_insert(0) += 1;
    }
}

/// Cleaned rows together with the report that produced them.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub facts: Vec<TransactionFact>,
    pub report: TransformReport,
}

/// Hashable view of a parsed raw row. Floats compare by value, so `100` and
/// `100.0` in the CSV are the same row.
#[derive(Debug, PartialEq, Eq, Hash)]
struct RowKey {
    transaction_id: Option<String>,
    date_key: Option<i32>,
    customer_key: Option<i32>,
    channel_key: Option<i32>,
    amount: Option<u64>,
    status: Option<String>,
    processing_time: Option<u64>,
}

fn float_bits(value: Option<f64>) -> Option<u64> {
    // -0.0 == 0.0 but their bit patterns differ
    value.map(|v| if v == 0.0 { 0.0_f64.to_bits() } else { v.to_bits() })
}

impl RowKey {
    fn of(row: &RawTransaction) -> Self {
        Self {
            transaction_id: row.transaction_id.clone(),
            date_key: row.date_key,
            customer_key: row.customer_key,
            channel_key: row.channel_key,
            amount: float_bits(row.amount),
            status: row.status.clone(),
            processing_time: float_bits(row.processing_time),
        }
    }
}

/// Drop rows equal in every field to an earlier row. Returns the survivors in
/// input order and the number dropped.
pub fn dedup_exact(rows: Vec<RawTransaction>) -> (Vec<RawTransaction>, u64) {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut unique = Vec::with_capacity(rows.len());
    let mut dropped = 0;
    for row in rows {
        if seen.insert(RowKey::of(&row)) {
            unique.push(row);
        } else {
            dropped += 1;
        }
    }
    (unique, dropped)
}

/// Validates, cleans and enriches raw transactions.
pub struct Transformer<'a> {
    reference: &'a dyn ReferenceData,
}

impl<'a> Transformer<'a> {
    pub fn new(reference: &'a dyn ReferenceData) -> Self {
        Self { reference }
    }

    fn clean(&self, rows: Vec<RawTransaction>, report: &mut TransformReport) -> Vec<TransactionFact> {
        let mut facts = Vec::with_capacity(rows.len());
        for row in rows {
            match validate(&row, self.reference) {
                Ok(valid) => {
                    let transaction_sk = facts.len() as i64 + 1;
                    facts.push(derive(valid, transaction_sk));
                }
                Err(reason) => {
                    debug!(
                        event = "row_rejected",
                        reason = %reason,
                        transaction_id = row.transaction_id.as_deref().unwrap_or("")
                    );
                    report.record_rejection(reason);
                }
            }
        }
        report.final_records = facts.len() as u64;
        facts
    }

    /// Read `raw/.../transactions.csv` for `date`, clean it, and write
    /// `processed/.../cleaned_transactions.csv`.
    pub fn transform_partition(
        &self,
        layout: &PartitionLayout,
        date: NaiveDate,
    ) -> Result<TransformOutput, TransformError> {
        let start = Instant::now();
        let input = layout.artifact_path(Artifact::RawTransactions, date);
        info!(event = "transformation_started", date = %date, input = %input.display());

        let (headers, records) = read_records(&input)?;

        let mut report = TransformReport {
            initial_records: records.len() as u64,
            ..TransformReport::default()
        };
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            match record.deserialize::<RawTransaction>(Some(&headers)) {
                Ok(row) => rows.push(row),
                Err(err) => {
                    warn!(event = "row_malformed", error = %err);
                    report.malformed_records += 1;
                }
            }
        }

        let (rows, duplicates) = dedup_exact(rows);
        report.duplicates_removed = duplicates;
        let facts = self.clean(rows, &mut report);
        let output = layout.artifact_path(Artifact::CleanedTransactions, date);
        let written = write_rows(&output, &facts)?;

        info!(
            event = "transformation_finished",
            date = %date,
            initial_records = report.initial_records,
            final_records = report.final_records,
            duplicates_removed = report.duplicates_removed,
            rejected = report.rejected_total(),
            output = %written.path.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            "transformation successful"
        );

        Ok(TransformOutput { facts, report })
    }
}

#[cfg(test)]
mod tests {
    use payflow_core::StaticReferenceData;

    use super::*;

    fn raw(id: &str, amount: f64) -> RawTransaction {
        RawTransaction {
            transaction_id: Some(id.to_string()),
            date_key: Some(20250301),
            customer_key: Some(3),
            channel_key: Some(2),
            amount: Some(amount),
            status: Some("failed".to_string()),
            processing_time: Some(0.7),
        }
    }

    #[test]
    fn dedup_compares_parsed_values() {
        let (rows, dropped) = dedup_exact(vec![
            raw("A", 10.0),
            raw("A", 10.0),
            raw("B", 0.0),
            raw("B", -0.0),
            raw("C", 30.0),
        ]);
        assert_eq!(dropped, 2);
        let ids: Vec<&str> = rows
            .iter()
            .filter_map(|row| row.transaction_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn same_id_with_different_values_is_not_an_exact_duplicate() {
        let (rows, dropped) = dedup_exact(vec![raw("A", 10.0), raw("A", 11.0)]);
        assert_eq!(dropped, 0);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn clean_assigns_dense_keys_in_surviving_order() {
        let reference = StaticReferenceData::default();
        let transformer = Transformer::new(&reference);
        let mut report = TransformReport::default();

        let facts = transformer.clean(
            vec![raw("A", 10.0), raw("B", -1.0), raw("C", 30.0)],
            &mut report,
        );

        assert_eq!(report.rejected_by_rule.get("non_positive_amount"), Some(&1));
        assert_eq!(report.final_records, 2);
        let keys: Vec<(i64, &str)> = facts
            .iter()
            .map(|fact| (fact.transaction_sk, fact.transaction_id.as_str()))
            .collect();
        assert_eq!(keys, vec![(1, "A"), (2, "C")]);
        assert_eq!(facts[1].channel_name, "Debit Card");
        assert_eq!(facts[1].revenue, 0.3);
    }
}
