use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use chrono::NaiveDate;

use payflow_core::{ChannelDim, CustomerDim, DateDim, TransactionFact};

use crate::errors::{LoadError, LoadResult};

/// Keep the last occurrence of every key, in the order those last
/// occurrences appear. Returns the survivors and the number of rows dropped.
pub fn dedup_last_wins<T, K, F>(rows: Vec<T>, key: F) -> (Vec<T>, u64)
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let total = rows.len();
    let mut seen = HashSet::with_capacity(total);
    let mut kept: Vec<T> = rows
        .into_iter()
        .rev()
        .filter(|row| seen.insert(key(row)))
        .collect();
    kept.reverse();
    let dropped = (total - kept.len()) as u64;
    (kept, dropped)
}

/// Everything one load merges, derived from the partition files.
#[derive(Debug, Clone)]
pub struct LoadBatch {
    pub process_date: NaiveDate,
    pub dates: Vec<DateDim>,
    pub channels: Vec<ChannelDim>,
    /// `None` when no customer partition exists for the date.
    pub customers: Option<Vec<CustomerDim>>,
    pub facts: Vec<TransactionFact>,
    pub duplicate_facts: u64,
    pub duplicate_customers: u64,
}

impl LoadBatch {
    /// Collapse in-batch duplicates and derive the date and channel rows the
    /// facts reference.
    pub fn prepare(
        process_date: NaiveDate,
        facts: Vec<TransactionFact>,
        customers: Option<Vec<CustomerDim>>,
    ) -> LoadResult<Self> {
        if facts.is_empty() {
            return Err(LoadError::EmptyBatch { process_date });
        }

        let (facts, duplicate_facts) =
            dedup_last_wins(facts, |fact| fact.transaction_id.clone());

        let (customers, duplicate_customers) = match customers {
            Some(rows) if !rows.is_empty() => {
                let (rows, dropped) = dedup_last_wins(rows, |customer| customer.customer_key);
                (Some(rows), dropped)
            }
            _ => (None, 0),
        };

        let mut dates = BTreeMap::new();
        let mut channels = BTreeMap::new();
        for fact in &facts {
            if !dates.contains_key(&fact.date_key) {
                dates.insert(fact.date_key, DateDim::from_date_key(fact.date_key)?);
            }
            channels.insert(fact.channel_key, fact.channel());
        }

        Ok(Self {
            process_date,
            dates: dates.into_values().collect(),
            channels: channels.into_values().collect(),
            customers,
            facts,
            duplicate_facts,
            duplicate_customers,
        })
    }

    /// Customer keys referenced by facts but absent from this batch's
    /// customer rows. Such facts still load; the dimension is best effort.
    pub fn unmatched_customer_keys(&self) -> Vec<i32> {
        let known: HashSet<i32> = self
            .customers
            .iter()
            .flatten()
            .map(|customer| customer.customer_key)
            .collect();
        let mut missing: Vec<i32> = self
            .facts
            .iter()
            .map(|fact| fact.customer_key)
            .filter(|key| !known.contains(key))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        missing.sort_unstable();
        missing
    }
}

#[cfg(test)]
mod tests {
    use payflow_core::{DelayBucket, TransactionStatus};

    use super::*;

    fn fact(id: &str, date_key: i32, channel_key: i32, amount: f64) -> TransactionFact {
        TransactionFact {
            transaction_sk: 1,
            transaction_id: id.to_string(),
            date_key,
            customer_key: 5,
            channel_key,
            channel_name: format!("channel {channel_key}"),
            fee_percent: 1.0,
            amount,
            status: TransactionStatus::Success,
            processing_time: 1.0,
            processing_delay_bucket: DelayBucket::Medium,
            revenue: amount / 100.0,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 10).unwrap()
    }

    #[test]
    fn last_occurrence_wins() {
        let (rows, dropped) = dedup_last_wins(vec![("a", 1), ("b", 2), ("a", 3)], |row| row.0);
        assert_eq!(rows, vec![("b", 2), ("a", 3)]);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn prepare_derives_dimensions_from_facts() {
        let batch = LoadBatch::prepare(
            date(),
            vec![
                fact("A", 20250210, 2, 10.0),
                fact("B", 20250209, 1, 20.0),
                fact("A", 20250210, 2, 15.0),
            ],
            None,
        )
        .unwrap();

        assert_eq!(batch.facts.len(), 2);
        assert_eq!(batch.duplicate_facts, 1);
        assert_eq!(batch.facts[1].amount, 15.0);

        let date_keys: Vec<i32> = batch.dates.iter().map(|d| d.date_key).collect();
        assert_eq!(date_keys, vec![20250209, 20250210]);
        let channel_keys: Vec<i32> = batch.channels.iter().map(|c| c.channel_key).collect();
        assert_eq!(channel_keys, vec![1, 2]);
        assert_eq!(batch.unmatched_customer_keys(), vec![5]);
    }

    #[test]
    fn empty_facts_are_reported() {
        let err = LoadBatch::prepare(date(), Vec::new(), None).unwrap_err();
        assert!(matches!(err, LoadError::EmptyBatch { .. }));
    }

    #[test]
    fn impossible_date_key_is_invalid() {
        let err = LoadBatch::prepare(date(), vec![fact("A", 20251399, 1, 1.0)], None).unwrap_err();
        assert!(matches!(err, LoadError::InvalidBatch(_)));
    }

    #[test]
    fn empty_customer_partition_is_treated_as_absent() {
        let batch =
            LoadBatch::prepare(date(), vec![fact("A", 20250210, 1, 1.0)], Some(Vec::new())).unwrap();
        assert!(batch.customers.is_none());
    }
}
