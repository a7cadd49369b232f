use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use fake::Fake;
use fake::faker::number::en::NumberWithFormat;
use rand::Rng;
use tracing::{info, warn};

use payflow_core::{
    Artifact, CustomerDim, PartitionLayout, ReferenceData, TransactionFact, read_rows, write_rows,
};

use crate::errors::GenerationError;
use crate::model::{CustomerDimensionReport, CustomerOptions};
use crate::seed::customer_rng;

/// `CUST-` followed by six digits, the first non-zero.
const CUSTOMER_ID_FORMAT: &str = "CUST-^#####";

/// Derives synthetic customer attributes, seeded by customer key.
pub struct CustomerDimensionBuilder<'a> {
    reference: &'a dyn ReferenceData,
    options: CustomerOptions,
}

impl<'a> CustomerDimensionBuilder<'a> {
    pub fn new(
        reference: &'a dyn ReferenceData,
        options: CustomerOptions,
    ) -> Result<Self, GenerationError> {
        if reference.segments().is_empty() || reference.geographies().is_empty() {
            return Err(GenerationError::InvalidOptions(
                "segments and geographies must not be empty".to_string(),
            ));
        }
        if options.signup_window_days < 0 {
            return Err(GenerationError::InvalidOptions(
                "signup_window_days must not be negative".to_string(),
            ));
        }
        Ok(Self { reference, options })
    }

    /// Attributes for one customer. The same key always yields the same row.
    pub fn customer(&self, customer_key: i32) -> CustomerDim {
        let mut rng = customer_rng(self.options.seed, customer_key);

        let customer_id: String = NumberWithFormat(CUSTOMER_ID_FORMAT).fake_with_rng(&mut rng);
        let days_back = rng.random_range(0..=self.options.signup_window_days) as u64;
        let signup_date = self
            .options
            .signup_anchor
            .checked_sub_days(Days::new(days_back))
            .unwrap_or(NaiveDate::MIN);
        let segments = self.reference.segments();
        let segment = segments[rng.random_range(0..segments.len())].clone();
        let geographies = self.reference.geographies();
        let geography = &geographies[rng.random_range(0..geographies.len())];

        CustomerDim {
            customer_key,
            customer_id,
            signup_date,
            segment,
            city: Some(geography.city.clone()),
            state: Some(geography.state.clone()),
            region: Some(geography.region.clone()),
        }
    }

    /// One row per distinct customer key, in first-seen order.
    pub fn build(&self, facts: &[TransactionFact]) -> Vec<CustomerDim> {
        let mut seen = HashSet::new();
        facts
            .iter()
            .filter(|fact| seen.insert(fact.customer_key))
            .map(|fact| self.customer(fact.customer_key))
            .collect()
    }

    /// Read the cleaned partition for `date` and write `dim_customer.csv` beside it.
    pub fn write_partition(
        &self,
        layout: &PartitionLayout,
        date: NaiveDate,
    ) -> Result<CustomerDimensionReport, GenerationError> {
        let input = layout.artifact_path(Artifact::CleanedTransactions, date);
        info!(event = "customer_dimension_started", date = %date, input = %input.display());

        let facts: Vec<TransactionFact> = read_rows(&input)?;
        if facts.is_empty() {
            warn!(event = "customer_dimension_empty_input", date = %date, "cleaned partition has no rows");
        }

        let customers = self.build(&facts);
        let output = layout.artifact_path(Artifact::CustomerDimension, date);
        let written = write_rows(&output, &customers)?;

        info!(
            event = "customer_dimension_finished",
            date = %date,
            customers = written.rows,
            path = %written.path.display()
        );

        Ok(CustomerDimensionReport {
            process_date: date,
            source_rows: facts.len() as u64,
            customers: written.rows,
            path: written.path,
            bytes_written: written.bytes,
        })
    }
}
