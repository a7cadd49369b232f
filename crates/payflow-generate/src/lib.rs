//! Synthetic data stages for payflow.
//!
//! The transaction generator writes a day's raw partition; the customer
//! dimension builder derives `dim_customer` rows from a cleaned partition.
//! Both are deterministic for a given seed.

pub mod customers;
pub mod errors;
pub mod generator;
pub mod model;
pub mod seed;

pub use customers::CustomerDimensionBuilder;
pub use errors::GenerationError;
pub use generator::TransactionGenerator;
pub use model::{CustomerDimensionReport, CustomerOptions, GenerateOptions, GenerationReport};
