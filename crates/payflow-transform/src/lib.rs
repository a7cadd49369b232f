//! Raw-to-cleaned transformation stage.

pub mod errors;
pub mod pipeline;
pub mod rules;

pub use errors::TransformError;
pub use pipeline::{TransformOutput, TransformReport, Transformer, dedup_exact};
pub use rules::{RejectReason, ValidTransaction, derive, revenue, validate};
