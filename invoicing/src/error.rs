//! Error taxonomy for the invoicing engine.

use chrono::NaiveDate;
use ops_core::error::AppError;
use thiserror::Error;

/// Failures surfaced to the calling request handler as values, never
/// panics. `SequenceConflict` is terminal for the attempt: retrying with
/// the same paid date reproduces the same conflict.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("Invoice not found")]
    NotFound,

    #[error("Invoice already has proforma number {0}")]
    AlreadyAssigned(String),

    #[error("Invoice is already paid as {0}")]
    AlreadyPaid(String),

    #[error("{conflicting} was paid on {conflicting_date}; a paid date of {attempted_date} would break the invoice number sequence")]
    SequenceConflict {
        conflicting: String,
        conflicting_date: NaiveDate,
        attempted_date: NaiveDate,
    },

    #[error("Invoice is {actual}, expected {expected}")]
    InvalidStatus {
        expected: &'static str,
        actual: String,
    },

    #[error(transparent)]
    App(#[from] AppError),
}
