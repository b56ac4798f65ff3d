//! Sequencing rules for proforma and invoice numbers.
//!
//! Invoice numbers are issued in chronological sequence for tax-filing
//! purposes: a lower-numbered invoice must never carry a later paid date
//! than a higher-numbered one. Proforma numbers carry no chronology claim
//! and only need uniqueness and monotonic allocation.
//!
//! These functions are pure; each storage backend invokes them inside its
//! own atomic section so that allocation, validation, and commit form a
//! single critical section per sequence.

use chrono::NaiveDate;

use crate::error::InvoiceError;
use crate::models::NumberedPaid;

/// Named sequence a number is allocated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Proforma,
    Invoice,
}

impl SequenceKind {
    /// Advisory lock key serializing allocations in this sequence.
    pub fn lock_key(&self) -> i64 {
        match self {
            SequenceKind::Proforma => 0x1_96F0,
            SequenceKind::Invoice => 0x1_96F1,
        }
    }
}

/// Next number in a sequence given the maximum assigned so far.
///
/// Sequences start at 1; a failed attempt consumes nothing, so the same
/// candidate is produced again on the next call.
pub fn next_number(current_max: Option<i64>) -> i64 {
    current_max.unwrap_or(0) + 1
}

/// Display label for a final invoice number, e.g. "INV-005".
pub fn invoice_label(number: i64) -> String {
    format!("INV-{:03}", number)
}

/// Display label for a proforma number, e.g. "PF-012".
pub fn proforma_label(number: i64) -> String {
    format!("PF-{:03}", number)
}

/// Check that paying `candidate_number` on `paid_date` keeps number order
/// consistent with paid-date order against every numbered, paid invoice.
/// `numbered_paid` must be ordered by invoice number ascending.
///
/// The ordering is strict on numbers but non-strict on dates: several
/// invoices may share a paid date, but a lower number must never carry a
/// later date than a higher one. When several invoices offend, the one
/// that actually bounds the caller's date choice is reported: the
/// highest-numbered lower invoice paid after `paid_date`, or failing
/// that the lowest-numbered higher invoice paid before it.
pub fn check_payment_order(
    candidate_number: i64,
    paid_date: NaiveDate,
    numbered_paid: &[NumberedPaid],
) -> Result<(), InvoiceError> {
    let mut conflict: Option<NumberedPaid> = None;

    for existing in numbered_paid {
        if existing.invoice_number < candidate_number {
            if existing.paid_date > paid_date {
                conflict = Some(*existing);
            }
        } else if existing.invoice_number > candidate_number {
            if existing.paid_date < paid_date && conflict.is_none() {
                conflict = Some(*existing);
            }
        } else {
            // A freshly allocated candidate cannot collide; treat a stale
            // duplicate as a conflict rather than silently accepting it.
            conflict = Some(*existing);
            break;
        }
    }

    match conflict {
        Some(existing) => Err(InvoiceError::SequenceConflict {
            conflicting: invoice_label(existing.invoice_number),
            conflicting_date: existing.paid_date,
            attempted_date: paid_date,
        }),
        None => Ok(()),
    }
}
