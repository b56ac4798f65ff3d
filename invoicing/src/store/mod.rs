//! Storage backends for the invoicing engine.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::Database;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::InvoiceError;
use crate::models::{CreateInvoice, Invoice, ListInvoicesFilter};

/// Persistence contract for invoices and their number sequences.
///
/// Each numbering operation (read the current maximum, validate, commit the
/// transition) must execute as one atomic unit per sequence: two concurrent
/// allocations must never observe the same maximum, and a rejected
/// validation must leave no trace. How that atomicity is achieved is up to
/// the backend.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Create a new draft invoice. No numbers are assigned.
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, InvoiceError>;

    /// Fetch an invoice by id.
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, InvoiceError>;

    /// List invoices ordered by invoice number (unnumbered last, then by
    /// creation time).
    async fn list_invoices(
        &self,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, InvoiceError>;

    /// Assign the next proforma number to a draft invoice, one-time.
    ///
    /// Fails with `AlreadyAssigned` when a number is already present; the
    /// stored number is never changed.
    async fn allocate_proforma_number(&self, invoice_id: Uuid) -> Result<Invoice, InvoiceError>;

    /// Mark a draft or proforma invoice as sent. No number side effect.
    async fn send_invoice(&self, invoice_id: Uuid) -> Result<Invoice, InvoiceError>;

    /// Assign the next invoice number and the given paid date, gated by the
    /// chronology check against all numbered, paid invoices.
    ///
    /// On `SequenceConflict` nothing is committed and no number is
    /// consumed; the next attempt allocates the same candidate.
    async fn mark_paid(
        &self,
        invoice_id: Uuid,
        paid_date: NaiveDate,
        payment_method: Option<String>,
        payment_notes: Option<String>,
    ) -> Result<Invoice, InvoiceError>;

    /// Delete a draft invoice. Returns false when no draft was deleted.
    async fn delete_draft(&self, invoice_id: Uuid) -> Result<bool, InvoiceError>;
}
