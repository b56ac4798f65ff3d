//! Domain models for the invoicing engine.

mod invoice;

pub use invoice::{CreateInvoice, Invoice, InvoiceStatus, ListInvoicesFilter, NumberedPaid};
