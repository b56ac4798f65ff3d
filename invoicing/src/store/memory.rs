//! In-memory storage backend for tests and embedding.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;

use ops_core::error::AppError;

use crate::error::InvoiceError;
use crate::models::{CreateInvoice, Invoice, ListInvoicesFilter, NumberedPaid};
use crate::services::sequencing;
use crate::store::InvoiceStore;

/// In-memory invoice store.
///
/// Every operation runs under a single write guard, which makes the
/// read-max / validate / commit sequence atomic without a database. Useful
/// for tests and for embedding the engine without PostgreSQL.
#[derive(Clone)]
pub struct MemoryStore {
    invoices: Arc<RwLock<HashMap<Uuid, Invoice>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            invoices: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, Invoice>>, InvoiceError> {
        self.invoices
            .write()
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Invoice lock poisoned: {}", e)).into()
            })
    }

    fn max_number(
        invoices: &HashMap<Uuid, Invoice>,
        number: impl Fn(&Invoice) -> Option<i64>,
    ) -> Option<i64> {
        invoices.values().filter_map(number).max()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, InvoiceError> {
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            customer_name: input.customer_name.clone(),
            currency: input.currency.clone(),
            total_amount: input.total_amount,
            status: "draft".to_string(),
            proforma_number: None,
            invoice_number: None,
            paid_date: None,
            payment_method: None,
            payment_notes: None,
            notes: input.notes.clone(),
            created_utc: Utc::now(),
            sent_utc: None,
            paid_utc: None,
        };

        let mut invoices = self.write()?;
        invoices.insert(invoice.invoice_id, invoice.clone());

        info!(invoice_id = %invoice.invoice_id, "Draft invoice created");

        Ok(invoice)
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, InvoiceError> {
        let invoices = self.invoices.read().map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Invoice lock poisoned: {}", e))
        })?;

        Ok(invoices.get(&invoice_id).cloned())
    }

    async fn list_invoices(
        &self,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, InvoiceError> {
        let invoices = self.invoices.read().map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Invoice lock poisoned: {}", e))
        })?;

        let limit = filter.page_size.clamp(1, 100) as usize;
        let status_str = filter.status.map(|s| s.as_str());

        let mut matching: Vec<Invoice> = invoices
            .values()
            .filter(|inv| status_str.is_none_or(|s| inv.status == s))
            .filter(|inv| {
                filter
                    .paid_from
                    .is_none_or(|from| inv.paid_date.is_some_and(|d| d >= from))
            })
            .filter(|inv| {
                filter
                    .paid_to
                    .is_none_or(|to| inv.paid_date.is_some_and(|d| d <= to))
            })
            .cloned()
            .collect();

        // Numbered invoices first in number order, the rest by creation time.
        matching.sort_by_key(|inv| (inv.invoice_number.unwrap_or(i64::MAX), inv.created_utc));
        matching.truncate(limit);

        Ok(matching)
    }

    async fn allocate_proforma_number(&self, invoice_id: Uuid) -> Result<Invoice, InvoiceError> {
        let mut invoices = self.write()?;

        let invoice = invoices.get(&invoice_id).ok_or(InvoiceError::NotFound)?;
        if let Some(existing) = invoice.proforma_number {
            return Err(InvoiceError::AlreadyAssigned(sequencing::proforma_label(
                existing,
            )));
        }
        if invoice.status != "draft" {
            return Err(InvoiceError::InvalidStatus {
                expected: "draft",
                actual: invoice.status.clone(),
            });
        }

        let next = sequencing::next_number(Self::max_number(&invoices, |inv| inv.proforma_number));

        let invoice = invoices
            .get_mut(&invoice_id)
            .ok_or(InvoiceError::NotFound)?;
        invoice.proforma_number = Some(next);
        invoice.status = "proforma".to_string();

        info!(invoice_id = %invoice_id, proforma_number = next, "Proforma number assigned");

        Ok(invoice.clone())
    }

    async fn send_invoice(&self, invoice_id: Uuid) -> Result<Invoice, InvoiceError> {
        let mut invoices = self.write()?;

        let invoice = invoices
            .get_mut(&invoice_id)
            .ok_or(InvoiceError::NotFound)?;
        if invoice.status != "draft" && invoice.status != "proforma" {
            return Err(InvoiceError::InvalidStatus {
                expected: "draft or proforma",
                actual: invoice.status.clone(),
            });
        }

        invoice.status = "sent".to_string();
        invoice.sent_utc = Some(Utc::now());

        info!(invoice_id = %invoice_id, "Invoice sent");

        Ok(invoice.clone())
    }

    async fn mark_paid(
        &self,
        invoice_id: Uuid,
        paid_date: NaiveDate,
        payment_method: Option<String>,
        payment_notes: Option<String>,
    ) -> Result<Invoice, InvoiceError> {
        let mut invoices = self.write()?;

        let invoice = invoices.get(&invoice_id).ok_or(InvoiceError::NotFound)?;
        if let Some(existing) = invoice.invoice_number {
            return Err(InvoiceError::AlreadyPaid(sequencing::invoice_label(existing)));
        }
        if invoice.status != "proforma" && invoice.status != "sent" {
            return Err(InvoiceError::InvalidStatus {
                expected: "proforma or sent",
                actual: invoice.status.clone(),
            });
        }

        let candidate =
            sequencing::next_number(Self::max_number(&invoices, |inv| inv.invoice_number));

        let mut numbered_paid: Vec<NumberedPaid> = invoices
            .values()
            .filter_map(|inv| {
                Some(NumberedPaid {
                    invoice_number: inv.invoice_number?,
                    paid_date: inv.paid_date?,
                })
            })
            .collect();
        numbered_paid.sort_by_key(|p| p.invoice_number);

        sequencing::check_payment_order(candidate, paid_date, &numbered_paid)?;

        let invoice = invoices
            .get_mut(&invoice_id)
            .ok_or(InvoiceError::NotFound)?;
        invoice.invoice_number = Some(candidate);
        invoice.paid_date = Some(paid_date);
        invoice.payment_method = payment_method;
        invoice.payment_notes = payment_notes;
        invoice.status = "paid".to_string();
        invoice.paid_utc = Some(Utc::now());

        info!(invoice_id = %invoice_id, invoice_number = candidate, "Invoice marked paid");

        Ok(invoice.clone())
    }

    async fn delete_draft(&self, invoice_id: Uuid) -> Result<bool, InvoiceError> {
        let mut invoices = self.write()?;

        match invoices.get(&invoice_id) {
            Some(inv) if inv.status == "draft" => {
                invoices.remove(&invoice_id);
                info!(invoice_id = %invoice_id, "Draft invoice deleted");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
