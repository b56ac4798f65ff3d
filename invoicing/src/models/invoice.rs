//! Invoice model for the invoicing engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Proforma,
    Sent,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Proforma => "proforma",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
        }
    }
}

/// Invoice document.
///
/// Both number columns are assigned at most once, each from its own
/// sequence: `proforma_number` when the draft becomes a proforma,
/// `invoice_number` together with `paid_date` when the invoice is paid.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub customer_name: String,
    pub currency: String,
    pub total_amount: Decimal,
    pub status: String,
    pub proforma_number: Option<i64>,
    pub invoice_number: Option<i64>,
    pub paid_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub payment_notes: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub sent_utc: Option<DateTime<Utc>>,
    pub paid_utc: Option<DateTime<Utc>>,
}

/// Number/date projection of a paid invoice, used by the chronology check.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct NumberedPaid {
    pub invoice_number: i64,
    pub paid_date: NaiveDate,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub paid_from: Option<NaiveDate>,
    pub paid_to: Option<NaiveDate>,
    pub page_size: i32,
}

/// Input for creating a draft invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub customer_name: String,
    pub currency: String,
    pub total_amount: Decimal,
    pub notes: Option<String>,
}
