//! Shared helpers for invoicing integration tests.

use chrono::NaiveDate;
use invoicing::models::{CreateInvoice, Invoice};
use invoicing::store::{InvoiceStore, MemoryStore};
use rust_decimal::Decimal;

/// Create a draft invoice with placeholder billing details.
pub async fn create_draft(store: &MemoryStore, customer_name: &str) -> Invoice {
    store
        .create_invoice(&CreateInvoice {
            customer_name: customer_name.to_string(),
            currency: "USD".to_string(),
            total_amount: Decimal::new(150_00, 2),
            notes: None,
        })
        .await
        .expect("Failed to create invoice")
}

/// Create a draft and move it to `sent`, ready for payment.
pub async fn create_payable(store: &MemoryStore, customer_name: &str) -> Invoice {
    let invoice = create_draft(store, customer_name).await;
    store
        .send_invoice(invoice.invoice_id)
        .await
        .expect("Failed to send invoice")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("invalid date")
}
