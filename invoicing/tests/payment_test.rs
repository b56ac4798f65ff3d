//! Payment chronology tests for the invoicing engine.

mod common;

use common::{create_draft, create_payable, date};
use invoicing::error::InvoiceError;
use invoicing::models::{InvoiceStatus, ListInvoicesFilter};
use invoicing::store::{InvoiceStore, MemoryStore};
use uuid::Uuid;

#[tokio::test]
async fn paying_with_no_prior_invoices_accepts_any_date() {
    let store = MemoryStore::new();
    let invoice = create_payable(&store, "First Payment Customer").await;

    let invoice = store
        .mark_paid(invoice.invoice_id, date(2019, 6, 15), None, None)
        .await
        .expect("Failed to mark paid");

    assert_eq!(invoice.invoice_number, Some(1));
    assert_eq!(invoice.paid_date, Some(date(2019, 6, 15)));
    assert_eq!(invoice.status, "paid");
}

#[tokio::test]
async fn equal_paid_dates_are_accepted() {
    let store = MemoryStore::new();
    let first = create_payable(&store, "Same Day Customer 1").await;
    let second = create_payable(&store, "Same Day Customer 2").await;

    store
        .mark_paid(first.invoice_id, date(2024, 3, 10), None, None)
        .await
        .expect("Failed to mark first paid");

    let second = store
        .mark_paid(second.invoice_id, date(2024, 3, 10), None, None)
        .await
        .expect("Failed to mark second paid");

    assert_eq!(second.invoice_number, Some(2));
    assert_eq!(second.paid_date, Some(date(2024, 3, 10)));
}

#[tokio::test]
async fn earlier_date_than_lower_numbered_invoice_is_rejected() {
    let store = MemoryStore::new();

    // Five invoices paid on ascending dates, numbered 1 through 5.
    for day in 6..=10 {
        let invoice = create_payable(&store, &format!("Backlog Customer {day}")).await;
        store
            .mark_paid(invoice.invoice_id, date(2024, 3, day), None, None)
            .await
            .expect("Failed to mark paid");
    }

    let late = create_payable(&store, "Backdated Customer").await;
    let err = store
        .mark_paid(late.invoice_id, date(2024, 3, 1), None, None)
        .await
        .unwrap_err();

    match &err {
        InvoiceError::SequenceConflict {
            conflicting,
            conflicting_date,
            attempted_date,
        } => {
            assert_eq!(conflicting, "INV-005");
            assert_eq!(*conflicting_date, date(2024, 3, 10));
            assert_eq!(*attempted_date, date(2024, 3, 1));
        }
        other => panic!("expected SequenceConflict, got {other:?}"),
    }

    // The message is actionable: it names the conflicting invoice and date.
    let message = err.to_string();
    assert!(message.contains("INV-005"), "message was: {message}");
    assert!(message.contains("2024-03-10"), "message was: {message}");

    // The failed attempt consumed nothing: the invoice is untouched and the
    // next attempt receives the same number.
    let stored = store
        .get_invoice(late.invoice_id)
        .await
        .expect("Failed to get invoice")
        .expect("Invoice missing");
    assert_eq!(stored.invoice_number, None);
    assert_eq!(stored.paid_date, None);
    assert_eq!(stored.status, "sent");

    let paid = store
        .mark_paid(late.invoice_id, date(2024, 3, 10), None, None)
        .await
        .expect("Failed to mark paid after conflict");
    assert_eq!(paid.invoice_number, Some(6));
}

#[tokio::test]
async fn paying_twice_returns_already_paid() {
    let store = MemoryStore::new();
    let invoice = create_payable(&store, "Double Payment Customer").await;

    store
        .mark_paid(invoice.invoice_id, date(2024, 3, 10), None, None)
        .await
        .expect("Failed to mark paid");

    let err = store
        .mark_paid(invoice.invoice_id, date(2024, 3, 11), None, None)
        .await
        .unwrap_err();
    match err {
        InvoiceError::AlreadyPaid(label) => assert_eq!(label, "INV-001"),
        other => panic!("expected AlreadyPaid, got {other:?}"),
    }
}

#[tokio::test]
async fn draft_invoices_cannot_be_paid() {
    let store = MemoryStore::new();
    let invoice = create_draft(&store, "Draft Payment Customer").await;

    let err = store
        .mark_paid(invoice.invoice_id, date(2024, 3, 10), None, None)
        .await
        .unwrap_err();
    match err {
        InvoiceError::InvalidStatus { expected, actual } => {
            assert_eq!(expected, "proforma or sent");
            assert_eq!(actual, "draft");
        }
        other => panic!("expected InvalidStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn paying_unknown_invoice_fails() {
    let store = MemoryStore::new();

    let err = store
        .mark_paid(Uuid::new_v4(), date(2024, 3, 10), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, InvoiceError::NotFound));
}

#[tokio::test]
async fn payment_details_are_recorded() {
    let store = MemoryStore::new();
    let invoice = create_payable(&store, "Detailed Payment Customer").await;

    let invoice = store
        .mark_paid(
            invoice.invoice_id,
            date(2024, 3, 10),
            Some("bank_transfer".to_string()),
            Some("wire ref 4711".to_string()),
        )
        .await
        .expect("Failed to mark paid");

    assert_eq!(invoice.payment_method.as_deref(), Some("bank_transfer"));
    assert_eq!(invoice.payment_notes.as_deref(), Some("wire ref 4711"));
    assert!(invoice.paid_utc.is_some());
}

#[tokio::test]
async fn number_and_date_order_stay_consistent() {
    let store = MemoryStore::new();

    // Mixed same-day and later payments; all legal.
    let days = [1, 3, 3, 5];
    for (i, day) in days.iter().enumerate() {
        let invoice = create_payable(&store, &format!("Ledger Customer {i}")).await;
        store
            .mark_paid(invoice.invoice_id, date(2024, 4, *day), None, None)
            .await
            .expect("Failed to mark paid");
    }

    let paid = store
        .list_invoices(&ListInvoicesFilter {
            status: Some(InvoiceStatus::Paid),
            page_size: 50,
            ..Default::default()
        })
        .await
        .expect("Failed to list invoices");

    assert_eq!(paid.len(), 4);
    let numbers: Vec<i64> = paid.iter().map(|inv| inv.invoice_number.unwrap()).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);

    // Lower number never carries a later paid date.
    for pair in paid.windows(2) {
        assert!(pair[0].paid_date.unwrap() <= pair[1].paid_date.unwrap());
    }
}
