//! PostgreSQL storage backend for the invoicing engine.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use ops_core::config::DatabaseConfig;
use ops_core::error::AppError;

use crate::error::InvoiceError;
use crate::models::{CreateInvoice, Invoice, ListInvoicesFilter, NumberedPaid};
use crate::services::metrics::{DB_QUERY_DURATION, INVOICES_TOTAL, SEQUENCE_CONFLICTS_TOTAL};
use crate::services::sequencing::{self, SequenceKind};
use crate::store::InvoiceStore;

/// Database connection pool wrapper.
///
/// Number allocation runs inside a transaction entered through
/// `pg_advisory_xact_lock` keyed per sequence, so concurrent callers are
/// serialized per sequence and a rolled-back attempt consumes nothing.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoicing"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Create a pool from the shared database configuration.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, AppError> {
        Self::new(&config.url, config.max_connections, config.min_connections).await
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for Database {
    #[instrument(skip(self, input), fields(customer_name = %input.customer_name))]
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let invoice_id = Uuid::new_v4();
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (invoice_id, customer_name, currency, total_amount, status, notes)
            VALUES ($1, $2, $3, $4, 'draft', $5)
            RETURNING invoice_id, customer_name, currency, total_amount, status,
                proforma_number, invoice_number, paid_date, payment_method, payment_notes,
                notes, created_utc, sent_utc, paid_utc
            "#,
        )
        .bind(invoice_id)
        .bind(&input.customer_name)
        .bind(&input.currency)
        .bind(input.total_amount)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)))?;

        timer.observe_duration();

        INVOICES_TOTAL.with_label_values(&["draft"]).inc();
        info!(invoice_id = %invoice.invoice_id, "Draft invoice created");

        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, customer_name, currency, total_amount, status,
                proforma_number, invoice_number, paid_date, payment_method, payment_notes,
                notes, created_utc, sent_utc, paid_utc
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self, filter))]
    async fn list_invoices(
        &self,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let status_str = filter.status.map(|s| s.as_str().to_string());

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, customer_name, currency, total_amount, status,
                proforma_number, invoice_number, paid_date, payment_method, payment_notes,
                notes, created_utc, sent_utc, paid_utc
            FROM invoices
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::date IS NULL OR paid_date >= $2)
              AND ($3::date IS NULL OR paid_date <= $3)
            ORDER BY invoice_number ASC NULLS LAST, created_utc ASC
            LIMIT $4
            "#,
        )
        .bind(&status_str)
        .bind(filter.paid_from)
        .bind(filter.paid_to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn allocate_proforma_number(&self, invoice_id: Uuid) -> Result<Invoice, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["allocate_proforma_number"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Serialize proforma allocations so two callers never read the same max.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SequenceKind::Proforma.lock_key())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to take sequence lock: {}", e))
            })?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, customer_name, currency, total_amount, status,
                proforma_number, invoice_number, paid_date, payment_method, payment_notes,
                notes, created_utc, sent_utc, paid_utc
            FROM invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or(InvoiceError::NotFound)?;

        if let Some(existing) = invoice.proforma_number {
            return Err(InvoiceError::AlreadyAssigned(sequencing::proforma_label(
                existing,
            )));
        }
        if invoice.status != "draft" {
            return Err(InvoiceError::InvalidStatus {
                expected: "draft",
                actual: invoice.status,
            });
        }

        let current_max: Option<i64> = sqlx::query_scalar("SELECT MAX(proforma_number) FROM invoices")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to read sequence max: {}", e))
            })?;
        let next = sequencing::next_number(current_max);

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET proforma_number = $2,
                status = 'proforma'
            WHERE invoice_id = $1
            RETURNING invoice_id, customer_name, currency, total_amount, status,
                proforma_number, invoice_number, paid_date, payment_method, payment_notes,
                notes, created_utc, sent_utc, paid_utc
            "#,
        )
        .bind(invoice_id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to assign proforma number: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        INVOICES_TOTAL.with_label_values(&["proforma"]).inc();
        info!(
            invoice_id = %invoice.invoice_id,
            proforma_number = next,
            "Proforma number assigned"
        );

        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn send_invoice(&self, invoice_id: Uuid) -> Result<Invoice, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["send_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, customer_name, currency, total_amount, status,
                proforma_number, invoice_number, paid_date, payment_method, payment_notes,
                notes, created_utc, sent_utc, paid_utc
            FROM invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or(InvoiceError::NotFound)?;

        if invoice.status != "draft" && invoice.status != "proforma" {
            return Err(InvoiceError::InvalidStatus {
                expected: "draft or proforma",
                actual: invoice.status,
            });
        }

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET status = 'sent',
                sent_utc = NOW()
            WHERE invoice_id = $1
            RETURNING invoice_id, customer_name, currency, total_amount, status,
                proforma_number, invoice_number, paid_date, payment_method, payment_notes,
                notes, created_utc, sent_utc, paid_utc
            "#,
        )
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to send invoice: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        INVOICES_TOTAL.with_label_values(&["sent"]).inc();
        info!(invoice_id = %invoice.invoice_id, "Invoice sent");

        Ok(invoice)
    }

    #[instrument(skip(self, payment_method, payment_notes), fields(invoice_id = %invoice_id, paid_date = %paid_date))]
    async fn mark_paid(
        &self,
        invoice_id: Uuid,
        paid_date: NaiveDate,
        payment_method: Option<String>,
        payment_notes: Option<String>,
    ) -> Result<Invoice, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_paid"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Serialize invoice-number allocations; abort releases the lock and
        // consumes nothing.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SequenceKind::Invoice.lock_key())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to take sequence lock: {}", e))
            })?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, customer_name, currency, total_amount, status,
                proforma_number, invoice_number, paid_date, payment_method, payment_notes,
                notes, created_utc, sent_utc, paid_utc
            FROM invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or(InvoiceError::NotFound)?;

        if let Some(existing) = invoice.invoice_number {
            return Err(InvoiceError::AlreadyPaid(sequencing::invoice_label(existing)));
        }
        if invoice.status != "proforma" && invoice.status != "sent" {
            return Err(InvoiceError::InvalidStatus {
                expected: "proforma or sent",
                actual: invoice.status,
            });
        }

        let current_max: Option<i64> = sqlx::query_scalar("SELECT MAX(invoice_number) FROM invoices")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to read sequence max: {}", e))
            })?;
        let candidate = sequencing::next_number(current_max);

        let numbered_paid = sqlx::query_as::<_, NumberedPaid>(
            r#"
            SELECT invoice_number, paid_date
            FROM invoices
            WHERE invoice_number IS NOT NULL AND paid_date IS NOT NULL
            ORDER BY invoice_number ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load paid invoices: {}", e))
        })?;

        if let Err(conflict) = sequencing::check_payment_order(candidate, paid_date, &numbered_paid)
        {
            SEQUENCE_CONFLICTS_TOTAL.inc();
            warn!(
                invoice_id = %invoice_id,
                candidate_number = candidate,
                %paid_date,
                "Payment rejected by chronology check"
            );
            return Err(conflict);
        }

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET invoice_number = $2,
                paid_date = $3,
                payment_method = $4,
                payment_notes = $5,
                status = 'paid',
                paid_utc = NOW()
            WHERE invoice_id = $1
            RETURNING invoice_id, customer_name, currency, total_amount, status,
                proforma_number, invoice_number, paid_date, payment_method, payment_notes,
                notes, created_utc, sent_utc, paid_utc
            "#,
        )
        .bind(invoice_id)
        .bind(candidate)
        .bind(paid_date)
        .bind(&payment_method)
        .bind(&payment_notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to assign invoice number: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        INVOICES_TOTAL.with_label_values(&["paid"]).inc();
        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = candidate,
            %paid_date,
            "Invoice marked paid"
        );

        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn delete_draft(&self, invoice_id: Uuid) -> Result<bool, InvoiceError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_draft"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM invoices
            WHERE invoice_id = $1 AND status = 'draft'
            "#,
        )
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e)))?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(invoice_id = %invoice_id, "Draft invoice deleted");
        }

        Ok(deleted)
    }
}
