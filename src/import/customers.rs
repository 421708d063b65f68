//! Replace the customer directory with the spreadsheet contents
//!
//! Runs in one transaction. Tables that hang off customers are cleared
//! first, then each row is inserted under its own savepoint so a bad row
//! is counted and skipped without losing the rest.

use serde::Serialize;
use sqlx::{Connection, Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use super::spreadsheet::{parse_currency, parse_date, Field, SheetRow};
use super::ImportError;
use crate::store::customers::{self, CustomerStatus, NewCustomer};

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
    /// Customers deleted before the rows went in; their uploads are stale
    pub removed_customers: Vec<Uuid>,
}

/// Row to customer fields; the message names the offending column
pub fn row_to_customer(row: &SheetRow) -> Result<NewCustomer, String> {
    let business_name = row
        .text(Field::BusinessName)
        .ok_or_else(|| "business name is empty".to_string())?;

    let monthly_fee = parse_currency(row.get(Field::MonthlyFee))?;
    let start_date = parse_date(row.get(Field::StartDate))?;

    let status = match row.text(Field::Status) {
        None => CustomerStatus::default(),
        Some(raw) => {
            CustomerStatus::parse_loose(&raw).ok_or_else(|| format!("unknown status '{raw}'"))?
        }
    };

    Ok(NewCustomer {
        business_name,
        contact_name: row.text(Field::ContactName),
        email: row.text(Field::Email),
        phone: row.text(Field::Phone),
        industry: row.text(Field::Industry),
        plan: row.text(Field::Plan),
        monthly_fee,
        start_date,
        status,
        notes: row.text(Field::Notes),
    })
}

/// Drop everything that references a customer, then the customers
async fn clear_customers(tx: &mut Transaction<'_, Sqlite>) -> Result<Vec<Uuid>, ImportError> {
    let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM customers")
        .fetch_all(&mut **tx)
        .await?;

    for statement in [
        "DELETE FROM approvals",
        "DELETE FROM content_posts",
        "DELETE FROM customer_files",
        "DELETE FROM invoices",
        "DELETE FROM subscriptions",
        "UPDATE tasks SET customer_id = NULL WHERE customer_id IS NOT NULL",
        "UPDATE messages SET customer_id = NULL WHERE customer_id IS NOT NULL",
        "UPDATE inventory_items SET status = 'in_stock', assigned_customer_id = NULL, \
         assigned_at = NULL WHERE status = 'assigned'",
        "UPDATE inventory_items SET assigned_customer_id = NULL \
         WHERE assigned_customer_id IS NOT NULL",
    ] {
        sqlx::query(statement).execute(&mut **tx).await?;
    }

    sqlx::query("DELETE FROM customers")
        .execute(&mut **tx)
        .await?;
    Ok(ids)
}

pub async fn import_customers(
    pool: &SqlitePool,
    rows: Vec<SheetRow>,
) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary {
        total: rows.len(),
        ..Default::default()
    };

    let mut tx = pool.begin().await?;
    summary.removed_customers = clear_customers(&mut tx).await?;
    info!(
        removed = summary.removed_customers.len(),
        "Cleared existing customers"
    );

    for row in rows {
        let prepared = row_to_customer(&row)
            .and_then(|new| new.into_customer().map_err(|e| e.to_string()));
        let customer = match prepared {
            Ok(customer) => customer,
            Err(message) => {
                warn!(line = row.line, %message, "Skipping spreadsheet row");
                summary.failed += 1;
                summary.errors.push(RowError {
                    line: row.line,
                    message,
                });
                continue;
            }
        };

        // nested begin is a SAVEPOINT
        let mut savepoint = tx.begin().await?;
        match customers::insert(&mut *savepoint, &customer).await {
            Ok(()) => {
                savepoint.commit().await?;
                summary.imported += 1;
            }
            Err(e) => {
                savepoint.rollback().await?;
                warn!(line = row.line, error = %e, "Row insert failed");
                summary.failed += 1;
                summary.errors.push(RowError {
                    line: row.line,
                    message: e.to_string(),
                });
            }
        }
    }

    tx.commit().await?;

    info!(
        total = summary.total,
        imported = summary.imported,
        failed = summary.failed,
        "Customer import finished"
    );
    Ok(summary)
}
