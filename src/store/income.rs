//! Subscriptions, invoices and income reports
//!
//! Every invoice amount goes through `rules::tax::compute`, so the stored
//! `tax` and `total` columns always agree with the 16% IVA rule.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use super::content_calendar::month_range;
use super::db::StoreError;
use crate::rules::tax::{self, TaxBreakdown};
use crate::rules::Money;

/// Days between issue and due date when none is given
pub const DEFAULT_PAYMENT_TERMS_DAYS: i64 = 10;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub plan: String,
    pub amount: Money,
    pub billing_day: i64,
    pub active: bool,
    pub started_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubscription {
    pub customer_id: Uuid,
    pub plan: String,
    pub amount: Money,
    #[serde(default = "default_billing_day")]
    pub billing_day: i64,
    pub started_on: NaiveDate,
}

fn default_billing_day() -> i64 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionUpdate {
    pub plan: Option<String>,
    pub amount: Option<Money>,
    pub billing_day: Option<i64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    /// `YYYY-MM` for subscription invoices
    pub period: Option<String>,
    pub concept: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub status: InvoiceStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn amounts(&self) -> TaxBreakdown {
        TaxBreakdown {
            subtotal: self.subtotal,
            tax: self.tax,
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub customer_id: Uuid,
    pub concept: String,
    pub subtotal: Money,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
}

/// Result of a monthly invoice run
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub period: String,
    pub created: Vec<Invoice>,
    pub skipped: usize,
}

/// Income for one calendar month (by issue date, cancelled invoices excluded)
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MonthlyIncome {
    pub month: String,
    pub invoices: i64,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub collected: Money,
    pub outstanding: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncomeReport {
    pub year: i32,
    pub months: Vec<MonthlyIncome>,
    pub totals: MonthlyIncome,
}

fn validate_billing_day(day: i64) -> Result<(), StoreError> {
    if (1..=28).contains(&day) {
        Ok(())
    } else {
        Err(StoreError::Invalid("billing_day must be between 1 and 28".to_string()))
    }
}

/// Next sequential number for the month of `issue_date`: `INV-YYYYMM-NNNN`
async fn next_invoice_number(
    tx: &mut Transaction<'_, Sqlite>,
    issue_date: NaiveDate,
) -> Result<String, StoreError> {
    let prefix = format!("INV-{}-", issue_date.format("%Y%m"));
    let last: Option<String> = sqlx::query_scalar(
        "SELECT number FROM invoices WHERE number LIKE ? ORDER BY number DESC LIMIT 1",
    )
    .bind(format!("{prefix}%"))
    .fetch_optional(&mut **tx)
    .await?;

    let next = last
        .as_deref()
        .and_then(|n| n.strip_prefix(&prefix))
        .and_then(|seq| seq.parse::<u32>().ok())
        .unwrap_or(0)
        + 1;

    Ok(format!("{prefix}{next:04}"))
}

#[derive(Clone)]
pub struct IncomeStore {
    pool: SqlitePool,
}

impl IncomeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    pub async fn list_subscriptions(
        &self,
        customer_id: Option<Uuid>,
    ) -> Result<Vec<Subscription>, StoreError> {
        let subs = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE (?1 IS NULL OR customer_id = ?1) ORDER BY created_at",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    pub async fn create_subscription(&self, new: NewSubscription) -> Result<Subscription, StoreError> {
        validate_billing_day(new.billing_day)?;
        if new.amount.cents() <= 0 {
            return Err(StoreError::Invalid("amount must be positive".to_string()));
        }

        let sub = Subscription {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            plan: new.plan.trim().to_string(),
            amount: new.amount,
            billing_day: new.billing_day,
            active: true,
            started_on: new.started_on,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO subscriptions (id, customer_id, plan, amount, billing_day, active, \
             started_on, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(sub.id)
        .bind(sub.customer_id)
        .bind(&sub.plan)
        .bind(sub.amount)
        .bind(sub.billing_day)
        .bind(sub.active)
        .bind(sub.started_on)
        .bind(sub.created_at)
        .execute(&self.pool)
        .await?;

        Ok(sub)
    }

    pub async fn update_subscription(
        &self,
        id: Uuid,
        update: SubscriptionUpdate,
    ) -> Result<Subscription, StoreError> {
        let mut sub = sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("Subscription"))?;

        if let Some(plan) = update.plan {
            sub.plan = plan.trim().to_string();
        }
        if let Some(amount) = update.amount {
            if amount.cents() <= 0 {
                return Err(StoreError::Invalid("amount must be positive".to_string()));
            }
            sub.amount = amount;
        }
        if let Some(day) = update.billing_day {
            validate_billing_day(day)?;
            sub.billing_day = day;
        }
        if let Some(active) = update.active {
            sub.active = active;
        }

        sqlx::query(
            "UPDATE subscriptions SET plan = ?, amount = ?, billing_day = ?, active = ? WHERE id = ?",
        )
        .bind(&sub.plan)
        .bind(sub.amount)
        .bind(sub.billing_day)
        .bind(sub.active)
        .bind(sub.id)
        .execute(&self.pool)
        .await?;

        Ok(sub)
    }

    // ------------------------------------------------------------------
    // Invoices
    // ------------------------------------------------------------------

    /// Flag pending invoices past their due date
    pub async fn refresh_overdue(&self, today: NaiveDate) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE invoices SET status = 'overdue' WHERE status = 'pending' AND due_date < ?",
        )
        .bind(today)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, StoreError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices \
             WHERE (?1 IS NULL OR customer_id = ?1) AND (?2 IS NULL OR status = ?2) \
             ORDER BY issue_date DESC, number DESC",
        )
        .bind(filter.customer_id)
        .bind(filter.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    pub async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, StoreError> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    pub async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice, StoreError> {
        let concept = new.concept.trim().to_string();
        if concept.is_empty() {
            return Err(StoreError::Invalid("concept is required".to_string()));
        }
        if new.subtotal.cents() <= 0 {
            return Err(StoreError::Invalid("subtotal must be positive".to_string()));
        }

        let issue_date = new.issue_date.unwrap_or_else(|| Utc::now().date_naive());
        let due_date = new
            .due_date
            .unwrap_or(issue_date + Duration::days(DEFAULT_PAYMENT_TERMS_DAYS));
        if due_date < issue_date {
            return Err(StoreError::Invalid("due_date cannot precede issue_date".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let invoice = insert_invoice(
            &mut tx,
            new.customer_id,
            None,
            None,
            concept,
            issue_date,
            due_date,
            new.subtotal,
        )
        .await?;
        tx.commit().await?;

        Ok(invoice)
    }

    pub async fn mark_paid(&self, id: Uuid) -> Result<Invoice, StoreError> {
        let mut invoice = self.get_invoice(id).await?.ok_or(StoreError::NotFound("Invoice"))?;

        match invoice.status {
            InvoiceStatus::Paid => return Ok(invoice),
            InvoiceStatus::Cancelled => {
                return Err(StoreError::Conflict("Invoice is cancelled".to_string()))
            }
            InvoiceStatus::Pending | InvoiceStatus::Overdue => {}
        }

        invoice.status = InvoiceStatus::Paid;
        invoice.paid_at = Some(Utc::now());

        sqlx::query("UPDATE invoices SET status = ?, paid_at = ? WHERE id = ?")
            .bind(invoice.status)
            .bind(invoice.paid_at)
            .bind(invoice.id)
            .execute(&self.pool)
            .await?;

        info!(invoice = %invoice.number, total = %invoice.total, "Invoice paid");
        Ok(invoice)
    }

    /// Invoice every active subscription for `period` (`YYYY-MM`), once
    pub async fn generate_monthly(&self, period: &str) -> Result<GenerationSummary, StoreError> {
        let (start, next_month) = month_range(period)?;
        let period = start.format("%Y-%m").to_string();

        let subs = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE active = 1 AND started_on < ? ORDER BY created_at",
        )
        .bind(next_month)
        .fetch_all(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;
        let mut created = Vec::new();
        let mut skipped = 0;

        for sub in subs {
            let exists: Option<Uuid> = sqlx::query_scalar(
                "SELECT id FROM invoices WHERE subscription_id = ? AND period = ?",
            )
            .bind(sub.id)
            .bind(&period)
            .fetch_optional(&mut *tx)
            .await?;

            if exists.is_some() {
                skipped += 1;
                continue;
            }

            let issue_date = start
                .with_day(sub.billing_day.clamp(1, 28) as u32)
                .unwrap_or(start);
            let due_date = issue_date + Duration::days(DEFAULT_PAYMENT_TERMS_DAYS);

            let invoice = insert_invoice(
                &mut tx,
                sub.customer_id,
                Some(sub.id),
                Some(period.clone()),
                format!("{} ({})", sub.plan, period),
                issue_date,
                due_date,
                sub.amount,
            )
            .await?;
            created.push(invoice);
        }

        tx.commit().await?;

        info!(period = %period, created = created.len(), skipped, "Monthly invoices generated");
        Ok(GenerationSummary {
            period,
            created,
            skipped,
        })
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    pub async fn report(&self, year: i32) -> Result<IncomeReport, StoreError> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| StoreError::Invalid(format!("invalid year {year}")))?;
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
            .ok_or_else(|| StoreError::Invalid(format!("invalid year {year}")))?;

        let rows: Vec<(String, InvoiceStatus, i64, Money, Money, Money)> = sqlx::query_as(
            "SELECT substr(issue_date, 1, 7) AS month, status, COUNT(*), \
                    SUM(subtotal), SUM(tax), SUM(total) \
             FROM invoices \
             WHERE issue_date >= ? AND issue_date < ? AND status != 'cancelled' \
             GROUP BY month, status",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut months: Vec<MonthlyIncome> = (1..=12)
            .map(|m| MonthlyIncome {
                month: format!("{year}-{m:02}"),
                ..Default::default()
            })
            .collect();

        for (month, status, count, subtotal, tax, total) in rows {
            let Some(entry) = months.iter_mut().find(|m| m.month == month) else {
                continue;
            };
            entry.invoices += count;
            entry.subtotal += subtotal;
            entry.tax += tax;
            entry.total += total;
            match status {
                InvoiceStatus::Paid => entry.collected += total,
                InvoiceStatus::Pending | InvoiceStatus::Overdue => entry.outstanding += total,
                InvoiceStatus::Cancelled => {}
            }
        }

        let totals = MonthlyIncome {
            month: year.to_string(),
            invoices: months.iter().map(|m| m.invoices).sum(),
            subtotal: months.iter().map(|m| m.subtotal).sum(),
            tax: months.iter().map(|m| m.tax).sum(),
            total: months.iter().map(|m| m.total).sum(),
            collected: months.iter().map(|m| m.collected).sum(),
            outstanding: months.iter().map(|m| m.outstanding).sum(),
        };

        Ok(IncomeReport {
            year,
            months,
            totals,
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert_invoice(
    tx: &mut Transaction<'_, Sqlite>,
    customer_id: Uuid,
    subscription_id: Option<Uuid>,
    period: Option<String>,
    concept: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    subtotal: Money,
) -> Result<Invoice, StoreError> {
    let amounts = tax::compute(subtotal);
    let number = next_invoice_number(tx, issue_date).await?;

    let invoice = Invoice {
        id: Uuid::new_v4(),
        number,
        customer_id,
        subscription_id,
        period,
        concept,
        issue_date,
        due_date,
        subtotal: amounts.subtotal,
        tax: amounts.tax,
        total: amounts.total,
        status: InvoiceStatus::Pending,
        paid_at: None,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO invoices (id, number, customer_id, subscription_id, period, concept, \
         issue_date, due_date, subtotal, tax, total, status, paid_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(invoice.id)
    .bind(&invoice.number)
    .bind(invoice.customer_id)
    .bind(invoice.subscription_id)
    .bind(&invoice.period)
    .bind(&invoice.concept)
    .bind(invoice.issue_date)
    .bind(invoice.due_date)
    .bind(invoice.subtotal)
    .bind(invoice.tax)
    .bind(invoice.total)
    .bind(invoice.status)
    .bind(invoice.paid_at)
    .bind(invoice.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(invoice)
}
