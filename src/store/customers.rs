//! Customer directory

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};
use uuid::Uuid;

use super::db::StoreError;
use crate::rules::Money;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CustomerStatus {
    #[default]
    Active,
    Paused,
    Prospect,
    Inactive,
}

impl CustomerStatus {
    /// Lenient parse used by the spreadsheet import (Spanish or English)
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "active" | "activo" | "activa" => Some(CustomerStatus::Active),
            "paused" | "pausado" | "pausada" | "en pausa" => Some(CustomerStatus::Paused),
            "prospect" | "prospecto" => Some(CustomerStatus::Prospect),
            "inactive" | "inactivo" | "inactiva" | "baja" => Some(CustomerStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub business_name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub industry: Option<String>,
    pub plan: Option<String>,
    pub monthly_fee: Money,
    pub start_date: Option<NaiveDate>,
    pub status: CustomerStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer fields accepted on create
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCustomer {
    pub business_name: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub monthly_fee: Money,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: CustomerStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Customer update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerUpdate {
    pub business_name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub industry: Option<String>,
    pub plan: Option<String>,
    pub monthly_fee: Option<Money>,
    pub start_date: Option<NaiveDate>,
    pub status: Option<CustomerStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilter {
    pub q: Option<String>,
    pub status: Option<CustomerStatus>,
}

impl NewCustomer {
    /// Validate and turn into a row ready for insertion
    pub fn into_customer(self) -> Result<Customer, StoreError> {
        let business_name = self.business_name.trim().to_string();
        if business_name.is_empty() {
            return Err(StoreError::Invalid("business_name is required".to_string()));
        }
        if self.monthly_fee.is_negative() {
            return Err(StoreError::Invalid("monthly_fee cannot be negative".to_string()));
        }

        let now = Utc::now();
        Ok(Customer {
            id: Uuid::new_v4(),
            business_name,
            contact_name: non_empty(self.contact_name),
            email: non_empty(self.email).map(|e| e.to_lowercase()),
            phone: non_empty(self.phone),
            industry: non_empty(self.industry),
            plan: non_empty(self.plan),
            monthly_fee: self.monthly_fee,
            start_date: self.start_date,
            status: self.status,
            notes: non_empty(self.notes),
            created_at: now,
            updated_at: now,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Insert a prepared row through any executor (pool or open transaction)
pub async fn insert<'e, E: SqliteExecutor<'e>>(executor: E, c: &Customer) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO customers (id, business_name, contact_name, email, phone, industry, plan, \
         monthly_fee, start_date, status, notes, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(c.id)
    .bind(&c.business_name)
    .bind(&c.contact_name)
    .bind(&c.email)
    .bind(&c.phone)
    .bind(&c.industry)
    .bind(&c.plan)
    .bind(c.monthly_fee)
    .bind(c.start_date)
    .bind(c.status)
    .bind(&c.notes)
    .bind(c.created_at)
    .bind(c.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[derive(Clone)]
pub struct CustomerStore {
    pool: SqlitePool,
}

impl CustomerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, StoreError> {
        let pattern = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q.to_lowercase()));

        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers \
             WHERE (?1 IS NULL OR status = ?1) \
               AND (?2 IS NULL OR lower(business_name) LIKE ?2 \
                    OR lower(coalesce(contact_name, '')) LIKE ?2 \
                    OR lower(coalesce(email, '')) LIKE ?2) \
             ORDER BY business_name COLLATE NOCASE",
        )
        .bind(filter.status)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    /// Fetch a customer or fail with `NotFound`
    pub async fn require(&self, id: Uuid) -> Result<Customer, StoreError> {
        self.get(id).await?.ok_or(StoreError::NotFound("Customer"))
    }

    /// Match an inbound phone number against stored numbers by trailing digits
    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<Customer>, StoreError> {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < 10 {
            return Ok(None);
        }
        let tail = &digits[digits.len() - 10..];

        let candidates = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE phone IS NOT NULL ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(candidates.into_iter().find(|c| {
            c.phone.as_deref().is_some_and(|p| {
                let stored: String = p.chars().filter(|c| c.is_ascii_digit()).collect();
                stored.ends_with(tail)
            })
        }))
    }

    pub async fn create(&self, new: NewCustomer) -> Result<Customer, StoreError> {
        let customer = new.into_customer()?;
        insert(&self.pool, &customer).await?;
        Ok(customer)
    }

    pub async fn update(&self, id: Uuid, update: CustomerUpdate) -> Result<Customer, StoreError> {
        let mut c = self.require(id).await?;

        if let Some(name) = update.business_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(StoreError::Invalid("business_name cannot be empty".to_string()));
            }
            c.business_name = name;
        }
        if let Some(fee) = update.monthly_fee {
            if fee.is_negative() {
                return Err(StoreError::Invalid("monthly_fee cannot be negative".to_string()));
            }
            c.monthly_fee = fee;
        }
        if update.contact_name.is_some() {
            c.contact_name = non_empty(update.contact_name);
        }
        if update.email.is_some() {
            c.email = non_empty(update.email).map(|e| e.to_lowercase());
        }
        if update.phone.is_some() {
            c.phone = non_empty(update.phone);
        }
        if update.industry.is_some() {
            c.industry = non_empty(update.industry);
        }
        if update.plan.is_some() {
            c.plan = non_empty(update.plan);
        }
        if update.notes.is_some() {
            c.notes = non_empty(update.notes);
        }
        if let Some(date) = update.start_date {
            c.start_date = Some(date);
        }
        if let Some(status) = update.status {
            c.status = status;
        }
        c.updated_at = Utc::now();

        sqlx::query(
            "UPDATE customers SET business_name = ?, contact_name = ?, email = ?, phone = ?, \
             industry = ?, plan = ?, monthly_fee = ?, start_date = ?, status = ?, notes = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&c.business_name)
        .bind(&c.contact_name)
        .bind(&c.email)
        .bind(&c.phone)
        .bind(&c.industry)
        .bind(&c.plan)
        .bind(c.monthly_fee)
        .bind(c.start_date)
        .bind(c.status)
        .bind(&c.notes)
        .bind(c.updated_at)
        .bind(c.id)
        .execute(&self.pool)
        .await?;

        Ok(c)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
pub(crate) async fn seed_customer(pool: &SqlitePool, name: &str) -> Customer {
    CustomerStore::new(pool.clone())
        .create(NewCustomer {
            business_name: name.to_string(),
            contact_name: Some("Ana López".to_string()),
            phone: Some("+52 55 1234 5678".to_string()),
            monthly_fee: Money::from_pesos(4500.0),
            ..Default::default()
        })
        .await
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::test_pool;

    #[tokio::test]
    async fn create_rejects_blank_name() {
        let store = CustomerStore::new(test_pool().await);
        let err = store
            .create(NewCustomer {
                business_name: "   ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn list_filters_by_search_and_status() {
        let pool = test_pool().await;
        let store = CustomerStore::new(pool.clone());
        seed_customer(&pool, "Café Luna").await;
        let gym = seed_customer(&pool, "Gimnasio Norte").await;
        store
            .update(
                gym.id,
                CustomerUpdate {
                    status: Some(CustomerStatus::Paused),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let all = store.list(&CustomerFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let search = CustomerFilter {
            q: Some("luna".to_string()),
            status: None,
        };
        let found = store.list(&search).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].business_name, "Café Luna");

        let paused = CustomerFilter {
            q: None,
            status: Some(CustomerStatus::Paused),
        };
        let found = store.list(&paused).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, gym.id);
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let pool = test_pool().await;
        let store = CustomerStore::new(pool.clone());
        let c = seed_customer(&pool, "Café Luna").await;

        let updated = store
            .update(
                c.id,
                CustomerUpdate {
                    plan: Some("Premium".to_string()),
                    monthly_fee: Some(Money::from_pesos(6000.0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.plan.as_deref(), Some("Premium"));
        assert_eq!(updated.monthly_fee, Money::from_pesos(6000.0));
        assert_eq!(updated.contact_name.as_deref(), Some("Ana López"));

        let missing = store.update(Uuid::new_v4(), CustomerUpdate::default()).await;
        assert!(matches!(missing, Err(StoreError::NotFound("Customer"))));
    }

    #[tokio::test]
    async fn finds_customer_by_phone_suffix() {
        let pool = test_pool().await;
        let store = CustomerStore::new(pool.clone());
        let c = seed_customer(&pool, "Café Luna").await;

        let found = store.find_by_phone("5215512345678").await.unwrap().unwrap();
        assert_eq!(found.id, c.id);
        assert!(store.find_by_phone("5219999999999").await.unwrap().is_none());
        assert!(store.find_by_phone("123").await.unwrap().is_none());
    }

    #[test]
    fn parses_spanish_statuses() {
        assert_eq!(CustomerStatus::parse_loose(" Activo "), Some(CustomerStatus::Active));
        assert_eq!(CustomerStatus::parse_loose("baja"), Some(CustomerStatus::Inactive));
        assert_eq!(CustomerStatus::parse_loose("???"), None);
    }
}
