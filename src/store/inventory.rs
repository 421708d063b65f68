//! Handset inventory with IMEI tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::db::StoreError;
use crate::rules::imei::{self, Imei};
use crate::rules::Money;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    InStock,
    Assigned,
    Sold,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InventoryItem {
    pub id: Uuid,
    pub imei: String,
    pub brand: String,
    pub model: String,
    pub storage: Option<String>,
    pub color: Option<String>,
    pub cost: Money,
    pub price: Money,
    pub status: ItemStatus,
    pub assigned_customer_id: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInventoryItem {
    pub imei: String,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub cost: Money,
    #[serde(default)]
    pub price: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryUpdate {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub storage: Option<String>,
    pub color: Option<String>,
    pub cost: Option<Money>,
    pub price: Option<Money>,
    pub status: Option<ItemStatus>,
    pub notes: Option<String>,
}

/// Outcome of checking an IMEI before it is stored or assigned
#[derive(Debug, Clone, Serialize)]
pub struct ImeiCheck {
    pub cleaned: String,
    pub valid: bool,
    pub duplicate: bool,
    pub message: String,
    /// Existing item carrying this IMEI, if any
    pub existing_item_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct InventoryStore {
    pool: SqlitePool,
}

impl InventoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, status: Option<ItemStatus>) -> Result<Vec<InventoryItem>, StoreError> {
        let items = sqlx::query_as::<_, InventoryItem>(
            "SELECT * FROM inventory_items WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY created_at DESC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<InventoryItem>, StoreError> {
        let item = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    pub async fn find_by_imei(&self, imei: &str) -> Result<Option<InventoryItem>, StoreError> {
        let item =
            sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE imei = ?")
                .bind(imei::clean(imei))
                .fetch_optional(&self.pool)
                .await?;
        Ok(item)
    }

    /// Format, checksum and duplicate check in one pass
    pub async fn check_imei(&self, raw: &str) -> Result<ImeiCheck, StoreError> {
        let cleaned = imei::clean(raw);

        let (valid, mut message) = match imei::validate(raw) {
            Ok(_) => (true, "IMEI is valid".to_string()),
            Err(e) => (false, e.to_string()),
        };

        let existing = if cleaned.is_empty() {
            None
        } else {
            self.find_by_imei(&cleaned).await?
        };
        if existing.is_some() {
            message = format!("IMEI {cleaned} is already registered");
        }

        Ok(ImeiCheck {
            valid,
            duplicate: existing.is_some(),
            existing_item_id: existing.map(|i| i.id),
            cleaned,
            message,
        })
    }

    fn validated(raw: &str) -> Result<Imei, StoreError> {
        imei::validate(raw).map_err(|e| StoreError::Invalid(e.to_string()))
    }

    pub async fn create(&self, new: NewInventoryItem) -> Result<InventoryItem, StoreError> {
        let imei = Self::validated(&new.imei)?;
        let brand = new.brand.trim().to_string();
        let model = new.model.trim().to_string();
        if brand.is_empty() || model.is_empty() {
            return Err(StoreError::Invalid("brand and model are required".to_string()));
        }
        if new.cost.is_negative() || new.price.is_negative() {
            return Err(StoreError::Invalid("cost and price cannot be negative".to_string()));
        }

        if self.find_by_imei(imei.as_str()).await?.is_some() {
            return Err(StoreError::Conflict(format!("IMEI {imei} is already registered")));
        }

        let now = Utc::now();
        let item = InventoryItem {
            id: Uuid::new_v4(),
            imei: imei.into_string(),
            brand,
            model,
            storage: new.storage,
            color: new.color,
            cost: new.cost,
            price: new.price,
            status: ItemStatus::InStock,
            assigned_customer_id: None,
            assigned_at: None,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO inventory_items (id, imei, brand, model, storage, color, cost, price, \
             status, assigned_customer_id, assigned_at, notes, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id)
        .bind(&item.imei)
        .bind(&item.brand)
        .bind(&item.model)
        .bind(&item.storage)
        .bind(&item.color)
        .bind(item.cost)
        .bind(item.price)
        .bind(item.status)
        .bind(item.assigned_customer_id)
        .bind(item.assigned_at)
        .bind(&item.notes)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)
        .map_err(|e| {
            // lost a race with a concurrent insert of the same IMEI
            if e.is_unique_violation() {
                StoreError::Conflict(format!("IMEI {} is already registered", item.imei))
            } else {
                e
            }
        })?;

        Ok(item)
    }

    pub async fn update(&self, id: Uuid, update: InventoryUpdate) -> Result<InventoryItem, StoreError> {
        let mut item = self.get(id).await?.ok_or(StoreError::NotFound("Inventory item"))?;

        if let Some(brand) = update.brand {
            item.brand = brand.trim().to_string();
        }
        if let Some(model) = update.model {
            item.model = model.trim().to_string();
        }
        if item.brand.is_empty() || item.model.is_empty() {
            return Err(StoreError::Invalid("brand and model cannot be empty".to_string()));
        }
        if update.storage.is_some() {
            item.storage = update.storage;
        }
        if update.color.is_some() {
            item.color = update.color;
        }
        if let Some(cost) = update.cost {
            item.cost = cost;
        }
        if let Some(price) = update.price {
            item.price = price;
        }
        if item.cost.is_negative() || item.price.is_negative() {
            return Err(StoreError::Invalid("cost and price cannot be negative".to_string()));
        }
        if let Some(status) = update.status {
            // assignment needs a customer and the IMEI re-check
            if status == ItemStatus::Assigned && item.status != ItemStatus::Assigned {
                return Err(StoreError::Invalid(
                    "use the assign endpoint to hand an item to a customer".to_string(),
                ));
            }
            item.status = status;
            if status == ItemStatus::InStock {
                item.assigned_customer_id = None;
                item.assigned_at = None;
            }
        }
        if update.notes.is_some() {
            item.notes = update.notes;
        }
        item.updated_at = Utc::now();

        self.write(&item).await?;
        Ok(item)
    }

    /// Hand a device to a customer
    pub async fn assign(&self, id: Uuid, customer_id: Uuid) -> Result<InventoryItem, StoreError> {
        let mut item = self.get(id).await?.ok_or(StoreError::NotFound("Inventory item"))?;

        // re-check stored IMEIs, rows may predate validation
        Self::validated(&item.imei)?;

        if item.status != ItemStatus::InStock {
            return Err(StoreError::Conflict(format!(
                "IMEI {} is not in stock",
                item.imei
            )));
        }

        let now = Utc::now();
        item.status = ItemStatus::Assigned;
        item.assigned_customer_id = Some(customer_id);
        item.assigned_at = Some(now);
        item.updated_at = now;

        self.write(&item).await?;
        Ok(item)
    }

    /// Return an assigned device to stock
    pub async fn release(&self, id: Uuid) -> Result<InventoryItem, StoreError> {
        let mut item = self.get(id).await?.ok_or(StoreError::NotFound("Inventory item"))?;
        if item.status != ItemStatus::Assigned {
            return Err(StoreError::Conflict("Item is not assigned".to_string()));
        }

        item.status = ItemStatus::InStock;
        item.assigned_customer_id = None;
        item.assigned_at = None;
        item.updated_at = Utc::now();

        self.write(&item).await?;
        Ok(item)
    }

    async fn write(&self, item: &InventoryItem) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE inventory_items SET brand = ?, model = ?, storage = ?, color = ?, cost = ?, \
             price = ?, status = ?, assigned_customer_id = ?, assigned_at = ?, notes = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&item.brand)
        .bind(&item.model)
        .bind(&item.storage)
        .bind(&item.color)
        .bind(item.cost)
        .bind(item.price)
        .bind(item.status)
        .bind(item.assigned_customer_id)
        .bind(item.assigned_at)
        .bind(&item.notes)
        .bind(item.updated_at)
        .bind(item.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
