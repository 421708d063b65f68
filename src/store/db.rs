//! SQLite connection pool and schema setup

use std::str::FromStr;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Schema files, applied in order. Every statement is idempotent.
pub const SCHEMA_FILES: &[(&str, &str)] = &[
    ("01_core.sql", include_str!("../../sql/01_core.sql")),
    (
        "02_content_calendar.sql",
        include_str!("../../sql/02_content_calendar.sql"),
    ),
    (
        "03_project_management.sql",
        include_str!("../../sql/03_project_management.sql"),
    ),
    (
        "04_marketing_files.sql",
        include_str!("../../sql/04_marketing_files.sql"),
    ),
    ("05_whatsapp.sql", include_str!("../../sql/05_whatsapp.sql")),
    ("06_income.sql", include_str!("../../sql/06_income.sql")),
    ("07_inventory.sql", include_str!("../../sql/07_inventory.sql")),
];

/// Tables the setup script reports on
pub const EXPECTED_TABLES: &[&str] = &[
    "users",
    "customers",
    "content_posts",
    "tasks",
    "approvals",
    "customer_files",
    "messages",
    "message_reads",
    "subscriptions",
    "invoices",
    "inventory_items",
];

/// Open a pool, creating the database file if needed
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    info!(url = %database_url, "Connected to database");
    Ok(pool)
}

/// Apply every schema file in order, returning the names applied
pub async fn apply_schema(pool: &SqlitePool) -> Result<Vec<&'static str>, StoreError> {
    let mut applied = Vec::with_capacity(SCHEMA_FILES.len());

    for (name, sql) in SCHEMA_FILES {
        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|source| StoreError::Schema { file: *name, source })?;
        debug!(file = %name, "Applied schema file");
        applied.push(*name);
    }

    info!(files = applied.len(), "Schema applied");
    Ok(applied)
}

/// Row count of one table
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

/// Count rows in every expected table; a missing table is an error
pub async fn verify(pool: &SqlitePool) -> Result<Vec<TableCount>, StoreError> {
    let mut counts = Vec::with_capacity(EXPECTED_TABLES.len());

    for &table in EXPECTED_TABLES {
        let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await?;
        counts.push(TableCount { table, rows });
    }

    Ok(counts)
}

/// Cheap liveness probe for the health endpoint
pub async fn ping(pool: &SqlitePool) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok()
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Failed to apply {file}: {source}")]
    Schema {
        file: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("File storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            // a client-supplied id that points at no row
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::Invalid("referenced record does not exist".to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}

impl StoreError {
    /// True when the error came from a UNIQUE constraint
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// In-memory database with the full schema applied
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // a single connection, otherwise every connection sees its own memory db
    let pool = connect("sqlite::memory:", 1).await.unwrap();
    apply_schema(&pool).await.unwrap();
    pool
}
