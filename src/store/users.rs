//! Team members

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::db::StoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    Member,
}

/// Team member
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, email: &str, name: &str, role: Role) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            name: name.trim().to_string(),
            role,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO users (id, email, name, role, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.role)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)
            .map_err(|e| {
                if e.is_unique_violation() {
                    StoreError::Conflict(format!("A user with email {} already exists", user.email))
                } else {
                    e
                }
            })?;

        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::test_pool;

    #[tokio::test]
    async fn create_normalizes_email_and_rejects_duplicates() {
        let store = UserStore::new(test_pool().await);

        let user = store.create(" Ana@Agency.MX ", "Ana", Role::Admin).await.unwrap();
        assert_eq!(user.email, "ana@agency.mx");

        let found = store.find_by_email("ANA@agency.mx").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.role, Role::Admin);

        let err = store.create("ana@agency.mx", "Other", Role::Member).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
