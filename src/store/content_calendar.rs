//! Content calendar (escaleta) posts

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::db::StoreError;
use crate::rules::content::validate_format;
use crate::rules::{Platform, PostFormat};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Draft,
    InReview,
    Approved,
    Scheduled,
    Published,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ContentPost {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub platform: Platform,
    pub format: PostFormat,
    pub scheduled_date: NaiveDate,
    pub title: String,
    pub caption: Option<String>,
    pub status: PostStatus,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub customer_id: Uuid,
    pub platform: Platform,
    pub format: PostFormat,
    pub scheduled_date: NaiveDate,
    pub title: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdate {
    pub platform: Option<Platform>,
    pub format: Option<PostFormat>,
    pub scheduled_date: Option<NaiveDate>,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub status: Option<PostStatus>,
    pub assigned_to: Option<Uuid>,
}

/// Calendar query: one customer, one month, or both
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFilter {
    pub customer_id: Option<Uuid>,
    /// `YYYY-MM`
    pub month: Option<String>,
}

/// First day of the month and first day of the next one
pub fn month_range(month: &str) -> Result<(NaiveDate, NaiveDate), StoreError> {
    let invalid = || StoreError::Invalid(format!("month must be YYYY-MM, got '{month}'"));

    let (y, m) = month.split_once('-').ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let month_num: u32 = m.parse().map_err(|_| invalid())?;

    let start = NaiveDate::from_ymd_opt(year, month_num, 1).ok_or_else(invalid)?;
    let end = if month_num == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month_num + 1, 1)
    }
    .ok_or_else(invalid)?;

    Ok((start, end))
}

fn check_format(platform: Platform, format: PostFormat) -> Result<(), StoreError> {
    validate_format(platform, format).map_err(|e| StoreError::Invalid(e.to_string()))
}

#[derive(Clone)]
pub struct ContentCalendarStore {
    pool: SqlitePool,
}

impl ContentCalendarStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &PostFilter) -> Result<Vec<ContentPost>, StoreError> {
        let range = filter.month.as_deref().map(month_range).transpose()?;

        let posts = sqlx::query_as::<_, ContentPost>(
            "SELECT * FROM content_posts \
             WHERE (?1 IS NULL OR customer_id = ?1) \
               AND (?2 IS NULL OR scheduled_date >= ?2) \
               AND (?3 IS NULL OR scheduled_date < ?3) \
             ORDER BY scheduled_date, created_at",
        )
        .bind(filter.customer_id)
        .bind(range.map(|r| r.0))
        .bind(range.map(|r| r.1))
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    pub async fn list_for_customer(&self, customer_id: Uuid) -> Result<Vec<ContentPost>, StoreError> {
        self.list(&PostFilter {
            customer_id: Some(customer_id),
            month: None,
        })
        .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ContentPost>, StoreError> {
        let post = sqlx::query_as::<_, ContentPost>("SELECT * FROM content_posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    pub async fn create(&self, new: NewPost) -> Result<ContentPost, StoreError> {
        check_format(new.platform, new.format)?;
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::Invalid("title is required".to_string()));
        }

        let now = Utc::now();
        let post = ContentPost {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            platform: new.platform,
            format: new.format,
            scheduled_date: new.scheduled_date,
            title,
            caption: new.caption,
            status: new.status,
            assigned_to: new.assigned_to,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO content_posts (id, customer_id, platform, format, scheduled_date, title, \
             caption, status, assigned_to, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(post.id)
        .bind(post.customer_id)
        .bind(post.platform)
        .bind(post.format)
        .bind(post.scheduled_date)
        .bind(&post.title)
        .bind(&post.caption)
        .bind(post.status)
        .bind(post.assigned_to)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(post)
    }

    pub async fn update(&self, id: Uuid, update: PostUpdate) -> Result<ContentPost, StoreError> {
        let mut post = self.get(id).await?.ok_or(StoreError::NotFound("Post"))?;

        if let Some(platform) = update.platform {
            post.platform = platform;
        }
        if let Some(format) = update.format {
            post.format = format;
        }
        // a platform change alone can invalidate the stored format
        check_format(post.platform, post.format)?;

        if let Some(date) = update.scheduled_date {
            post.scheduled_date = date;
        }
        if let Some(title) = update.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(StoreError::Invalid("title cannot be empty".to_string()));
            }
            post.title = title;
        }
        if update.caption.is_some() {
            post.caption = update.caption;
        }
        if let Some(status) = update.status {
            post.status = status;
        }
        if update.assigned_to.is_some() {
            post.assigned_to = update.assigned_to;
        }
        post.updated_at = Utc::now();

        sqlx::query(
            "UPDATE content_posts SET platform = ?, format = ?, scheduled_date = ?, title = ?, \
             caption = ?, status = ?, assigned_to = ?, updated_at = ? WHERE id = ?",
        )
        .bind(post.platform)
        .bind(post.format)
        .bind(post.scheduled_date)
        .bind(&post.title)
        .bind(&post.caption)
        .bind(post.status)
        .bind(post.assigned_to)
        .bind(post.updated_at)
        .bind(post.id)
        .execute(&self.pool)
        .await?;

        Ok(post)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE approvals SET post_id = NULL WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM content_posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("Post"));
        }

        tx.commit().await?;
        Ok(())
    }
}
