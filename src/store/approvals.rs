//! Customer approvals for posts and deliverables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::content_calendar::PostStatus;
use super::db::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    ChangesRequested,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Approval {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub post_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub title: String,
    pub requested_by: Uuid,
    pub reviewer_id: Option<Uuid>,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewApproval {
    pub customer_id: Uuid,
    #[serde(default)]
    pub post_id: Option<Uuid>,
    #[serde(default)]
    pub task_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Decision {
    pub status: ApprovalStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone)]
pub struct ApprovalStore {
    pool: SqlitePool,
}

impl ApprovalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open an approval request; a linked post moves to `in_review`
    pub async fn request(&self, new: NewApproval, requested_by: Uuid) -> Result<Approval, StoreError> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::Invalid("title is required".to_string()));
        }

        let approval = Approval {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            post_id: new.post_id,
            task_id: new.task_id,
            title,
            requested_by,
            reviewer_id: None,
            status: ApprovalStatus::Pending,
            comment: new.comment,
            created_at: Utc::now(),
            decided_at: None,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approvals (id, customer_id, post_id, task_id, title, requested_by, \
             reviewer_id, status, comment, created_at, decided_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(approval.id)
        .bind(approval.customer_id)
        .bind(approval.post_id)
        .bind(approval.task_id)
        .bind(&approval.title)
        .bind(approval.requested_by)
        .bind(approval.reviewer_id)
        .bind(approval.status)
        .bind(&approval.comment)
        .bind(approval.created_at)
        .bind(approval.decided_at)
        .execute(&mut *tx)
        .await?;

        if let Some(post_id) = approval.post_id {
            sqlx::query("UPDATE content_posts SET status = ?, updated_at = ? WHERE id = ?")
                .bind(PostStatus::InReview)
                .bind(approval.created_at)
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(approval)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Approval>, StoreError> {
        let approval = sqlx::query_as::<_, Approval>("SELECT * FROM approvals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(approval)
    }

    pub async fn list_pending(&self, customer_id: Option<Uuid>) -> Result<Vec<Approval>, StoreError> {
        let approvals = sqlx::query_as::<_, Approval>(
            "SELECT * FROM approvals WHERE status = ?1 AND (?2 IS NULL OR customer_id = ?2) \
             ORDER BY created_at",
        )
        .bind(ApprovalStatus::Pending)
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(approvals)
    }

    /// Record a decision on a pending approval and carry it to the linked post
    pub async fn decide(
        &self,
        id: Uuid,
        decision: Decision,
        reviewer_id: Uuid,
    ) -> Result<Approval, StoreError> {
        if decision.status == ApprovalStatus::Pending {
            return Err(StoreError::Invalid("decision cannot be 'pending'".to_string()));
        }

        let mut approval = self.get(id).await?.ok_or(StoreError::NotFound("Approval"))?;
        if approval.status != ApprovalStatus::Pending {
            return Err(StoreError::Conflict("Approval has already been decided".to_string()));
        }

        approval.status = decision.status;
        approval.reviewer_id = Some(reviewer_id);
        approval.decided_at = Some(Utc::now());
        if decision.comment.is_some() {
            approval.comment = decision.comment;
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE approvals SET status = ?, reviewer_id = ?, comment = ?, decided_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(approval.status)
        .bind(approval.reviewer_id)
        .bind(&approval.comment)
        .bind(approval.decided_at)
        .bind(approval.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict("Approval has already been decided".to_string()));
        }

        if let Some(post_id) = approval.post_id {
            let post_status = match approval.status {
                ApprovalStatus::Approved => PostStatus::Approved,
                _ => PostStatus::Draft,
            };
            sqlx::query("UPDATE content_posts SET status = ?, updated_at = ? WHERE id = ?")
                .bind(post_status)
                .bind(approval.decided_at)
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(approval)
    }
}
