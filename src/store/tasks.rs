//! Team tasks (kanban board)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::db::StoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub customer_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub customer_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub assignee_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
}

/// Number of tasks in one kanban column
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusCount {
    pub status: TaskStatus,
    pub count: i64,
}

/// Team dashboard numbers
#[derive(Debug, Clone, Serialize)]
pub struct TaskDashboard {
    pub by_status: Vec<StatusCount>,
    pub overdue: i64,
}

#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks \
             WHERE (?1 IS NULL OR assignee_id = ?1) \
               AND (?2 IS NULL OR customer_id = ?2) \
               AND (?3 IS NULL OR status = ?3) \
             ORDER BY due_date IS NULL, due_date, created_at",
        )
        .bind(filter.assignee_id)
        .bind(filter.customer_id)
        .bind(filter.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    pub async fn create(&self, new: NewTask, created_by: Option<Uuid>) -> Result<Task, StoreError> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::Invalid("title is required".to_string()));
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title,
            description: new.description,
            customer_id: new.customer_id,
            assignee_id: new.assignee_id,
            created_by,
            status: new.status,
            priority: new.priority,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO tasks (id, title, description, customer_id, assignee_id, created_by, \
             status, priority, due_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.customer_id)
        .bind(task.assignee_id)
        .bind(task.created_by)
        .bind(task.status)
        .bind(task.priority)
        .bind(task.due_date)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(task)
    }

    pub async fn update(&self, id: Uuid, update: TaskUpdate) -> Result<Task, StoreError> {
        let mut task = self.get(id).await?.ok_or(StoreError::NotFound("Task"))?;

        if let Some(title) = update.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(StoreError::Invalid("title cannot be empty".to_string()));
            }
            task.title = title;
        }
        if update.description.is_some() {
            task.description = update.description;
        }
        if update.customer_id.is_some() {
            task.customer_id = update.customer_id;
        }
        if update.assignee_id.is_some() {
            task.assignee_id = update.assignee_id;
        }
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if update.due_date.is_some() {
            task.due_date = update.due_date;
        }
        task.updated_at = Utc::now();

        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, customer_id = ?, assignee_id = ?, \
             status = ?, priority = ?, due_date = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.customer_id)
        .bind(task.assignee_id)
        .bind(task.status)
        .bind(task.priority)
        .bind(task.due_date)
        .bind(task.updated_at)
        .bind(task.id)
        .execute(&self.pool)
        .await?;

        Ok(task)
    }

    /// Column counts (every status present, zero when empty) and overdue open tasks
    pub async fn dashboard(
        &self,
        assignee_id: Option<Uuid>,
        today: NaiveDate,
    ) -> Result<TaskDashboard, StoreError> {
        let rows: Vec<(TaskStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM tasks \
             WHERE (?1 IS NULL OR assignee_id = ?1) GROUP BY status",
        )
        .bind(assignee_id)
        .fetch_all(&self.pool)
        .await?;

        let by_status = TaskStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: rows
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map(|(_, n)| *n)
                    .unwrap_or(0),
            })
            .collect();

        let overdue: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks \
             WHERE (?1 IS NULL OR assignee_id = ?1) AND status != 'done' \
               AND due_date IS NOT NULL AND due_date < ?2",
        )
        .bind(assignee_id)
        .bind(today)
        .fetch_one(&self.pool)
        .await?;

        Ok(TaskDashboard { by_status, overdue })
    }
}
