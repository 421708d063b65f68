//! Per-customer marketing files (branding, media, escaleta, designs)

use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use super::db::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FileCategory {
    Branding,
    Media,
    Escaleta,
    Designs,
}

impl FileCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::Branding => "branding",
            FileCategory::Media => "media",
            FileCategory::Escaleta => "escaleta",
            FileCategory::Designs => "designs",
        }
    }
}

impl std::str::FromStr for FileCategory {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "branding" => Ok(FileCategory::Branding),
            "media" => Ok(FileCategory::Media),
            "escaleta" => Ok(FileCategory::Escaleta),
            "designs" => Ok(FileCategory::Designs),
            other => Err(StoreError::Invalid(format!(
                "unknown file category '{other}' (expected branding, media, escaleta or designs)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CustomerFile {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub category: FileCategory,
    pub original_name: String,
    #[serde(skip_serializing)]
    pub stored_path: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// An upload ready to be written
#[derive(Debug, Clone)]
pub struct Upload {
    pub customer_id: Uuid,
    pub category: FileCategory,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
    pub uploaded_by: Option<Uuid>,
}

/// Keep a file name safe to join onto a directory
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    let truncated: String = cleaned.chars().take(100).collect();
    if truncated.is_empty() {
        "file".to_string()
    } else {
        truncated
    }
}

#[derive(Clone)]
pub struct FileStore {
    pool: SqlitePool,
    upload_dir: PathBuf,
}

impl FileStore {
    pub fn new(pool: SqlitePool, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            upload_dir: upload_dir.into(),
        }
    }

    /// Write the bytes under `<upload_dir>/<customer>/<category>/` and record them
    pub async fn save(&self, upload: Upload) -> Result<CustomerFile, StoreError> {
        if upload.data.is_empty() {
            return Err(StoreError::Invalid("uploaded file is empty".to_string()));
        }

        let id = Uuid::new_v4();
        let original_name = upload.file_name.trim().to_string();
        let dir = self
            .upload_dir
            .join(upload.customer_id.to_string())
            .join(upload.category.as_str());
        let path = dir.join(format!("{}-{}", id, sanitize_file_name(&original_name)));

        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&path, &upload.data).await?;

        let file = CustomerFile {
            id,
            customer_id: upload.customer_id,
            category: upload.category,
            original_name,
            stored_path: path.to_string_lossy().into_owned(),
            content_type: upload.content_type,
            size_bytes: upload.data.len() as i64,
            uploaded_by: upload.uploaded_by,
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(
            "INSERT INTO customer_files (id, customer_id, category, original_name, stored_path, \
             content_type, size_bytes, uploaded_by, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file.id)
        .bind(file.customer_id)
        .bind(file.category)
        .bind(&file.original_name)
        .bind(&file.stored_path)
        .bind(&file.content_type)
        .bind(file.size_bytes)
        .bind(file.uploaded_by)
        .bind(file.created_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = inserted {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }

        info!(
            customer_id = %file.customer_id,
            category = file.category.as_str(),
            size = file.size_bytes,
            "Stored customer file"
        );
        Ok(file)
    }

    pub async fn list(
        &self,
        customer_id: Uuid,
        category: Option<FileCategory>,
    ) -> Result<Vec<CustomerFile>, StoreError> {
        let files = sqlx::query_as::<_, CustomerFile>(
            "SELECT * FROM customer_files WHERE customer_id = ?1 AND (?2 IS NULL OR category = ?2) \
             ORDER BY created_at DESC",
        )
        .bind(customer_id)
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    /// Delete the upload directories of customers that no longer exist.
    /// Returns how many directories were removed.
    pub async fn remove_customer_dirs(&self, customer_ids: &[Uuid]) -> usize {
        let mut removed = 0;
        for id in customer_ids {
            let dir = self.upload_dir.join(id.to_string());
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Could not remove upload directory")
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::customers::seed_customer;
    use crate::store::db::test_pool;

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("logo final (v2).png"), "logo_final__v2_.png");
        assert_eq!(sanitize_file_name("..."), "file");
        assert_eq!(sanitize_file_name("C:\\temp\\brief.pdf"), "brief.pdf");
    }

    #[test]
    fn parses_categories() {
        assert_eq!("Escaleta".parse::<FileCategory>().unwrap(), FileCategory::Escaleta);
        assert!("contracts".parse::<FileCategory>().is_err());
    }

    #[tokio::test]
    async fn saves_to_disk_and_lists_by_category() {
        let pool = test_pool().await;
        let customer = seed_customer(&pool, "Café Luna").await;
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(pool, dir.path());

        let saved = store
            .save(Upload {
                customer_id: customer.id,
                category: FileCategory::Branding,
                file_name: "logo.png".to_string(),
                content_type: Some("image/png".to_string()),
                data: Bytes::from_static(b"\x89PNG fake"),
                uploaded_by: None,
            })
            .await
            .unwrap();

        assert_eq!(saved.size_bytes, 9);
        let on_disk = tokio::fs::read(&saved.stored_path).await.unwrap();
        assert_eq!(on_disk, b"\x89PNG fake");
        assert!(saved.stored_path.contains("branding"));

        assert_eq!(store.list(customer.id, None).await.unwrap().len(), 1);
        assert!(store
            .list(customer.id, Some(FileCategory::Media))
            .await
            .unwrap()
            .is_empty());

        let empty = store
            .save(Upload {
                customer_id: customer.id,
                category: FileCategory::Media,
                file_name: "empty.txt".to_string(),
                content_type: None,
                data: Bytes::new(),
                uploaded_by: None,
            })
            .await;
        assert!(matches!(empty, Err(StoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn removes_directories_of_deleted_customers() {
        let pool = test_pool().await;
        let customer = seed_customer(&pool, "Café Luna").await;
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(pool, dir.path());

        let saved = store
            .save(Upload {
                customer_id: customer.id,
                category: FileCategory::Media,
                file_name: "reel.mp4".to_string(),
                content_type: None,
                data: Bytes::from_static(b"video"),
                uploaded_by: None,
            })
            .await
            .unwrap();

        let never_uploaded = Uuid::new_v4();
        assert_eq!(store.remove_customer_dirs(&[customer.id, never_uploaded]).await, 1);
        assert!(!std::path::Path::new(&saved.stored_path).exists());
        assert!(!dir.path().join(customer.id.to_string()).exists());
    }
}
