//! Image metadata backed by SQLite.

use super::{Page, RepositoryError, RepositoryResult};
use crate::models::image::ImageMetadata;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const INIT_MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

const COLUMNS: &str = "id, user_id, name, description, created_at, updated_at";

#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the user already has an image of that name.
    async fn create_image_metadata(&self, meta: &ImageMetadata) -> RepositoryResult<()>;

    async fn get_image_metadata_by_user_id_and_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> RepositoryResult<Option<ImageMetadata>>;

    async fn get_image_metadata_by_id(&self, id: Uuid) -> RepositoryResult<Option<ImageMetadata>>;

    /// One page of a user's images, oldest first, plus the user's total.
    async fn get_images_metadata_by_user_id(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> RepositoryResult<(Vec<ImageMetadata>, i64)>;

    /// One page across every user, oldest first, plus the global total.
    async fn get_all_images_metadata(&self, page: Page)
    -> RepositoryResult<(Vec<ImageMetadata>, i64)>;

    async fn update_image_metadata_details(
        &self,
        id: Uuid,
        name: &str,
        description: &str,
    ) -> RepositoryResult<ImageMetadata>;

    async fn update_image_metadata_updated_at(&self, id: Uuid) -> RepositoryResult<ImageMetadata>;

    async fn delete_image_metadata(&self, id: Uuid) -> RepositoryResult<()>;
}

#[derive(Clone)]
pub struct SqliteMetadataRepository {
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Execute the embedded schema statement by statement.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let statements = INIT_MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} migration statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataRepository for SqliteMetadataRepository {
    async fn create_image_metadata(&self, meta: &ImageMetadata) -> RepositoryResult<()> {
        let result = sqlx::query(
            "INSERT INTO images (id, user_id, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(meta.id)
        .bind(meta.user_id)
        .bind(&meta.name)
        .bind(&meta.description)
        .bind(meta.created_at)
        .bind(meta.updated_at)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(RepositoryError::AlreadyExists(meta.name.clone()))
            }
            Err(err) => Err(RepositoryError::Sqlx(err)),
        }
    }

    async fn get_image_metadata_by_user_id_and_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> RepositoryResult<Option<ImageMetadata>> {
        let row = sqlx::query_as::<_, ImageMetadata>(&format!(
            "SELECT {COLUMNS} FROM images WHERE user_id = ? AND name = ?"
        ))
        .bind(user_id)
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    async fn get_image_metadata_by_id(&self, id: Uuid) -> RepositoryResult<Option<ImageMetadata>> {
        let row =
            sqlx::query_as::<_, ImageMetadata>(&format!("SELECT {COLUMNS} FROM images WHERE id = ?"))
                .bind(id)
                .fetch_optional(&*self.db)
                .await?;
        Ok(row)
    }

    async fn get_images_metadata_by_user_id(
        &self,
        user_id: Uuid,
        page: Page,
    ) -> RepositoryResult<(Vec<ImageMetadata>, i64)> {
        let rows = sqlx::query_as::<_, ImageMetadata>(&format!(
            "SELECT {COLUMNS} FROM images WHERE user_id = ?
             ORDER BY created_at ASC, name ASC LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(&*self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM images WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&*self.db)
            .await?;

        Ok((rows, total))
    }

    async fn get_all_images_metadata(
        &self,
        page: Page,
    ) -> RepositoryResult<(Vec<ImageMetadata>, i64)> {
        let rows = sqlx::query_as::<_, ImageMetadata>(&format!(
            "SELECT {COLUMNS} FROM images
             ORDER BY created_at ASC, name ASC LIMIT ? OFFSET ?"
        ))
        .bind(i64::from(page.limit))
        .bind(page.offset())
        .fetch_all(&*self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM images")
            .fetch_one(&*self.db)
            .await?;

        Ok((rows, total))
    }

    async fn update_image_metadata_details(
        &self,
        id: Uuid,
        name: &str,
        description: &str,
    ) -> RepositoryResult<ImageMetadata> {
        let result = sqlx::query_as::<_, ImageMetadata>(&format!(
            "UPDATE images SET name = ?, description = ?, updated_at = ?
             WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&*self.db)
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(sqlx::Error::RowNotFound) => Err(RepositoryError::NotFound(id.to_string())),
            Err(err) if is_unique_violation(&err) => {
                Err(RepositoryError::AlreadyExists(name.to_string()))
            }
            Err(err) => Err(RepositoryError::Sqlx(err)),
        }
    }

    async fn update_image_metadata_updated_at(&self, id: Uuid) -> RepositoryResult<ImageMetadata> {
        sqlx::query_as::<_, ImageMetadata>(&format!(
            "UPDATE images SET updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(id.to_string()),
            other => RepositoryError::Sqlx(other),
        })
    }

    async fn delete_image_metadata(&self, id: Uuid) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Fresh in-memory database with the schema applied.
    pub(crate) async fn memory_repo() -> SqliteMetadataRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = SqliteMetadataRepository::new(Arc::new(pool));
        repo.migrate().await.unwrap();
        repo
    }

    fn record(user: Uuid, name: &str, offset_secs: i64) -> ImageMetadata {
        let mut meta = ImageMetadata::new(user, name, "desc");
        meta.created_at += chrono::Duration::seconds(offset_secs);
        meta.updated_at = meta.created_at;
        meta
    }

    #[tokio::test]
    async fn create_then_fetch_by_name_and_id() {
        let repo = memory_repo().await;
        let meta = ImageMetadata::new(Uuid::new_v4(), "cat.png", "a cat");
        repo.create_image_metadata(&meta).await.unwrap();

        let by_name = repo
            .get_image_metadata_by_user_id_and_name(meta.user_id, "cat.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, meta.id);
        assert_eq!(by_name.description, "a cat");

        let by_id = repo.get_image_metadata_by_id(meta.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "cat.png");
    }

    #[tokio::test]
    async fn names_are_scoped_per_user() {
        let repo = memory_repo().await;
        let a = ImageMetadata::new(Uuid::new_v4(), "same.png", "");
        let b = ImageMetadata::new(Uuid::new_v4(), "same.png", "");
        repo.create_image_metadata(&a).await.unwrap();
        repo.create_image_metadata(&b).await.unwrap();

        let dup = ImageMetadata::new(a.user_id, "same.png", "");
        assert!(matches!(
            repo.create_image_metadata(&dup).await,
            Err(RepositoryError::AlreadyExists(_))
        ));
        assert!(
            repo.get_image_metadata_by_user_id_and_name(Uuid::new_v4(), "same.png")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn pages_are_ordered_and_counted() {
        let repo = memory_repo().await;
        let user = Uuid::new_v4();
        for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            repo.create_image_metadata(&record(user, name, i as i64))
                .await
                .unwrap();
        }
        repo.create_image_metadata(&record(Uuid::new_v4(), "other", 0))
            .await
            .unwrap();

        let (rows, total) = repo
            .get_images_metadata_by_user_id(user, Page { page: 2, limit: 2 })
            .await
            .unwrap();
        assert_eq!(total, 5);
        let names: Vec<_> = rows.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["c", "d"]);

        let (all, total_all) = repo
            .get_all_images_metadata(Page { page: 1, limit: 25 })
            .await
            .unwrap();
        assert_eq!(total_all, 6);
        assert_eq!(all.len(), 6);
    }

    #[tokio::test]
    async fn updates_return_fresh_rows() {
        let repo = memory_repo().await;
        let meta = record(Uuid::new_v4(), "old.png", -60);
        repo.create_image_metadata(&meta).await.unwrap();

        let touched = repo.update_image_metadata_updated_at(meta.id).await.unwrap();
        assert!(touched.updated_at > meta.updated_at);
        assert_eq!(touched.created_at, meta.created_at);

        let renamed = repo
            .update_image_metadata_details(meta.id, "new.png", "renamed")
            .await
            .unwrap();
        assert_eq!(renamed.name, "new.png");
        assert_eq!(renamed.description, "renamed");
    }

    #[tokio::test]
    async fn updating_missing_rows_is_not_found() {
        let repo = memory_repo().await;
        assert!(matches!(
            repo.update_image_metadata_updated_at(Uuid::new_v4()).await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(matches!(
            repo.update_image_metadata_details(Uuid::new_v4(), "x", "y").await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_row_once() {
        let repo = memory_repo().await;
        let meta = ImageMetadata::new(Uuid::new_v4(), "gone.png", "");
        repo.create_image_metadata(&meta).await.unwrap();
        repo.delete_image_metadata(meta.id).await.unwrap();
        assert!(repo.get_image_metadata_by_id(meta.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete_image_metadata(meta.id).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let repo = memory_repo().await;
        repo.migrate().await.unwrap();
    }
}
