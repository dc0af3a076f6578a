//! Folder repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use docshelf_core::{new_v7, Error, Folder, FolderColor, FolderRepository, Result};

/// PostgreSQL implementation of FolderRepository.
#[derive(Clone)]
pub struct PgFolderRepository {
    pool: Pool<Postgres>,
}

impl PgFolderRepository {
    /// Create a new PgFolderRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn folder_from_row(row: &PgRow) -> Result<Folder> {
    let color: String = row.get("color");
    Ok(Folder {
        id: row.get("id"),
        name: row.get("name"),
        color: color.parse()?,
        created_at: row.get("created_at"),
        document_count: row.get("document_count"),
    })
}

#[async_trait]
impl FolderRepository for PgFolderRepository {
    async fn list(&self) -> Result<Vec<Folder>> {
        let rows = sqlx::query(
            r#"
            SELECT f.id, f.name, f.color, f.created_at,
                   COALESCE((SELECT COUNT(*) FROM document WHERE folder_id = f.id), 0) AS document_count
            FROM folder f
            ORDER BY f.created_at DESC, f.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(folder_from_row).collect()
    }

    async fn create(&self, name: &str, color: FolderColor) -> Result<Option<Folder>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("folder name must not be empty".to_string()));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO folder (id, name, color, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, color, created_at, 0::BIGINT AS document_count
            "#,
        )
        .bind(new_v7())
        .bind(name)
        .bind(color.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if row.is_none() {
            debug!(
                subsystem = "db",
                component = "folders",
                op = "create",
                folder = name,
                "Folder name already taken"
            );
        }
        row.as_ref().map(folder_from_row).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Folder>> {
        let row = sqlx::query(
            r#"
            SELECT f.id, f.name, f.color, f.created_at,
                   COALESCE((SELECT COUNT(*) FROM document WHERE folder_id = f.id), 0) AS document_count
            FROM folder f
            WHERE f.name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(folder_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Members go back to root before the folder row disappears.
        let moved = sqlx::query("UPDATE document SET folder_id = NULL WHERE folder_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let deleted = sqlx::query("DELETE FROM folder WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("folder {}", id)));
        }

        tx.commit().await.map_err(Error::Database)?;
        debug!(
            subsystem = "db",
            component = "folders",
            op = "delete",
            folder_id = %id,
            reassigned = moved.rows_affected(),
            "Folder deleted"
        );
        Ok(())
    }
}
