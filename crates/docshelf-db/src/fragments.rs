//! Text and image fragment edits.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use docshelf_core::{Error, FragmentRepository, Result};

/// PostgreSQL implementation of FragmentRepository.
#[derive(Clone)]
pub struct PgFragmentRepository {
    pool: Pool<Postgres>,
}

impl PgFragmentRepository {
    /// Create a new PgFragmentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FragmentRepository for PgFragmentRepository {
    async fn update_text(&self, id: Uuid, content: &str) -> Result<()> {
        let result = sqlx::query("UPDATE text_fragment SET content = $1 WHERE id = $2")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("text fragment {}", id)));
        }
        Ok(())
    }

    async fn delete_text(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM text_fragment WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("text fragment {}", id)));
        }
        Ok(())
    }

    async fn delete_image(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM image_fragment WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("image fragment {}", id)));
        }
        Ok(())
    }
}
