//! Document repository implementation.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use docshelf_core::{
    new_v7, Document, DocumentContent, DocumentRepository, DocumentStatus, Error, ImageFragment,
    IngestStore, NewDocument, RawFile, Result, TextFragment,
};

use crate::map_unique_violation;

const DOCUMENT_COLUMNS: &str = r#"
    d.id, d.file_name, d.file_size, d.upload_date, d.processed_status,
    d.folder_id, f.name AS folder_name, d.tags
"#;

/// PostgreSQL implementation of DocumentRepository and IngestStore.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    /// Create a new PgDocumentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Resolve a folder name to its id, or fail with `FolderNotFound`.
    async fn resolve_folder(&self, folder_name: Option<&str>) -> Result<Option<Uuid>> {
        let Some(name) = folder_name else {
            return Ok(None);
        };
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM folder WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        id.map(Some)
            .ok_or_else(|| Error::FolderNotFound(name.to_string()))
    }
}

fn document_from_row(row: &PgRow) -> Result<Document> {
    let status: String = row.get("processed_status");
    Ok(Document {
        id: row.get("id"),
        name: row.get("file_name"),
        size: row.get("file_size"),
        upload_date: row.get("upload_date"),
        status: status.parse()?,
        folder_id: row.get("folder_id"),
        folder_name: row.get("folder_name"),
        tags: row.get::<Vec<String>, _>("tags"),
        persisted: true,
    })
}

#[async_trait]
impl IngestStore for PgDocumentRepository {
    async fn name_exists(&self, name: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM document WHERE file_name = $1)")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(exists)
    }

    async fn commit_document(&self, doc: NewDocument) -> Result<Uuid> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let raw_id: Uuid =
            sqlx::query_scalar("INSERT INTO raw_payload (id, file_data) VALUES ($1, $2) RETURNING id")
                .bind(new_v7())
                .bind(&doc.raw)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;

        sqlx::query(
            r#"
            INSERT INTO document (id, raw_id, file_name, file_size, upload_date, processed_status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(doc.id)
        .bind(raw_id)
        .bind(&doc.name)
        .bind(doc.size)
        .bind(doc.upload_date)
        .bind(DocumentStatus::Ready.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, || format!("document named {}", doc.name)))?;

        for fragment in &doc.text_fragments {
            sqlx::query(
                r#"
                INSERT INTO text_fragment (id, document_id, content, chunk_index, metadata)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(new_v7())
            .bind(doc.id)
            .bind(&fragment.content)
            .bind(fragment.chunk_index)
            .bind(&fragment.metadata)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        for image in &doc.image_fragments {
            sqlx::query(
                r#"
                INSERT INTO image_fragment (id, document_id, label, image_data, image_index)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(new_v7())
            .bind(doc.id)
            .bind(&image.label)
            .bind(&image.data)
            .bind(image.image_index)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "documents",
            op = "commit",
            document_id = %doc.id,
            file_name = %doc.name,
            chunk_count = doc.text_fragments.len(),
            image_count = doc.image_fragments.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Document committed"
        );
        Ok(doc.id)
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn list(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM document d
            LEFT JOIN folder f ON f.id = d.folder_id
            ORDER BY d.upload_date DESC, d.id DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(document_from_row).collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM document d
            LEFT JOIN folder f ON f.id = d.folder_id
            WHERE d.id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        // The document row cascades from its raw payload, fragments from the document.
        let result = sqlx::query(
            "DELETE FROM raw_payload WHERE id = (SELECT raw_id FROM document WHERE id = $1)",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        debug!(
            subsystem = "db",
            component = "documents",
            op = "delete",
            document_id = %id,
            "Document deleted"
        );
        Ok(())
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM raw_payload WHERE id IN (SELECT raw_id FROM document WHERE id = ANY($1))",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn move_to_folder(&self, id: Uuid, folder_name: Option<&str>) -> Result<()> {
        let folder_id = self.resolve_folder(folder_name).await?;
        let result = sqlx::query("UPDATE document SET folder_id = $1 WHERE id = $2")
            .bind(folder_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn move_many(&self, ids: &[Uuid], folder_name: Option<&str>) -> Result<u64> {
        let folder_id = self.resolve_folder(folder_name).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("UPDATE document SET folder_id = $1 WHERE id = ANY($2)")
            .bind(folder_id)
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn set_tags(&self, id: Uuid, tags: &[String]) -> Result<()> {
        let result = sqlx::query("UPDATE document SET tags = $1 WHERE id = $2")
            .bind(tags)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn content(&self, id: Uuid) -> Result<DocumentContent> {
        let file_name: String =
            sqlx::query_scalar("SELECT file_name FROM document WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?
                .ok_or(Error::DocumentNotFound(id))?;

        let text_rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, content, metadata
            FROM text_fragment
            WHERE document_id = $1
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let image_rows = sqlx::query(
            r#"
            SELECT id, document_id, image_index, label, image_data
            FROM image_fragment
            WHERE document_id = $1
            ORDER BY image_index ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let text_fragments = text_rows
            .into_iter()
            .map(|r| TextFragment {
                id: r.get("id"),
                document_id: r.get("document_id"),
                chunk_index: r.get("chunk_index"),
                content: r.get("content"),
                metadata: r.get("metadata"),
            })
            .collect();

        let images = image_rows
            .into_iter()
            .map(|r| {
                ImageFragment {
                    id: r.get("id"),
                    document_id: r.get("document_id"),
                    image_index: r.get("image_index"),
                    label: r.get("label"),
                    data: r.get("image_data"),
                }
                .to_view()
            })
            .collect();

        Ok(DocumentContent {
            document_id: id,
            file_name,
            text_fragments,
            images,
        })
    }

    async fn raw_file(&self, id: Uuid) -> Result<RawFile> {
        let row = sqlx::query(
            r#"
            SELECT d.file_name, r.file_data
            FROM document d
            JOIN raw_payload r ON r.id = d.raw_id
            WHERE d.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::DocumentNotFound(id))?;

        Ok(RawFile {
            file_name: row.get("file_name"),
            data: row.get("file_data"),
        })
    }
}
