//! # docshelf-db
//!
//! PostgreSQL store for docshelf.
//!
//! This crate provides:
//! - Connection pool management and a runtime connection lifecycle
//! - Repository implementations for documents, folders and fragments
//! - The transactional ingest store used by the pipeline
//!
//! ## Example
//!
//! ```rust,ignore
//! use docshelf_db::{Database, DocumentRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/docshelf").await?;
//!     for doc in db.documents.list().await? {
//!         println!("{} ({})", doc.name, doc.status);
//!     }
//!     Ok(())
//! }
//! ```
pub mod connection;
pub mod documents;
pub mod folders;
pub mod fragments;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use docshelf_core::*;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use documents::PgDocumentRepository;
pub use folders::PgFolderRepository;
pub use fragments::PgFragmentRepository;
pub use pool::{create_pool_with_config, create_pool_with_options, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Document repository, also the pipeline's ingest store.
    pub documents: PgDocumentRepository,
    /// Folder repository.
    pub folders: PgFolderRepository,
    /// Text and image fragment edits.
    pub fragments: PgFragmentRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            folders: PgFolderRepository::new(pool.clone()),
            fragments: PgFragmentRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Round-trip a trivial query to prove the server answers.
    pub async fn ping(&self) -> Result<chrono::DateTime<chrono::Utc>> {
        let now: chrono::DateTime<chrono::Utc> = sqlx::query_scalar("SELECT NOW()")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(now)
    }

    /// Folders and documents in one call, for an initial view.
    pub async fn library(&self) -> Result<LibrarySnapshot> {
        let folders = FolderRepository::list(&self.folders).await?;
        let documents = DocumentRepository::list(&self.documents).await?;
        Ok(LibrarySnapshot { folders, documents })
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map a unique-constraint violation to [`Error::AlreadyExists`].
pub(crate) fn map_unique_violation(err: sqlx::Error, what: impl FnOnce() -> String) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::AlreadyExists(what())
        }
        _ => Error::Database(err),
    }
}
