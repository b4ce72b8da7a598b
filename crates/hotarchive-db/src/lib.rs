//! # hotarchive-db
//!
//! MySQL database layer for hotarchive.
//!
//! This crate provides:
//! - Connection pool management
//! - [`MySqlPartitionCatalog`] over `INFORMATION_SCHEMA.PARTITIONS`
//! - [`MySqlArchiveBackend`], whose sessions run the archival DDL and the
//!   metadata insert on one manual-commit connection
//! - [`MySqlMetadataRepository`] for reading archival history
//!
//! ## Example
//!
//! ```rust,ignore
//! use hotarchive_core::{ArchiverConfig, PrefixNamingStrategy};
//! use hotarchive_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("mysql://localhost/chat").await?;
//!
//!     let config = ArchiverConfig::builder()
//!         .source_table("messages")
//!         .metadata_table("archived_message_partitions")
//!         .archive_name_strategy(PrefixNamingStrategy::new("messages").into_strategy())
//!         .build()?;
//!
//!     let metadata = db.archiver(config).archive("p2024_q1").await?;
//!     println!("Archived into {}", metadata.archive_table_name);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod metadata;
pub mod pool;
pub mod session;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

pub use hotarchive_core::*;

pub use catalog::MySqlPartitionCatalog;
pub use metadata::MySqlMetadataRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use session::{MySqlArchiveBackend, MySqlArchiveSession};

/// Archiver wired to the MySQL catalog and backend.
pub type MySqlPartitionArchiver = PartitionArchiver<MySqlPartitionCatalog, MySqlArchiveBackend>;

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::MySqlPool,
    /// Partition inventory reads.
    pub catalog: MySqlPartitionCatalog,
    /// Archive session factory.
    pub backend: MySqlArchiveBackend,
    /// Archival history reads.
    pub metadata: MySqlMetadataRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::MySqlPool) -> Self {
        Self {
            catalog: MySqlPartitionCatalog::new(pool.clone()),
            backend: MySqlArchiveBackend::new(pool.clone()),
            metadata: MySqlMetadataRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect to the database with the default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Connect to the database with a custom pool configuration.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::new(pool))
    }

    /// Point the catalog, the archive sessions and the history reads at
    /// `schema` instead of each connection's `DATABASE()`.
    pub fn with_schema(self, schema: &str) -> Self {
        Self {
            catalog: self.catalog.with_schema(schema),
            backend: self.backend.with_schema(schema),
            metadata: self.metadata.with_schema(schema),
            pool: self.pool,
        }
    }

    /// Build an archiver sharing this context's pool.
    pub fn archiver(&self, config: ArchiverConfig) -> MySqlPartitionArchiver {
        PartitionArchiver::new(self.catalog.clone(), self.backend.clone(), config)
    }

    /// Log current pool health metrics.
    pub fn log_pool_metrics(&self) {
        log_pool_metrics(&self.pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_schema_reaches_every_component() {
        let pool = sqlx::MySqlPool::connect_lazy("mysql://localhost/chat").unwrap();

        let db = Database::new(pool.clone());
        assert_eq!(db.catalog.schema(), None);
        assert_eq!(db.backend.schema(), None);
        assert_eq!(db.metadata.schema(), None);

        let db = Database::new(pool).with_schema("chat_archive");
        assert_eq!(db.catalog.schema(), Some("chat_archive"));
        assert_eq!(db.backend.schema(), Some("chat_archive"));
        assert_eq!(db.metadata.schema(), Some("chat_archive"));
    }
}
