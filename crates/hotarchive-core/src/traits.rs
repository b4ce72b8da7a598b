//! Core traits for hotarchive abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability. The MySQL
//! implementations live in `hotarchive-db`; [`crate::mock`] provides an
//! in-memory one.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// CATALOG
// =============================================================================

/// Read-only view of a schema's partition inventory.
#[async_trait]
pub trait PartitionCatalog: Send + Sync {
    /// List the partitions of `table` in catalog order.
    ///
    /// The catch-all partition is never included.
    async fn list_partitions(&self, table: &str) -> Result<Vec<PartitionDescriptor>>;

    /// Whether `partition` is an archivable partition of `table`.
    ///
    /// Consistent with [`list_partitions`](Self::list_partitions): returns
    /// `false` for the catch-all partition.
    async fn partition_exists(&self, table: &str, partition: &str) -> Result<bool>;

    /// Whether a base table named `table` exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;
}

// =============================================================================
// ARCHIVAL SESSION
// =============================================================================

/// Source of transactional archive sessions.
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    type Session: ArchiveSession;

    /// Acquire a dedicated connection and open a transaction on it.
    async fn begin(&self) -> Result<Self::Session>;
}

/// One connection with an open transaction, used for steps 3 through 8 of
/// an archival run.
///
/// DDL methods may commit implicitly on engines with non-transactional DDL;
/// implementations document which statements survive a rollback.
#[async_trait]
pub trait ArchiveSession: Send {
    /// Whether a base table named `table` exists.
    async fn table_exists(&mut self, table: &str) -> Result<bool>;

    /// Whether `partition` still exists in `table`.
    async fn partition_exists(&mut self, table: &str, partition: &str) -> Result<bool>;

    /// Columns of `table` in ordinal order.
    async fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnSpec>>;

    /// Create `archive_table` with the structure of `source_table`, unpartitioned.
    async fn create_archive_table(&mut self, archive_table: &str, source_table: &str)
        -> Result<()>;

    /// Whether `table` holds at least one row.
    async fn table_has_rows(&mut self, table: &str) -> Result<bool>;

    /// Whether `partition` of `table` holds at least one row.
    async fn partition_has_rows(&mut self, table: &str, partition: &str) -> Result<bool>;

    /// Swap the rows of `partition` with the rows of `archive_table`.
    async fn exchange_partition(
        &mut self,
        source_table: &str,
        partition: &str,
        archive_table: &str,
    ) -> Result<()>;

    /// MIN/MAX of the record id and timestamp columns, plus the server clock.
    async fn archive_bounds(
        &mut self,
        archive_table: &str,
        record_id_column: &str,
        timestamp_column: &str,
    ) -> Result<ArchiveBounds>;

    /// Whether `metadata_table` already records `archive_table`.
    async fn metadata_recorded(&mut self, metadata_table: &str, archive_table: &str)
        -> Result<bool>;

    /// Insert one provenance row.
    async fn insert_metadata(
        &mut self,
        metadata_table: &str,
        metadata: &ArchivedPartitionMetadata,
    ) -> Result<()>;

    /// Remove `partition` from `table`'s partition definition.
    async fn drop_partition(&mut self, table: &str, partition: &str) -> Result<()>;

    /// Commit and release the connection.
    async fn commit(self) -> Result<()>;

    /// Roll back and release the connection.
    async fn rollback(self) -> Result<()>;
}
