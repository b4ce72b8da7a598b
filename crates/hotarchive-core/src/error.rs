//! Error types for hotarchive.

use thiserror::Error;

use crate::archiver::ArchiveStep;

/// Result type alias using hotarchive's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for hotarchive operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The named partition is not present in the source table
    #[error("Partition '{partition}' does not exist in table '{table}'")]
    PartitionNotFound { table: String, partition: String },

    /// The naming strategy rejected the partition name
    #[error("Invalid partition name: {0}")]
    InvalidPartitionName(String),

    /// Catalog or metadata read failed
    #[error("Query failed: {0}")]
    QueryFailure(#[source] sqlx::Error),

    /// The archive table holds no rows after the exchange
    #[error("Archive table '{0}' is empty or its boundaries are null")]
    EmptyArchiveMetadata(String),

    /// A CREATE / ALTER / EXCHANGE / DROP statement failed
    #[error("DDL failed ({statement}): {source}")]
    DdlFailure {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// Writing the provenance row failed
    #[error("Failed to insert metadata into '{table}': {source}")]
    MetadataInsertFailure {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// A reused archive table does not match the source table's columns
    #[error("Archive table '{archive_table}' does not match '{source_table}': {reason}")]
    IncompatibleArchiveTable {
        archive_table: String,
        source_table: String,
        reason: String,
    },

    /// Both the archive table and the partition hold rows
    #[error("Archive table '{0}' already holds rows and the partition is not empty")]
    ArchiveTableNotEmpty(String),

    /// Connection or transaction control failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error was raised before anything could have been mutated.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::PartitionNotFound { .. }
                | Error::InvalidPartitionName(_)
                | Error::Config(_)
                | Error::InvalidInput(_)
        )
    }
}

/// A failed archival run, tagged with the workflow step that failed.
#[derive(Error, Debug)]
#[error("Archival of partition '{partition}' failed at step '{step}': {error}")]
pub struct ArchiveFailure {
    /// Partition the run was archiving.
    pub partition: String,
    /// Step at which the workflow aborted.
    pub step: ArchiveStep,
    /// Underlying cause.
    #[source]
    pub error: Error,
    /// Whether the enclosing transaction was rolled back cleanly.
    ///
    /// Always `false` for failures before the transactional region.
    pub rolled_back: bool,
}

impl ArchiveFailure {
    pub(crate) fn before_transaction(partition: &str, step: ArchiveStep, error: Error) -> Self {
        Self {
            partition: partition.to_string(),
            step,
            error,
            rolled_back: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_partition_not_found() {
        let err = Error::PartitionNotFound {
            table: "messages".to_string(),
            partition: "p2024_q1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Partition 'p2024_q1' does not exist in table 'messages'"
        );
    }

    #[test]
    fn test_error_display_invalid_partition_name() {
        let err = Error::InvalidPartitionName("2024_q1".to_string());
        assert_eq!(err.to_string(), "Invalid partition name: 2024_q1");
    }

    #[test]
    fn test_error_display_empty_archive() {
        let err = Error::EmptyArchiveMetadata("messages_archive_2024_Q1".to_string());
        assert!(err.to_string().contains("messages_archive_2024_Q1"));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_error_display_ddl_failure() {
        let err = Error::DdlFailure {
            statement: "ALTER TABLE `messages` DROP PARTITION `p1`".to_string(),
            source: sqlx::Error::Protocol("lock wait timeout".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("DDL failed (ALTER TABLE `messages` DROP PARTITION `p1`)"));
        assert!(msg.contains("lock wait timeout"));
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("source_table is required".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: source_table is required"
        );
    }

    #[test]
    fn test_is_precondition() {
        assert!(Error::InvalidPartitionName("x".to_string()).is_precondition());
        assert!(Error::PartitionNotFound {
            table: "t".to_string(),
            partition: "p".to_string()
        }
        .is_precondition());
        assert!(!Error::EmptyArchiveMetadata("a".to_string()).is_precondition());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_precondition());
    }

    #[test]
    fn test_archive_failure_display_names_step() {
        let failure = ArchiveFailure::before_transaction(
            "p2024_q1",
            ArchiveStep::ResolveName,
            Error::InvalidPartitionName("p2024_q1".to_string()),
        );
        let msg = failure.to_string();
        assert!(msg.contains("p2024_q1"));
        assert!(msg.contains("resolve_name"));
        assert!(!failure.rolled_back);
    }

    #[test]
    fn test_archive_failure_exposes_source() {
        use std::error::Error as _;

        let failure = ArchiveFailure::before_transaction(
            "p1",
            ArchiveStep::ValidateExistence,
            Error::PartitionNotFound {
                table: "messages".to_string(),
                partition: "p1".to_string(),
            },
        );
        let source = failure.source().expect("source should be set");
        assert!(source.to_string().contains("does not exist"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
        assert_send::<ArchiveFailure>();
        assert_sync::<ArchiveFailure>();
    }

    #[test]
    fn test_from_sqlx_error() {
        let err: Error = sqlx::Error::RowNotFound.into();
        match err {
            Error::Database(_) => {}
            _ => panic!("Expected Database error"),
        }
    }
}
