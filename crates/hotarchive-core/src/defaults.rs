//! Centralized default constants for hotarchive.
//!
//! All crates and the CLI reference these constants instead of defining
//! their own literals.

// =============================================================================
// TABLES
// =============================================================================

/// Default partitioned source table.
pub const SOURCE_TABLE: &str = "messages";

/// Default provenance table receiving one row per archived partition.
pub const METADATA_TABLE: &str = "archived_message_partitions";

/// Default record identifier column scanned for MIN/MAX.
pub const RECORD_ID_COLUMN: &str = "id";

/// Default timestamp column scanned for MIN/MAX.
pub const TIMESTAMP_COLUMN: &str = "created_at";

// =============================================================================
// PARTITIONS
// =============================================================================

/// Catch-all partition covering `MAXVALUE`. Never listed, never archived.
pub const CATCH_ALL_PARTITION: &str = "pmax";

/// Leading character of archivable partition names (`p2024_q1`).
pub const PARTITION_PREFIX: char = 'p';

/// Infix between the source table and the partition token in archive names.
pub const ARCHIVE_TABLE_INFIX: &str = "_archive_";

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// MySQL identifier length limit.
pub const MAX_IDENTIFIER_LEN: usize = 64;
