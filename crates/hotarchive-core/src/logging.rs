//! Structured logging field name constants for hotarchive.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query an archival run across the catalog, the
//! workflow and the MySQL session by the same names.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Archival run failed, operator may need to inspect the schema |
//! | WARN  | Rollback performed, idempotent step skipped on re-entry |
//! | INFO  | Workflow start/finish, step completions, pool lifecycle |
//! | DEBUG | Individual statements, catalog lookups |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "core", "database", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "archiver", "catalog", "archive_session", "pool", "metadata"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "archive", "rollback", "list_partitions", "exchange_partition"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Schema the tables live in, `DATABASE()` when not overridden.
pub const SCHEMA: &str = "schema";

/// Source (partitioned) table.
pub const SOURCE_TABLE: &str = "source_table";

/// Partition being archived.
pub const PARTITION: &str = "partition";

/// Archive table receiving the partition's rows.
pub const ARCHIVE_TABLE: &str = "archive_table";

/// Workflow step (see `ArchiveStep`).
pub const STEP: &str = "step";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of partitions returned by a catalog listing.
pub const RESULT_COUNT: &str = "result_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Whether a failed run was rolled back.
pub const ROLLED_BACK: &str = "rolled_back";
