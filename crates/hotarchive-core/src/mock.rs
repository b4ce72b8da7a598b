//! In-memory MySQL stand-in for deterministic workflow tests.
//!
//! [`MockDatabase`] implements both [`PartitionCatalog`] and
//! [`ArchiveBackend`]. It models the behaviour the archiver depends on:
//!
//! - partitioned and plain tables with rows,
//! - `EXCHANGE PARTITION` swapping rows between a partition and a table,
//! - DDL committing implicitly, so buffered inserts become durable at the
//!   next CREATE/EXCHANGE/DROP,
//! - rollback discarding only what was inserted since the last DDL.
//!
//! ## Usage
//!
//! ```rust
//! use hotarchive_core::mock::{messages_columns, MockDatabase};
//!
//! let db = MockDatabase::new()
//!     .with_partitioned_table("messages", messages_columns())
//!     .with_partition("messages", "p2024_q1", "739342", MockDatabase::rows(1, 10))
//!     .with_metadata_table("archived_message_partitions");
//!
//! assert_eq!(db.partition_names("messages"), vec!["p2024_q1".to_string()]);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::defaults::CATCH_ALL_PARTITION;
use crate::error::{Error, Result};
use crate::models::{ArchiveBounds, ArchivedPartitionMetadata, ColumnSpec, PartitionDescriptor};
use crate::traits::{ArchiveBackend, ArchiveSession, PartitionCatalog};

/// A row of a mock table: only the columns the archiver scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRow {
    pub record_id: i64,
    pub created_at: NaiveDateTime,
}

/// Operations that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Catalog,
    Begin,
    CreateTable,
    Exchange,
    Bounds,
    Insert,
    Drop,
    Commit,
    Rollback,
}

#[derive(Debug, Clone)]
struct MockPartition {
    name: String,
    description: String,
    rows: Vec<MockRow>,
}

#[derive(Debug, Clone)]
struct MockTable {
    columns: Vec<ColumnSpec>,
    partitions: Option<Vec<MockPartition>>,
    rows: Vec<MockRow>,
}

#[derive(Debug)]
struct MockState {
    tables: BTreeMap<String, MockTable>,
    metadata: BTreeMap<String, Vec<ArchivedPartitionMetadata>>,
    failures: HashSet<MockOperation>,
    concurrent_drops: HashSet<(String, String)>,
    statements: Vec<String>,
    open_sessions: usize,
    now: NaiveDateTime,
}

impl MockState {
    fn take_failure(&mut self, op: MockOperation) -> bool {
        self.failures.remove(&op)
    }

    /// Apply a drop scheduled with [`MockDatabase::drop_partition_concurrently`].
    fn apply_concurrent_drop(&mut self, table: &str, partition: &str) {
        let key = (table.to_string(), partition.to_string());
        if !self.concurrent_drops.remove(&key) {
            return;
        }
        if let Some(parts) = self.tables.get_mut(table).and_then(|t| t.partitions.as_mut()) {
            parts.retain(|p| p.name != partition);
        }
    }
}

/// Columns of the `messages` table used throughout the tests.
pub fn messages_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec {
            name: "id".to_string(),
            column_type: "bigint".to_string(),
            is_nullable: false,
        },
        ColumnSpec {
            name: "body".to_string(),
            column_type: "text".to_string(),
            is_nullable: true,
        },
        ColumnSpec {
            name: "created_at".to_string(),
            column_type: "datetime".to_string(),
            is_nullable: false,
        },
    ]
}

fn simulated(msg: impl Into<String>) -> sqlx::Error {
    sqlx::Error::Protocol(msg.into())
}

fn ddl_failure(statement: String, msg: impl Into<String>) -> Error {
    Error::DdlFailure {
        statement,
        source: simulated(msg),
    }
}

/// Shared in-memory database. Clones observe the same state.
#[derive(Clone)]
pub struct MockDatabase {
    state: Arc<Mutex<MockState>>,
}

impl MockDatabase {
    /// Empty database whose server clock reads 2024-04-02 10:00:00.
    pub fn new() -> Self {
        let now = NaiveDate::from_ymd_opt(2024, 4, 2)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap();
        Self {
            state: Arc::new(Mutex::new(MockState {
                tables: BTreeMap::new(),
                metadata: BTreeMap::new(),
                failures: HashSet::new(),
                concurrent_drops: HashSet::new(),
                statements: Vec::new(),
                open_sessions: 0,
                now,
            })),
        }
    }

    /// Rows with ids `first..=last`, one hour apart from 2024-01-01 00:00.
    pub fn rows(first: i64, last: i64) -> Vec<MockRow> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        (first..=last)
            .map(|id| MockRow {
                record_id: id,
                created_at: base + Duration::hours(id - first),
            })
            .collect()
    }

    /// Rows with ids `first..=last`, timestamps spread evenly from `start` to `end`.
    pub fn rows_spanning(
        first: i64,
        last: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<MockRow> {
        let steps = (last - first).max(1);
        let span = end - start;
        (first..=last)
            .map(|id| MockRow {
                record_id: id,
                created_at: start + span * ((id - first) as i32) / (steps as i32),
            })
            .collect()
    }

    /// Add a partitioned table with no partitions yet.
    pub fn with_partitioned_table(self, name: &str, columns: Vec<ColumnSpec>) -> Self {
        self.state.lock().unwrap().tables.insert(
            name.to_string(),
            MockTable {
                columns,
                partitions: Some(Vec::new()),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Append a partition to a partitioned table.
    pub fn with_partition(
        self,
        table: &str,
        partition: &str,
        description: &str,
        rows: Vec<MockRow>,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(parts) = state
                .tables
                .get_mut(table)
                .and_then(|t| t.partitions.as_mut())
            {
                parts.push(MockPartition {
                    name: partition.to_string(),
                    description: description.to_string(),
                    rows,
                });
            }
        }
        self
    }

    /// Add a plain, unpartitioned table.
    pub fn with_table(self, name: &str, columns: Vec<ColumnSpec>, rows: Vec<MockRow>) -> Self {
        self.state.lock().unwrap().tables.insert(
            name.to_string(),
            MockTable {
                columns,
                partitions: None,
                rows,
            },
        );
        self
    }

    /// Register a metadata table so inserts into it succeed.
    pub fn with_metadata_table(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .metadata
            .insert(name.to_string(), Vec::new());
        self
    }

    /// Make the next `op` fail once.
    pub fn fail_on(&self, op: MockOperation) {
        self.state.lock().unwrap().failures.insert(op);
    }

    /// Drop `partition` from `table` outside any session, the next time a
    /// session checks whether it exists. Pre-check reads through the catalog
    /// still see it.
    pub fn drop_partition_concurrently(&self, table: &str, partition: &str) {
        self.state
            .lock()
            .unwrap()
            .concurrent_drops
            .insert((table.to_string(), partition.to_string()));
    }

    /// Partition names of `table` including the catch-all, in definition order.
    pub fn partition_names(&self, table: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .and_then(|t| t.partitions.as_ref())
            .map(|parts| parts.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Rows of a plain table, `None` if it does not exist.
    pub fn table_rows(&self, table: &str) -> Option<Vec<MockRow>> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
    }

    /// Whether any table named `table` exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    /// Committed rows of a metadata table.
    pub fn metadata_rows(&self, table: &str) -> Vec<ArchivedPartitionMetadata> {
        self.state
            .lock()
            .unwrap()
            .metadata
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Mutating and transaction-control statements, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Forget the statement log.
    pub fn clear_statements(&self) {
        self.state.lock().unwrap().statements.clear();
    }

    /// Sessions begun and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open_sessions
    }
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartitionCatalog for MockDatabase {
    async fn list_partitions(&self, table: &str) -> Result<Vec<PartitionDescriptor>> {
        let mut state = self.state.lock().unwrap();
        if state.take_failure(MockOperation::Catalog) {
            return Err(Error::QueryFailure(simulated("catalog unavailable")));
        }

        let Some(parts) = state.tables.get(table).and_then(|t| t.partitions.as_ref()) else {
            return Ok(Vec::new());
        };

        Ok(parts
            .iter()
            .filter(|p| p.name != CATCH_ALL_PARTITION)
            .map(|p| PartitionDescriptor {
                name: p.name.clone(),
                approximate_row_count: p.rows.len() as i64,
                partition_expression: "to_days(`created_at`)".to_string(),
                partition_description: p.description.clone(),
            })
            .collect())
    }

    async fn partition_exists(&self, table: &str, partition: &str) -> Result<bool> {
        Ok(self
            .list_partitions(table)
            .await?
            .iter()
            .any(|p| p.name == partition))
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.has_table(table))
    }
}

#[async_trait]
impl ArchiveBackend for MockDatabase {
    type Session = MockSession;

    async fn begin(&self) -> Result<MockSession> {
        let mut state = self.state.lock().unwrap();
        if state.take_failure(MockOperation::Begin) {
            return Err(Error::Database(simulated("too many connections")));
        }
        state.open_sessions += 1;
        state.statements.push("BEGIN".to_string());
        drop(state);

        Ok(MockSession {
            db: self.clone(),
            pending: Vec::new(),
        })
    }
}

/// A session on [`MockDatabase`]. Inserts are buffered until commit or the
/// next DDL statement.
pub struct MockSession {
    db: MockDatabase,
    pending: Vec<(String, ArchivedPartitionMetadata)>,
}

/// DDL commits implicitly: buffered inserts become durable.
fn implicit_commit(pending: &mut Vec<(String, ArchivedPartitionMetadata)>, state: &mut MockState) {
    for (table, row) in pending.drain(..) {
        state.metadata.entry(table).or_default().push(row);
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        let mut state = self.db.state.lock().unwrap();
        state.open_sessions = state.open_sessions.saturating_sub(1);
    }
}

#[async_trait]
impl ArchiveSession for MockSession {
    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(self.db.has_table(table))
    }

    async fn partition_exists(&mut self, table: &str, partition: &str) -> Result<bool> {
        self.db
            .state
            .lock()
            .unwrap()
            .apply_concurrent_drop(table, partition);
        Ok(self
            .db
            .partition_names(table)
            .iter()
            .any(|p| p == partition))
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnSpec>> {
        let state = self.db.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn create_archive_table(
        &mut self,
        archive_table: &str,
        source_table: &str,
    ) -> Result<()> {
        let statement = format!("CREATE TABLE `{}` LIKE `{}`", archive_table, source_table);
        let mut state = self.db.state.lock().unwrap();
        implicit_commit(&mut self.pending, &mut state);

        if state.take_failure(MockOperation::CreateTable) {
            return Err(ddl_failure(statement, "simulated create failure"));
        }
        if state.tables.contains_key(archive_table) {
            return Err(ddl_failure(
                statement,
                format!("Table '{}' already exists", archive_table),
            ));
        }
        let Some(columns) = state.tables.get(source_table).map(|t| t.columns.clone()) else {
            return Err(ddl_failure(
                statement,
                format!("Table '{}' doesn't exist", source_table),
            ));
        };

        state.tables.insert(
            archive_table.to_string(),
            MockTable {
                columns,
                partitions: None,
                rows: Vec::new(),
            },
        );
        state.statements.push(statement);
        state
            .statements
            .push(format!("ALTER TABLE `{}` REMOVE PARTITIONING", archive_table));
        Ok(())
    }

    async fn table_has_rows(&mut self, table: &str) -> Result<bool> {
        let state = self.db.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .map(|t| match &t.partitions {
                Some(parts) => parts.iter().any(|p| !p.rows.is_empty()),
                None => !t.rows.is_empty(),
            })
            .unwrap_or(false))
    }

    async fn partition_has_rows(&mut self, table: &str, partition: &str) -> Result<bool> {
        let state = self.db.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .and_then(|t| t.partitions.as_ref())
            .and_then(|parts| parts.iter().find(|p| p.name == partition))
            .map(|p| !p.rows.is_empty())
            .unwrap_or(false))
    }

    async fn exchange_partition(
        &mut self,
        source_table: &str,
        partition: &str,
        archive_table: &str,
    ) -> Result<()> {
        let statement = format!(
            "ALTER TABLE `{}` EXCHANGE PARTITION `{}` WITH TABLE `{}`",
            source_table, partition, archive_table
        );
        let mut state = self.db.state.lock().unwrap();
        implicit_commit(&mut self.pending, &mut state);

        if state.take_failure(MockOperation::Exchange) {
            return Err(ddl_failure(statement, "simulated exchange failure"));
        }

        let Some(archive) = state.tables.get(archive_table).cloned() else {
            return Err(ddl_failure(
                statement,
                format!("Table '{}' doesn't exist", archive_table),
            ));
        };
        if archive.partitions.is_some() {
            return Err(ddl_failure(
                statement,
                "Table to exchange with partition is partitioned",
            ));
        }

        let Some(source) = state.tables.get_mut(source_table) else {
            return Err(ddl_failure(
                statement,
                format!("Table '{}' doesn't exist", source_table),
            ));
        };
        if source.columns != archive.columns {
            return Err(ddl_failure(
                statement,
                "Tables have different definitions",
            ));
        }
        let Some(part) = source
            .partitions
            .as_mut()
            .and_then(|parts| parts.iter_mut().find(|p| p.name == partition))
        else {
            return Err(ddl_failure(
                statement,
                format!("Unknown partition '{}'", partition),
            ));
        };

        let moved = std::mem::replace(&mut part.rows, archive.rows);
        if let Some(target) = state.tables.get_mut(archive_table) {
            target.rows = moved;
        }
        state.statements.push(statement);
        Ok(())
    }

    async fn archive_bounds(
        &mut self,
        archive_table: &str,
        _record_id_column: &str,
        _timestamp_column: &str,
    ) -> Result<ArchiveBounds> {
        let mut state = self.db.state.lock().unwrap();
        if state.take_failure(MockOperation::Bounds) {
            return Err(Error::QueryFailure(simulated("simulated scan failure")));
        }
        let Some(table) = state.tables.get(archive_table) else {
            return Err(Error::QueryFailure(simulated(format!(
                "Table '{}' doesn't exist",
                archive_table
            ))));
        };

        let rows = &table.rows;
        Ok(ArchiveBounds {
            min_record_id: rows.iter().map(|r| r.record_id).min(),
            max_record_id: rows.iter().map(|r| r.record_id).max(),
            start_timestamp: rows.iter().map(|r| r.created_at).min(),
            end_timestamp: rows.iter().map(|r| r.created_at).max(),
            server_now: state.now,
        })
    }

    async fn metadata_recorded(
        &mut self,
        metadata_table: &str,
        archive_table: &str,
    ) -> Result<bool> {
        let state = self.db.state.lock().unwrap();
        let committed = state
            .metadata
            .get(metadata_table)
            .map(|rows| rows.iter().any(|r| r.archive_table_name == archive_table))
            .unwrap_or(false);
        let pending = self
            .pending
            .iter()
            .any(|(t, r)| t == metadata_table && r.archive_table_name == archive_table);
        Ok(committed || pending)
    }

    async fn insert_metadata(
        &mut self,
        metadata_table: &str,
        metadata: &ArchivedPartitionMetadata,
    ) -> Result<()> {
        let mut state = self.db.state.lock().unwrap();
        if state.take_failure(MockOperation::Insert) || !state.metadata.contains_key(metadata_table)
        {
            return Err(Error::MetadataInsertFailure {
                table: metadata_table.to_string(),
                source: simulated(format!("insert into '{}' rejected", metadata_table)),
            });
        }
        state.statements.push(format!(
            "INSERT INTO `{}` ({})",
            metadata_table, metadata.archive_table_name
        ));
        drop(state);

        self.pending
            .push((metadata_table.to_string(), metadata.clone()));
        Ok(())
    }

    async fn drop_partition(&mut self, table: &str, partition: &str) -> Result<()> {
        let statement = format!("ALTER TABLE `{}` DROP PARTITION `{}`", table, partition);
        let mut state = self.db.state.lock().unwrap();
        implicit_commit(&mut self.pending, &mut state);

        if state.take_failure(MockOperation::Drop) {
            return Err(ddl_failure(statement, "simulated drop failure"));
        }
        let Some(parts) = state
            .tables
            .get_mut(table)
            .and_then(|t| t.partitions.as_mut())
        else {
            return Err(ddl_failure(
                statement,
                format!("Table '{}' is not partitioned", table),
            ));
        };
        let before = parts.len();
        parts.retain(|p| p.name != partition);
        if parts.len() == before {
            return Err(ddl_failure(
                statement,
                format!("Unknown partition '{}'", partition),
            ));
        }
        state.statements.push(statement);
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        let db = self.db.clone();
        let mut state = db.state.lock().unwrap();
        if state.take_failure(MockOperation::Commit) {
            return Err(Error::Database(simulated("simulated commit failure")));
        }
        implicit_commit(&mut self.pending, &mut state);
        state.statements.push("COMMIT".to_string());
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        let db = self.db.clone();
        let mut state = db.state.lock().unwrap();
        self.pending.clear();
        if state.take_failure(MockOperation::Rollback) {
            return Err(Error::Database(simulated("simulated rollback failure")));
        }
        state.statements.push("ROLLBACK".to_string());
        Ok(())
    }
}
