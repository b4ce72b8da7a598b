//! Partition archival workflow.
//!
//! [`PartitionArchiver::archive`] moves one partition of the configured
//! source table into a standalone archive table and records provenance:
//!
//! | # | step | transactional |
//! |---|------|---------------|
//! | 1 | [`ResolveName`](ArchiveStep::ResolveName): apply the naming strategy | no |
//! | 2 | [`ValidateExistence`](ArchiveStep::ValidateExistence): catalog lookup | no |
//! | 3 | [`EnsureArchiveTable`](ArchiveStep::EnsureArchiveTable): create or reuse | yes |
//! | 4 | [`ExchangeData`](ArchiveStep::ExchangeData): partition exchange | yes |
//! | 5 | [`DeriveMetadata`](ArchiveStep::DeriveMetadata): MIN/MAX scan | yes |
//! | 6 | [`PersistMetadata`](ArchiveStep::PersistMetadata): provenance insert | yes |
//! | 7 | [`DropPartition`](ArchiveStep::DropPartition): drop the emptied partition | yes |
//! | 8 | [`Commit`](ArchiveStep::Commit) | yes |
//!
//! Steps 1 and 2 never mutate anything. A failure in steps 3 to 7 rolls the
//! session back. On MySQL the CREATE, EXCHANGE and DROP statements commit
//! implicitly, so a rollback only undoes DML issued since the last DDL. To
//! make re-invoking `archive` with the same partition safe, each step checks
//! before it acts:
//!
//! - step 3 reuses an existing archive table after a column compatibility check,
//! - step 4 skips the exchange when the archive table already holds the rows
//!   and the partition is empty,
//! - step 6 skips the insert when the archive table is already recorded,
//! - step 7 tolerates a partition that is already gone.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::ArchiverConfig;
use crate::error::{ArchiveFailure, Error, Result};
use crate::models::{ArchivePlan, ArchivedPartitionMetadata, ColumnSpec};
use crate::traits::{ArchiveBackend, ArchiveSession, PartitionCatalog};

/// States of the archival workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStep {
    ResolveName,
    ValidateExistence,
    EnsureArchiveTable,
    ExchangeData,
    DeriveMetadata,
    PersistMetadata,
    DropPartition,
    Commit,
}

impl ArchiveStep {
    /// Every step, in execution order.
    pub const ALL: [ArchiveStep; 8] = [
        ArchiveStep::ResolveName,
        ArchiveStep::ValidateExistence,
        ArchiveStep::EnsureArchiveTable,
        ArchiveStep::ExchangeData,
        ArchiveStep::DeriveMetadata,
        ArchiveStep::PersistMetadata,
        ArchiveStep::DropPartition,
        ArchiveStep::Commit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveStep::ResolveName => "resolve_name",
            ArchiveStep::ValidateExistence => "validate_existence",
            ArchiveStep::EnsureArchiveTable => "ensure_archive_table",
            ArchiveStep::ExchangeData => "exchange_data",
            ArchiveStep::DeriveMetadata => "derive_metadata",
            ArchiveStep::PersistMetadata => "persist_metadata",
            ArchiveStep::DropPartition => "drop_partition",
            ArchiveStep::Commit => "commit",
        }
    }

    /// Whether the step runs inside the session's transaction.
    pub fn is_transactional(&self) -> bool {
        !matches!(
            self,
            ArchiveStep::ResolveName | ArchiveStep::ValidateExistence
        )
    }
}

impl fmt::Display for ArchiveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type StepResult<T> = std::result::Result<T, (ArchiveStep, Error)>;

trait AtStep<T> {
    fn at(self, step: ArchiveStep) -> StepResult<T>;
}

impl<T> AtStep<T> for Result<T> {
    fn at(self, step: ArchiveStep) -> StepResult<T> {
        self.map_err(|e| (step, e))
    }
}

/// Compare a reused archive table's columns against the source table's.
///
/// Returns the first mismatch as an [`Error::IncompatibleArchiveTable`].
pub fn check_compatible(
    source_table: &str,
    source_columns: &[ColumnSpec],
    archive_table: &str,
    archive_columns: &[ColumnSpec],
) -> Result<()> {
    let incompatible = |reason: String| Error::IncompatibleArchiveTable {
        archive_table: archive_table.to_string(),
        source_table: source_table.to_string(),
        reason,
    };

    if source_columns.len() != archive_columns.len() {
        return Err(incompatible(format!(
            "{} columns, expected {}",
            archive_columns.len(),
            source_columns.len()
        )));
    }

    for (position, (expected, actual)) in source_columns.iter().zip(archive_columns).enumerate() {
        if expected.name != actual.name {
            return Err(incompatible(format!(
                "column {} is '{}', expected '{}'",
                position + 1,
                actual.name,
                expected.name
            )));
        }
        if !expected.column_type.eq_ignore_ascii_case(&actual.column_type) {
            return Err(incompatible(format!(
                "column '{}' has type {}, expected {}",
                actual.name, actual.column_type, expected.column_type
            )));
        }
        if expected.is_nullable != actual.is_nullable {
            return Err(incompatible(format!(
                "column '{}' nullability differs",
                actual.name
            )));
        }
    }

    Ok(())
}

/// Orchestrates the archival of single partitions.
///
/// Holds no per-run state; one archiver can serve any number of sequential
/// `archive` calls against the same configuration.
pub struct PartitionArchiver<C, B> {
    catalog: C,
    backend: B,
    config: ArchiverConfig,
}

impl<C, B> PartitionArchiver<C, B>
where
    C: PartitionCatalog,
    B: ArchiveBackend,
{
    pub fn new(catalog: C, backend: B, config: ArchiverConfig) -> Self {
        Self {
            catalog,
            backend,
            config,
        }
    }

    /// Run the read-only pre-checks (steps 1 and 2) and report what
    /// `archive` would do. Nothing is mutated.
    pub async fn plan(&self, partition: &str) -> std::result::Result<ArchivePlan, ArchiveFailure> {
        let archive_table = self.resolve_name(partition)?;
        self.validate_existence(partition).await?;

        let reuse_archive_table = self
            .catalog
            .table_exists(&archive_table)
            .await
            .map_err(|e| {
                ArchiveFailure::before_transaction(partition, ArchiveStep::EnsureArchiveTable, e)
            })?;

        Ok(ArchivePlan {
            source_table: self.config.source_table().to_string(),
            partition: partition.to_string(),
            archive_table,
            reuse_archive_table,
        })
    }

    /// Archive `partition` of the configured source table.
    ///
    /// On success the partition is gone from the source table, its rows live
    /// in the archive table, and the returned metadata has been recorded.
    pub async fn archive(
        &self,
        partition: &str,
    ) -> std::result::Result<ArchivedPartitionMetadata, ArchiveFailure> {
        let start = Instant::now();
        let source_table = self.config.source_table();

        info!(
            subsystem = "core",
            component = "archiver",
            op = "archive",
            source_table,
            partition,
            "Starting partition archival"
        );

        let archive_table = self.resolve_name(partition)?;
        self.validate_existence(partition).await?;

        let mut session = self.backend.begin().await.map_err(|e| {
            ArchiveFailure::before_transaction(partition, ArchiveStep::EnsureArchiveTable, e)
        })?;

        match self.run_steps(&mut session, partition, &archive_table).await {
            Ok(metadata) => {
                if let Err(e) = session.commit().await {
                    error!(
                        subsystem = "core",
                        component = "archiver",
                        op = "archive",
                        partition,
                        step = %ArchiveStep::Commit,
                        error = %e,
                        "Commit failed"
                    );
                    return Err(ArchiveFailure {
                        partition: partition.to_string(),
                        step: ArchiveStep::Commit,
                        error: e,
                        rolled_back: false,
                    });
                }

                info!(
                    subsystem = "core",
                    component = "archiver",
                    op = "archive",
                    source_table,
                    partition,
                    archive_table = %archive_table,
                    min_record_id = metadata.min_record_id,
                    max_record_id = metadata.max_record_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    success = true,
                    "Partition archived"
                );
                Ok(metadata)
            }
            Err((step, e)) => {
                let rolled_back = match session.rollback().await {
                    Ok(()) => true,
                    Err(rollback_err) => {
                        error!(
                            subsystem = "core",
                            component = "archiver",
                            op = "rollback",
                            partition,
                            error = %rollback_err,
                            "Rollback failed"
                        );
                        false
                    }
                };

                error!(
                    subsystem = "core",
                    component = "archiver",
                    op = "archive",
                    source_table,
                    partition,
                    archive_table = %archive_table,
                    step = %step,
                    rolled_back,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    success = false,
                    "Partition archival failed"
                );

                Err(ArchiveFailure {
                    partition: partition.to_string(),
                    step,
                    error: e,
                    rolled_back,
                })
            }
        }
    }

    fn resolve_name(&self, partition: &str) -> std::result::Result<String, ArchiveFailure> {
        let archive_table = self.config.archive_table_name(partition).map_err(|e| {
            ArchiveFailure::before_transaction(partition, ArchiveStep::ResolveName, e)
        })?;

        debug!(
            subsystem = "core",
            component = "archiver",
            step = %ArchiveStep::ResolveName,
            partition,
            archive_table = %archive_table,
            "Resolved archive table name"
        );
        Ok(archive_table)
    }

    async fn validate_existence(&self, partition: &str) -> std::result::Result<(), ArchiveFailure> {
        let source_table = self.config.source_table();
        let exists = self
            .catalog
            .partition_exists(source_table, partition)
            .await
            .map_err(|e| {
                ArchiveFailure::before_transaction(partition, ArchiveStep::ValidateExistence, e)
            })?;

        if !exists {
            return Err(ArchiveFailure::before_transaction(
                partition,
                ArchiveStep::ValidateExistence,
                Error::PartitionNotFound {
                    table: source_table.to_string(),
                    partition: partition.to_string(),
                },
            ));
        }
        Ok(())
    }

    async fn run_steps(
        &self,
        session: &mut B::Session,
        partition: &str,
        archive_table: &str,
    ) -> StepResult<ArchivedPartitionMetadata> {
        let source_table = self.config.source_table();
        let metadata_table = self.config.metadata_table();

        let reused = self
            .ensure_archive_table(session, archive_table)
            .await
            .at(ArchiveStep::EnsureArchiveTable)?;
        step_done(ArchiveStep::EnsureArchiveTable, partition, archive_table);

        self.exchange_data(session, partition, archive_table, reused)
            .await
            .at(ArchiveStep::ExchangeData)?;
        step_done(ArchiveStep::ExchangeData, partition, archive_table);

        let bounds = session
            .archive_bounds(
                archive_table,
                self.config.record_id_column(),
                self.config.timestamp_column(),
            )
            .await
            .at(ArchiveStep::DeriveMetadata)?;
        let metadata = ArchivedPartitionMetadata::from_bounds(archive_table, bounds)
            .at(ArchiveStep::DeriveMetadata)?;
        step_done(ArchiveStep::DeriveMetadata, partition, archive_table);

        let recorded = session
            .metadata_recorded(metadata_table, archive_table)
            .await
            .at(ArchiveStep::PersistMetadata)?;
        if recorded {
            warn!(
                subsystem = "core",
                component = "archiver",
                step = %ArchiveStep::PersistMetadata,
                partition,
                archive_table,
                "Archive table already recorded, skipping metadata insert"
            );
        } else {
            session
                .insert_metadata(metadata_table, &metadata)
                .await
                .at(ArchiveStep::PersistMetadata)?;
            step_done(ArchiveStep::PersistMetadata, partition, archive_table);
        }

        let still_present = session
            .partition_exists(source_table, partition)
            .await
            .at(ArchiveStep::DropPartition)?;
        if still_present {
            session
                .drop_partition(source_table, partition)
                .await
                .at(ArchiveStep::DropPartition)?;
            step_done(ArchiveStep::DropPartition, partition, archive_table);
        } else {
            warn!(
                subsystem = "core",
                component = "archiver",
                step = %ArchiveStep::DropPartition,
                partition,
                "Partition already absent, nothing to drop"
            );
        }

        Ok(metadata)
    }

    /// Returns `true` when an existing table was reused.
    async fn ensure_archive_table(
        &self,
        session: &mut B::Session,
        archive_table: &str,
    ) -> Result<bool> {
        let source_table = self.config.source_table();

        if !session.table_exists(archive_table).await? {
            session
                .create_archive_table(archive_table, source_table)
                .await?;
            return Ok(false);
        }

        let source_columns = session.table_columns(source_table).await?;
        let archive_columns = session.table_columns(archive_table).await?;
        check_compatible(source_table, &source_columns, archive_table, &archive_columns)?;

        info!(
            subsystem = "core",
            component = "archiver",
            step = %ArchiveStep::EnsureArchiveTable,
            archive_table,
            "Reusing existing archive table"
        );
        Ok(true)
    }

    async fn exchange_data(
        &self,
        session: &mut B::Session,
        partition: &str,
        archive_table: &str,
        reused: bool,
    ) -> Result<()> {
        let source_table = self.config.source_table();

        if reused && session.table_has_rows(archive_table).await? {
            if session.partition_has_rows(source_table, partition).await? {
                return Err(Error::ArchiveTableNotEmpty(archive_table.to_string()));
            }
            warn!(
                subsystem = "core",
                component = "archiver",
                step = %ArchiveStep::ExchangeData,
                partition,
                archive_table,
                "Archive table already holds the partition's rows, skipping exchange"
            );
            return Ok(());
        }

        session
            .exchange_partition(source_table, partition, archive_table)
            .await
    }
}

fn step_done(step: ArchiveStep, partition: &str, archive_table: &str) {
    info!(
        subsystem = "core",
        component = "archiver",
        step = %step,
        partition,
        archive_table,
        "Step complete"
    );
}
