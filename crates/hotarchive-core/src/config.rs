//! Archiver configuration.

use std::fmt;
use std::sync::Arc;

use crate::defaults::{RECORD_ID_COLUMN, TIMESTAMP_COLUMN};
use crate::error::{Error, Result};
use crate::identifier::validate_identifier;
use crate::naming::ArchiveNameStrategy;

/// Immutable archiver configuration.
///
/// Only obtainable through [`ArchiverConfig::builder`], so a value of this
/// type always has every required field set and validated. Cloning is
/// cheap and clones share the naming strategy.
#[derive(Clone)]
pub struct ArchiverConfig {
    source_table: String,
    metadata_table: String,
    archive_name_strategy: ArchiveNameStrategy,
    record_id_column: String,
    timestamp_column: String,
}

impl ArchiverConfig {
    /// Start building a configuration.
    pub fn builder() -> ArchiverConfigBuilder {
        ArchiverConfigBuilder::default()
    }

    /// Partitioned table partitions are archived from.
    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    /// Table receiving one provenance row per archived partition.
    pub fn metadata_table(&self) -> &str {
        &self.metadata_table
    }

    /// Column scanned for the min/max record identifier.
    pub fn record_id_column(&self) -> &str {
        &self.record_id_column
    }

    /// Column scanned for the start/end timestamps.
    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    /// Apply the naming strategy to `partition`.
    ///
    /// The partition name itself must be a valid identifier before the
    /// strategy sees it. Errors from the strategy are surfaced as
    /// [`Error::InvalidPartitionName`], and so is a derived name that is not a
    /// usable identifier.
    pub fn archive_table_name(&self, partition: &str) -> Result<String> {
        validate_identifier(partition).map_err(|e| {
            Error::InvalidPartitionName(format!("'{}': {}", partition, e))
        })?;

        let name = (self.archive_name_strategy)(partition).map_err(|e| match e {
            Error::InvalidPartitionName(msg) => Error::InvalidPartitionName(msg),
            other => Error::InvalidPartitionName(format!("'{}': {}", partition, other)),
        })?;

        validate_identifier(&name).map_err(|e| {
            Error::InvalidPartitionName(format!(
                "'{}' maps to unusable table name '{}': {}",
                partition, name, e
            ))
        })?;

        if name == self.source_table || name == self.metadata_table {
            return Err(Error::InvalidPartitionName(format!(
                "'{}' maps onto configured table '{}'",
                partition, name
            )));
        }

        Ok(name)
    }
}

impl fmt::Debug for ArchiverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiverConfig")
            .field("source_table", &self.source_table)
            .field("metadata_table", &self.metadata_table)
            .field("archive_name_strategy", &"<fn>")
            .field("record_id_column", &self.record_id_column)
            .field("timestamp_column", &self.timestamp_column)
            .finish()
    }
}

/// Builder for [`ArchiverConfig`].
#[derive(Default)]
pub struct ArchiverConfigBuilder {
    source_table: Option<String>,
    metadata_table: Option<String>,
    archive_name_strategy: Option<ArchiveNameStrategy>,
    record_id_column: Option<String>,
    timestamp_column: Option<String>,
}

impl ArchiverConfigBuilder {
    /// Set the partitioned source table.
    pub fn source_table(mut self, table: impl Into<String>) -> Self {
        self.source_table = Some(table.into());
        self
    }

    /// Set the provenance table.
    pub fn metadata_table(mut self, table: impl Into<String>) -> Self {
        self.metadata_table = Some(table.into());
        self
    }

    /// Set the naming strategy from any fallible mapping.
    pub fn archive_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        self.archive_name_strategy = Some(Arc::new(f));
        self
    }

    /// Set an already shared naming strategy.
    pub fn archive_name_strategy(mut self, strategy: ArchiveNameStrategy) -> Self {
        self.archive_name_strategy = Some(strategy);
        self
    }

    /// Override the record identifier column (default `id`).
    pub fn record_id_column(mut self, column: impl Into<String>) -> Self {
        self.record_id_column = Some(column.into());
        self
    }

    /// Override the timestamp column (default `created_at`).
    pub fn timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = Some(column.into());
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// Fails with [`Error::Config`] on the first missing required field or
    /// invalid identifier.
    pub fn build(self) -> Result<ArchiverConfig> {
        let source_table = require(self.source_table, "source_table")?;
        let metadata_table = require(self.metadata_table, "metadata_table")?;
        let archive_name_strategy = self
            .archive_name_strategy
            .ok_or_else(|| Error::Config("archive_name_strategy is required".to_string()))?;
        let record_id_column = self
            .record_id_column
            .unwrap_or_else(|| RECORD_ID_COLUMN.to_string());
        let timestamp_column = self
            .timestamp_column
            .unwrap_or_else(|| TIMESTAMP_COLUMN.to_string());

        for (field, value) in [
            ("source_table", &source_table),
            ("metadata_table", &metadata_table),
            ("record_id_column", &record_id_column),
            ("timestamp_column", &timestamp_column),
        ] {
            validate_identifier(value).map_err(|e| Error::Config(format!("{}: {}", field, e)))?;
        }

        if source_table == metadata_table {
            return Err(Error::Config(
                "source_table and metadata_table must differ".to_string(),
            ));
        }

        Ok(ArchiverConfig {
            source_table,
            metadata_table,
            archive_name_strategy,
            record_id_column,
            timestamp_column,
        })
    }
}

fn require(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| Error::Config(format!("{} is required", field)))
}
