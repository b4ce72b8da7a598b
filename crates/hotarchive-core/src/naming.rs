//! Archive table naming strategies.
//!
//! The archiver never decides table names itself. It calls the strategy held
//! by [`ArchiverConfig`](crate::ArchiverConfig), which is any
//! `Fn(&str) -> Result<String>`. [`PrefixNamingStrategy`] is the default.

use std::sync::Arc;

use crate::defaults::{ARCHIVE_TABLE_INFIX, PARTITION_PREFIX};
use crate::error::{Error, Result};

/// A pluggable partition-name to archive-table-name mapping.
pub type ArchiveNameStrategy = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Maps `p2024_q1` to `<source>_archive_2024_Q1`.
///
/// The partition name must be the prefix character followed by a non-empty
/// token of ASCII alphanumerics and underscores. The token is uppercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixNamingStrategy {
    source_table: String,
    prefix: char,
}

impl PrefixNamingStrategy {
    /// Strategy for `source_table` using the default `p` prefix.
    pub fn new(source_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            prefix: PARTITION_PREFIX,
        }
    }

    /// Override the leading character partition names must carry.
    pub fn with_prefix(mut self, prefix: char) -> Self {
        self.prefix = prefix;
        self
    }

    /// Derive the archive table name for `partition`.
    pub fn archive_table_name(&self, partition: &str) -> Result<String> {
        let token = partition.strip_prefix(self.prefix).ok_or_else(|| {
            Error::InvalidPartitionName(format!(
                "'{}' must start with '{}'",
                partition, self.prefix
            ))
        })?;

        if token.is_empty() {
            return Err(Error::InvalidPartitionName(format!(
                "'{}' has nothing after the '{}' prefix",
                partition, self.prefix
            )));
        }

        if let Some(ch) = token
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '_')
        {
            return Err(Error::InvalidPartitionName(format!(
                "'{}' contains invalid character '{}'",
                partition, ch
            )));
        }

        Ok(format!(
            "{}{}{}",
            self.source_table,
            ARCHIVE_TABLE_INFIX,
            token.to_uppercase()
        ))
    }

    /// Convert into the function form held by the config.
    pub fn into_strategy(self) -> ArchiveNameStrategy {
        Arc::new(move |partition: &str| self.archive_table_name(partition))
    }
}
