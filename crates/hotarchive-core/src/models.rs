//! Value types shared by the catalog, the archiver and the MySQL backend.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One partition of a source table, as reported by the catalog.
///
/// A read-only snapshot: row counts come from table statistics and are
/// approximate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    pub name: String,
    pub approximate_row_count: i64,
    /// Partitioning expression, e.g. `to_days(created_at)`.
    pub partition_expression: String,
    /// Range bound, e.g. `739342` for `VALUES LESS THAN (739342)`.
    pub partition_description: String,
}

impl fmt::Display for PartitionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Partition: {:<20} | Rows: {:<10} | Expr: {:<30} | Desc: {}",
            self.name,
            self.approximate_row_count,
            self.partition_expression,
            self.partition_description
        )
    }
}

/// Raw MIN/MAX scan of an archive table. Every boundary is NULL when the
/// table is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBounds {
    pub min_record_id: Option<i64>,
    pub max_record_id: Option<i64>,
    pub start_timestamp: Option<NaiveDateTime>,
    pub end_timestamp: Option<NaiveDateTime>,
    /// Server clock read by the same statement.
    pub server_now: NaiveDateTime,
}

/// Provenance row recorded for each archived partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArchivedPartitionMetadata {
    pub archive_table_name: String,
    pub start_timestamp: NaiveDateTime,
    pub end_timestamp: NaiveDateTime,
    pub min_record_id: i64,
    pub max_record_id: i64,
    pub archived_at: NaiveDateTime,
}

impl ArchivedPartitionMetadata {
    /// Build the metadata for `archive_table` from a MIN/MAX scan.
    ///
    /// Fails with [`Error::EmptyArchiveMetadata`] when any boundary is NULL:
    /// an empty archive table must never be recorded as archived.
    pub fn from_bounds(archive_table: &str, bounds: ArchiveBounds) -> Result<Self> {
        let (Some(min_id), Some(max_id), Some(start), Some(end)) = (
            bounds.min_record_id,
            bounds.max_record_id,
            bounds.start_timestamp,
            bounds.end_timestamp,
        ) else {
            return Err(Error::EmptyArchiveMetadata(archive_table.to_string()));
        };

        if min_id > max_id {
            return Err(Error::Internal(format!(
                "min record id {} exceeds max record id {} in '{}'",
                min_id, max_id, archive_table
            )));
        }
        if start > end {
            return Err(Error::Internal(format!(
                "start timestamp {} is after end timestamp {} in '{}'",
                start, end, archive_table
            )));
        }

        Ok(Self {
            archive_table_name: archive_table.to_string(),
            start_timestamp: start,
            end_timestamp: end,
            min_record_id: min_id,
            max_record_id: max_id,
            archived_at: bounds.server_now,
        })
    }
}

/// A column of a table, in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Full column type, e.g. `bigint unsigned` or `varchar(255)`.
    pub column_type: String,
    pub is_nullable: bool,
}

/// Outcome of the read-only pre-checks for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivePlan {
    pub source_table: String,
    pub partition: String,
    pub archive_table: String,
    /// Whether the archive table already exists and will be reused.
    pub reuse_archive_table: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn full_bounds() -> ArchiveBounds {
        ArchiveBounds {
            min_record_id: Some(1000),
            max_record_id: Some(5000),
            start_timestamp: Some(ts(1, 1)),
            end_timestamp: Some(ts(3, 31)),
            server_now: ts(4, 2),
        }
    }

    #[test]
    fn test_from_bounds_populates_all_fields() {
        let meta =
            ArchivedPartitionMetadata::from_bounds("messages_archive_2024_Q1", full_bounds())
                .unwrap();
        assert_eq!(meta.archive_table_name, "messages_archive_2024_Q1");
        assert_eq!(meta.min_record_id, 1000);
        assert_eq!(meta.max_record_id, 5000);
        assert_eq!(meta.start_timestamp, ts(1, 1));
        assert_eq!(meta.end_timestamp, ts(3, 31));
        assert_eq!(meta.archived_at, ts(4, 2));
    }

    #[test]
    fn test_from_bounds_rejects_empty_table() {
        let bounds = ArchiveBounds {
            min_record_id: None,
            max_record_id: None,
            start_timestamp: None,
            end_timestamp: None,
            server_now: ts(4, 2),
        };
        match ArchivedPartitionMetadata::from_bounds("a", bounds) {
            Err(Error::EmptyArchiveMetadata(table)) => assert_eq!(table, "a"),
            other => panic!("Expected EmptyArchiveMetadata, got {:?}", other),
        }
    }

    #[test]
    fn test_from_bounds_rejects_any_missing_boundary() {
        let mut bounds = full_bounds();
        bounds.end_timestamp = None;
        assert!(matches!(
            ArchivedPartitionMetadata::from_bounds("a", bounds),
            Err(Error::EmptyArchiveMetadata(_))
        ));
    }

    #[test]
    fn test_from_bounds_rejects_inverted_ids() {
        let mut bounds = full_bounds();
        bounds.min_record_id = Some(6000);
        assert!(matches!(
            ArchivedPartitionMetadata::from_bounds("a", bounds),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn test_single_row_bounds_are_equal() {
        let bounds = ArchiveBounds {
            min_record_id: Some(7),
            max_record_id: Some(7),
            start_timestamp: Some(ts(2, 2)),
            end_timestamp: Some(ts(2, 2)),
            server_now: ts(4, 2),
        };
        let meta = ArchivedPartitionMetadata::from_bounds("a", bounds).unwrap();
        assert_eq!(meta.min_record_id, meta.max_record_id);
        assert_eq!(meta.start_timestamp, meta.end_timestamp);
    }

    #[test]
    fn test_partition_descriptor_display() {
        let p = PartitionDescriptor {
            name: "p2024_q1".to_string(),
            approximate_row_count: 4001,
            partition_expression: "to_days(`created_at`)".to_string(),
            partition_description: "739342".to_string(),
        };
        let line = p.to_string();
        assert!(line.starts_with("Partition: p2024_q1"));
        assert!(line.contains("Rows: 4001"));
        assert!(line.ends_with("Desc: 739342"));
    }

    #[test]
    fn test_metadata_serializes_to_json() {
        let meta = ArchivedPartitionMetadata::from_bounds("a", full_bounds()).unwrap();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["archive_table_name"], "a");
        assert_eq!(json["min_record_id"], 1000);
        assert_eq!(json["start_timestamp"], "2024-01-01T00:00:00");
    }
}
