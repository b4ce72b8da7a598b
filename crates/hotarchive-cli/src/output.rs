//! Human-readable rendering of command results.

use std::fmt::Write;

use hotarchive_core::{ArchivePlan, ArchivedPartitionMetadata, PartitionDescriptor};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Numbered partition listing. The numbers are what `archive --index` takes.
pub fn render_partitions(source_table: &str, partitions: &[PartitionDescriptor]) -> String {
    if partitions.is_empty() {
        return format!("No archivable partitions in `{}`\n", source_table);
    }

    let mut out = format!("Partitions for table `{}`:\n", source_table);
    for (index, partition) in partitions.iter().enumerate() {
        let _ = writeln!(out, "id: {:<3} | {}", index, partition);
    }
    out
}

pub fn render_history(metadata_table: &str, rows: &[ArchivedPartitionMetadata]) -> String {
    if rows.is_empty() {
        return format!("No archived partitions recorded in `{}`\n", metadata_table);
    }

    let mut out = format!(
        "{:<40} | {:>12} | {:>12} | {:<19} | {:<19} | {:<19}\n",
        "Archive table", "Min id", "Max id", "Start", "End", "Archived at"
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{:<40} | {:>12} | {:>12} | {} | {} | {}",
            row.archive_table_name,
            row.min_record_id,
            row.max_record_id,
            row.start_timestamp.format(TIMESTAMP_FORMAT),
            row.end_timestamp.format(TIMESTAMP_FORMAT),
            row.archived_at.format(TIMESTAMP_FORMAT),
        );
    }
    out
}

pub fn render_plan(plan: &ArchivePlan) -> String {
    let table_action = if plan.reuse_archive_table {
        "reuse existing table"
    } else {
        "create table"
    };
    format!(
        "Dry run: partition '{}' of `{}` would be archived into `{}` ({})\n",
        plan.partition, plan.source_table, plan.archive_table, table_action
    )
}

pub fn render_archived(partition: &str, metadata: &ArchivedPartitionMetadata) -> String {
    format!(
        "Archived partition '{}' into `{}`\n  record ids:  {} .. {}\n  timestamps:  {} .. {}\n  archived at: {}\n",
        partition,
        metadata.archive_table_name,
        metadata.min_record_id,
        metadata.max_record_id,
        metadata.start_timestamp.format(TIMESTAMP_FORMAT),
        metadata.end_timestamp.format(TIMESTAMP_FORMAT),
        metadata.archived_at.format(TIMESTAMP_FORMAT),
    )
}
