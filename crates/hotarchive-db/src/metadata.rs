//! Read access to the archived-partition metadata table.

use sqlx::{Executor, MySql, MySqlPool};
use tracing::debug;

use hotarchive_core::{
    quote_qualified, validate_identifier, ArchivedPartitionMetadata, Error, Result,
};

pub(crate) async fn fetch_is_recorded<'c, E>(
    executor: E,
    schema: Option<&str>,
    metadata_table: &str,
    archive_table: &str,
) -> sqlx::Result<bool>
where
    E: Executor<'c, Database = MySql>,
{
    let sql = format!(
        "SELECT CAST(COUNT(*) AS SIGNED) FROM {} WHERE archive_table_name = ?",
        quote_qualified(schema, metadata_table)
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(archive_table)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

/// Reads provenance rows written by archival runs.
#[derive(Clone)]
pub struct MySqlMetadataRepository {
    pool: MySqlPool,
    schema: Option<String>,
}

impl MySqlMetadataRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool, schema: None }
    }

    /// Read the metadata table from `schema` instead of the connection's default.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// All rows of `metadata_table`, most recently archived first.
    pub async fn list_archived(
        &self,
        metadata_table: &str,
    ) -> Result<Vec<ArchivedPartitionMetadata>> {
        validate_identifier(metadata_table)?;

        let sql = format!(
            r#"SELECT CAST(archive_table_name AS CHAR) AS archive_table_name,
                      start_timestamp,
                      end_timestamp,
                      CAST(min_record_id AS SIGNED) AS min_record_id,
                      CAST(max_record_id AS SIGNED) AS max_record_id,
                      archived_at
               FROM {}
               ORDER BY archived_at DESC, archive_table_name"#,
            quote_qualified(self.schema.as_deref(), metadata_table)
        );

        let rows = sqlx::query_as::<_, ArchivedPartitionMetadata>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::QueryFailure)?;

        debug!(
            subsystem = "database",
            component = "metadata",
            op = "list_archived",
            result_count = rows.len(),
            "Listed archived partitions"
        );
        Ok(rows)
    }

    /// Whether `metadata_table` records `archive_table`.
    pub async fn is_recorded(&self, metadata_table: &str, archive_table: &str) -> Result<bool> {
        validate_identifier(metadata_table)?;

        fetch_is_recorded(&self.pool, self.schema.as_deref(), metadata_table, archive_table)
            .await
            .map_err(Error::QueryFailure)
    }
}
