//! Partition catalog backed by MySQL's `INFORMATION_SCHEMA`.
//!
//! `INFORMATION_SCHEMA` columns come back with binary or unsigned types that
//! sqlx will not decode into `String`/`i64` directly, so every selected
//! column is `CAST` explicitly.

use async_trait::async_trait;
use sqlx::{Executor, MySql, MySqlPool};
use tracing::debug;

use hotarchive_core::defaults::CATCH_ALL_PARTITION;
use hotarchive_core::{ColumnSpec, Error, PartitionCatalog, PartitionDescriptor, Result};

const LIST_PARTITIONS_SQL: &str = r#"
    SELECT CAST(PARTITION_NAME AS CHAR) AS name,
           CAST(COALESCE(TABLE_ROWS, 0) AS SIGNED) AS approximate_row_count,
           CAST(COALESCE(PARTITION_EXPRESSION, '') AS CHAR) AS partition_expression,
           CAST(COALESCE(PARTITION_DESCRIPTION, '') AS CHAR) AS partition_description
    FROM INFORMATION_SCHEMA.PARTITIONS
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
      AND TABLE_NAME = ?
      AND PARTITION_NAME IS NOT NULL
      AND PARTITION_NAME <> ?
    ORDER BY PARTITION_ORDINAL_POSITION
"#;

const PARTITION_EXISTS_SQL: &str = r#"
    SELECT CAST(COUNT(*) AS SIGNED)
    FROM INFORMATION_SCHEMA.PARTITIONS
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
      AND TABLE_NAME = ?
      AND PARTITION_NAME = ?
      AND PARTITION_NAME <> ?
"#;

const TABLE_EXISTS_SQL: &str = r#"
    SELECT CAST(COUNT(*) AS SIGNED)
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
      AND TABLE_NAME = ?
      AND TABLE_TYPE = 'BASE TABLE'
"#;

const TABLE_COLUMNS_SQL: &str = r#"
    SELECT CAST(COLUMN_NAME AS CHAR),
           CAST(COLUMN_TYPE AS CHAR),
           CAST(IS_NULLABLE AS CHAR)
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
      AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

pub(crate) async fn fetch_partitions<'c, E>(
    executor: E,
    schema: Option<&str>,
    table: &str,
) -> sqlx::Result<Vec<PartitionDescriptor>>
where
    E: Executor<'c, Database = MySql>,
{
    let rows: Vec<(String, i64, String, String)> = sqlx::query_as(LIST_PARTITIONS_SQL)
        .bind(schema)
        .bind(table)
        .bind(CATCH_ALL_PARTITION)
        .fetch_all(executor)
        .await?;

    Ok(rows
        .into_iter()
        .map(
            |(name, approximate_row_count, partition_expression, partition_description)| {
                PartitionDescriptor {
                    name,
                    approximate_row_count,
                    partition_expression,
                    partition_description,
                }
            },
        )
        .collect())
}

pub(crate) async fn fetch_partition_exists<'c, E>(
    executor: E,
    schema: Option<&str>,
    table: &str,
    partition: &str,
) -> sqlx::Result<bool>
where
    E: Executor<'c, Database = MySql>,
{
    let count: i64 = sqlx::query_scalar(PARTITION_EXISTS_SQL)
        .bind(schema)
        .bind(table)
        .bind(partition)
        .bind(CATCH_ALL_PARTITION)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

pub(crate) async fn fetch_table_exists<'c, E>(
    executor: E,
    schema: Option<&str>,
    table: &str,
) -> sqlx::Result<bool>
where
    E: Executor<'c, Database = MySql>,
{
    let count: i64 = sqlx::query_scalar(TABLE_EXISTS_SQL)
        .bind(schema)
        .bind(table)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

pub(crate) async fn fetch_table_columns<'c, E>(
    executor: E,
    schema: Option<&str>,
    table: &str,
) -> sqlx::Result<Vec<ColumnSpec>>
where
    E: Executor<'c, Database = MySql>,
{
    let rows: Vec<(String, String, String)> = sqlx::query_as(TABLE_COLUMNS_SQL)
        .bind(schema)
        .bind(table)
        .fetch_all(executor)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(name, column_type, nullable)| ColumnSpec {
            name,
            column_type,
            is_nullable: nullable.eq_ignore_ascii_case("YES"),
        })
        .collect())
}

/// MySQL implementation of [`PartitionCatalog`].
///
/// Reads the schema of the pool's connections (`DATABASE()`) unless an
/// explicit schema is set with [`with_schema`](Self::with_schema).
#[derive(Clone)]
pub struct MySqlPartitionCatalog {
    pool: MySqlPool,
    schema: Option<String>,
}

impl MySqlPartitionCatalog {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool, schema: None }
    }

    /// Read partitions from `schema` instead of the connection's default.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

#[async_trait]
impl PartitionCatalog for MySqlPartitionCatalog {
    async fn list_partitions(&self, table: &str) -> Result<Vec<PartitionDescriptor>> {
        let partitions = fetch_partitions(&self.pool, self.schema(), table)
            .await
            .map_err(Error::QueryFailure)?;

        debug!(
            subsystem = "database",
            component = "catalog",
            op = "list_partitions",
            source_table = table,
            result_count = partitions.len(),
            "Listed partitions"
        );
        Ok(partitions)
    }

    async fn partition_exists(&self, table: &str, partition: &str) -> Result<bool> {
        fetch_partition_exists(&self.pool, self.schema(), table, partition)
            .await
            .map_err(Error::QueryFailure)
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        fetch_table_exists(&self.pool, self.schema(), table)
            .await
            .map_err(Error::QueryFailure)
    }
}
