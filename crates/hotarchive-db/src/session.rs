//! MySQL archive sessions.
//!
//! A session owns one pooled connection with `autocommit` disabled, so the
//! metadata insert stays pending until `COMMIT`. MySQL commits implicitly
//! before and after every `CREATE TABLE` and `ALTER TABLE`, which means a
//! rollback only discards DML issued since the last DDL statement.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlConnection, MySqlPool};
use tracing::{debug, warn};

use hotarchive_core::{
    quote_identifier, quote_qualified, ArchiveBackend, ArchiveBounds, ArchiveSession,
    ArchivedPartitionMetadata, ColumnSpec, Error, Result,
};

use crate::catalog::{fetch_partition_exists, fetch_table_columns, fetch_table_exists};
use crate::metadata::fetch_is_recorded;

/// Opens [`MySqlArchiveSession`]s on a pool.
#[derive(Clone)]
pub struct MySqlArchiveBackend {
    pool: MySqlPool,
    schema: Option<String>,
}

impl MySqlArchiveBackend {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool, schema: None }
    }

    /// Qualify every table the sessions touch with `schema`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

#[async_trait]
impl ArchiveBackend for MySqlArchiveBackend {
    type Session = MySqlArchiveSession;

    async fn begin(&self) -> Result<MySqlArchiveSession> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;

        if let Err(e) = sqlx::query("SET autocommit = 0")
            .execute(&mut *conn)
            .await
        {
            conn.close_on_drop();
            return Err(Error::Database(e));
        }

        debug!(
            subsystem = "database",
            component = "archive_session",
            op = "begin",
            schema = self.schema().unwrap_or("DATABASE()"),
            "Archive session opened"
        );
        Ok(MySqlArchiveSession {
            conn: Some(conn),
            schema: self.schema.clone(),
        })
    }
}

/// One connection in manual-commit mode.
///
/// Dropping a session without calling `commit` or `rollback` closes the
/// connection instead of returning it to the pool, so a half-finished
/// transaction never leaks to the next borrower.
pub struct MySqlArchiveSession {
    conn: Option<PoolConnection<MySql>>,
    schema: Option<String>,
}

impl MySqlArchiveSession {
    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| Error::Internal("archive session already finished".to_string()))
    }

    /// The connection together with the schema for catalog lookups.
    fn catalog_conn(&mut self) -> Result<(&mut MySqlConnection, Option<&str>)> {
        let conn = self
            .conn
            .as_deref_mut()
            .ok_or_else(|| Error::Internal("archive session already finished".to_string()))?;
        Ok((conn, self.schema.as_deref()))
    }

    fn table(&self, name: &str) -> String {
        quote_qualified(self.schema.as_deref(), name)
    }

    async fn execute_ddl(&mut self, op: &'static str, statement: String) -> Result<()> {
        debug!(
            subsystem = "database",
            component = "archive_session",
            op,
            statement = %statement,
            "Executing DDL"
        );

        let result = sqlx::query(&statement).execute(self.conn()?).await;
        result
            .map(|_| ())
            .map_err(|source| Error::DdlFailure { statement, source })
    }

    /// Run `statement`, then restore autocommit before the connection goes
    /// back to the pool.
    async fn finish(mut self, statement: &'static str) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(Error::Internal(
                "archive session already finished".to_string(),
            ));
        };

        let result = async {
            sqlx::query(statement).execute(&mut *conn).await?;
            sqlx::query("SET autocommit = 1")
                .execute(&mut *conn)
                .await?;
            Ok::<_, sqlx::Error>(())
        }
        .await;

        if let Err(e) = result {
            conn.close_on_drop();
            return Err(Error::Database(e));
        }

        debug!(
            subsystem = "database",
            component = "archive_session",
            op = statement,
            "Archive session finished"
        );
        Ok(())
    }
}

impl Drop for MySqlArchiveSession {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            warn!(
                subsystem = "database",
                component = "archive_session",
                op = "drop",
                "Archive session dropped without commit or rollback, closing connection"
            );
            conn.close_on_drop();
        }
    }
}

#[async_trait]
impl ArchiveSession for MySqlArchiveSession {
    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let (conn, schema) = self.catalog_conn()?;
        fetch_table_exists(conn, schema, table)
            .await
            .map_err(Error::QueryFailure)
    }

    async fn partition_exists(&mut self, table: &str, partition: &str) -> Result<bool> {
        let (conn, schema) = self.catalog_conn()?;
        fetch_partition_exists(conn, schema, table, partition)
            .await
            .map_err(Error::QueryFailure)
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnSpec>> {
        let (conn, schema) = self.catalog_conn()?;
        fetch_table_columns(conn, schema, table)
            .await
            .map_err(Error::QueryFailure)
    }

    async fn create_archive_table(
        &mut self,
        archive_table: &str,
        source_table: &str,
    ) -> Result<()> {
        let archive = self.table(archive_table);
        let source = self.table(source_table);
        self.execute_ddl(
            "create_archive_table",
            format!("CREATE TABLE {} LIKE {}", archive, source),
        )
        .await?;
        self.execute_ddl(
            "remove_partitioning",
            format!("ALTER TABLE {} REMOVE PARTITIONING", archive),
        )
        .await
    }

    async fn table_has_rows(&mut self, table: &str) -> Result<bool> {
        let sql = format!(
            "SELECT CAST(EXISTS(SELECT 1 FROM {}) AS SIGNED)",
            self.table(table)
        );
        let found: i64 = sqlx::query_scalar(&sql)
            .fetch_one(self.conn()?)
            .await
            .map_err(Error::QueryFailure)?;
        Ok(found != 0)
    }

    async fn partition_has_rows(&mut self, table: &str, partition: &str) -> Result<bool> {
        let sql = format!(
            "SELECT CAST(EXISTS(SELECT 1 FROM {} PARTITION ({})) AS SIGNED)",
            self.table(table),
            quote_identifier(partition)
        );
        let found: i64 = sqlx::query_scalar(&sql)
            .fetch_one(self.conn()?)
            .await
            .map_err(Error::QueryFailure)?;
        Ok(found != 0)
    }

    async fn exchange_partition(
        &mut self,
        source_table: &str,
        partition: &str,
        archive_table: &str,
    ) -> Result<()> {
        let statement = format!(
            "ALTER TABLE {} EXCHANGE PARTITION {} WITH TABLE {}",
            self.table(source_table),
            quote_identifier(partition),
            self.table(archive_table)
        );
        self.execute_ddl("exchange_partition", statement).await
    }

    async fn archive_bounds(
        &mut self,
        archive_table: &str,
        record_id_column: &str,
        timestamp_column: &str,
    ) -> Result<ArchiveBounds> {
        let id = quote_identifier(record_id_column);
        let ts = quote_identifier(timestamp_column);
        let sql = format!(
            "SELECT CAST(MIN({id}) AS SIGNED), CAST(MAX({id}) AS SIGNED), MIN({ts}), MAX({ts}), NOW() FROM {}",
            self.table(archive_table)
        );

        let (min_record_id, max_record_id, start_timestamp, end_timestamp, server_now): (
            Option<i64>,
            Option<i64>,
            Option<NaiveDateTime>,
            Option<NaiveDateTime>,
            NaiveDateTime,
        ) = sqlx::query_as(&sql)
                .fetch_one(self.conn()?)
                .await
                .map_err(Error::QueryFailure)?;

        Ok(ArchiveBounds {
            min_record_id,
            max_record_id,
            start_timestamp,
            end_timestamp,
            server_now,
        })
    }

    async fn metadata_recorded(
        &mut self,
        metadata_table: &str,
        archive_table: &str,
    ) -> Result<bool> {
        let (conn, schema) = self.catalog_conn()?;
        fetch_is_recorded(conn, schema, metadata_table, archive_table)
            .await
            .map_err(Error::QueryFailure)
    }

    async fn insert_metadata(
        &mut self,
        metadata_table: &str,
        metadata: &ArchivedPartitionMetadata,
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (archive_table_name, start_timestamp, end_timestamp, \
             min_record_id, max_record_id, archived_at) VALUES (?, ?, ?, ?, ?, ?)",
            self.table(metadata_table)
        );

        debug!(
            subsystem = "database",
            component = "archive_session",
            op = "insert_metadata",
            archive_table = %metadata.archive_table_name,
            "Recording archived partition"
        );

        sqlx::query(&sql)
            .bind(&metadata.archive_table_name)
            .bind(metadata.start_timestamp)
            .bind(metadata.end_timestamp)
            .bind(metadata.min_record_id)
            .bind(metadata.max_record_id)
            .bind(metadata.archived_at)
            .execute(self.conn()?)
            .await
            .map_err(|source| Error::MetadataInsertFailure {
                table: metadata_table.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn drop_partition(&mut self, table: &str, partition: &str) -> Result<()> {
        let statement = format!(
            "ALTER TABLE {} DROP PARTITION {}",
            self.table(table),
            quote_identifier(partition)
        );
        self.execute_ddl("drop_partition", statement).await
    }

    async fn commit(self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}
