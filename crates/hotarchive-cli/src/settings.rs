//! Connection and table settings.
//!
//! Every setting comes from a command-line flag, then the environment
//! (including `.env`, loaded by `main`), then the built-in default.
//! `DATABASE_URL` has no default.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;

use hotarchive_core::defaults::{
    METADATA_TABLE, PARTITION_PREFIX, RECORD_ID_COLUMN, SOURCE_TABLE, TIMESTAMP_COLUMN,
};
use hotarchive_core::{validate_identifier, ArchiverConfig, PrefixNamingStrategy};
use hotarchive_db::pool::{DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS};
use hotarchive_db::PoolConfig;

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const SOURCE_TABLE_VAR: &str = "HOTARCHIVE_SOURCE_TABLE";
pub const METADATA_TABLE_VAR: &str = "HOTARCHIVE_METADATA_TABLE";
pub const RECORD_ID_COLUMN_VAR: &str = "HOTARCHIVE_RECORD_ID_COLUMN";
pub const TIMESTAMP_COLUMN_VAR: &str = "HOTARCHIVE_TIMESTAMP_COLUMN";
pub const PARTITION_PREFIX_VAR: &str = "HOTARCHIVE_PARTITION_PREFIX";
pub const SCHEMA_VAR: &str = "HOTARCHIVE_SCHEMA";
pub const POOL_MAX_CONNECTIONS_VAR: &str = "HOTARCHIVE_POOL_MAX_CONNECTIONS";
pub const POOL_ACQUIRE_TIMEOUT_VAR: &str = "HOTARCHIVE_POOL_ACQUIRE_TIMEOUT_SECS";

fn env_help(text: &str, var: &str) -> String {
    format!("{} [env: {}]", text, var)
}

fn env_default_help(text: &str, var: &str, default: impl fmt::Display) -> String {
    format!("{} [env: {}] [default: {}]", text, var, default)
}

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    #[arg(long, global = true, help = env_help("MySQL connection URL", DATABASE_URL_VAR))]
    pub database_url: Option<String>,

    #[arg(
        long,
        global = true,
        help = env_help("Schema holding the tables, instead of the URL's database", SCHEMA_VAR)
    )]
    pub schema: Option<String>,

    #[arg(
        long,
        global = true,
        help = env_default_help("Partitioned table to archive from", SOURCE_TABLE_VAR, SOURCE_TABLE)
    )]
    pub source_table: Option<String>,

    #[arg(
        long,
        global = true,
        help = env_default_help("Table recording archived partitions", METADATA_TABLE_VAR, METADATA_TABLE)
    )]
    pub metadata_table: Option<String>,

    #[arg(
        long,
        global = true,
        help = env_default_help("Record id column scanned for bounds", RECORD_ID_COLUMN_VAR, RECORD_ID_COLUMN)
    )]
    pub record_id_column: Option<String>,

    #[arg(
        long,
        global = true,
        help = env_default_help("Timestamp column scanned for bounds", TIMESTAMP_COLUMN_VAR, TIMESTAMP_COLUMN)
    )]
    pub timestamp_column: Option<String>,

    #[arg(
        long,
        global = true,
        help = env_default_help(
            "Leading character of archivable partition names",
            PARTITION_PREFIX_VAR,
            PARTITION_PREFIX
        )
    )]
    pub partition_prefix: Option<char>,

    #[arg(
        long,
        global = true,
        value_parser = clap::value_parser!(u32).range(1..),
        help = env_default_help("Connection pool size", POOL_MAX_CONNECTIONS_VAR, DEFAULT_MAX_CONNECTIONS)
    )]
    pub pool_max_connections: Option<u32>,

    #[arg(
        long,
        global = true,
        help = env_default_help(
            "Seconds to wait for a pooled connection",
            POOL_ACQUIRE_TIMEOUT_VAR,
            DEFAULT_ACQUIRE_TIMEOUT_SECS
        )
    )]
    pub pool_acquire_timeout_secs: Option<u64>,
}

/// Fully resolved settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub schema: Option<String>,
    pub source_table: String,
    pub metadata_table: String,
    pub record_id_column: String,
    pub timestamp_column: String,
    pub partition_prefix: char,
    pub pool_max_connections: u32,
    pub pool_acquire_timeout: Duration,
}

impl Settings {
    /// Resolve against the process environment.
    pub fn from_env(args: &ConnectionArgs) -> anyhow::Result<Self> {
        Self::resolve(args, |key| std::env::var(key).ok())
    }

    /// Resolve with `lookup` standing in for the environment.
    ///
    /// Empty values count as unset.
    pub fn resolve<F>(args: &ConnectionArgs, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let pick = |flag: &Option<String>, key: &str, default: &str| {
            flag.clone()
                .or_else(|| env(key))
                .unwrap_or_else(|| default.to_string())
        };

        let Some(database_url) = args.database_url.clone().or_else(|| env(DATABASE_URL_VAR)) else {
            bail!(
                "{} is not set (pass --database-url or add it to .env)",
                DATABASE_URL_VAR
            );
        };

        let partition_prefix = match (args.partition_prefix, env(PARTITION_PREFIX_VAR)) {
            (Some(prefix), _) => prefix,
            (None, Some(value)) => parse_prefix(&value)
                .with_context(|| format!("invalid {}", PARTITION_PREFIX_VAR))?,
            (None, None) => PARTITION_PREFIX,
        };

        let schema = args.schema.clone().or_else(|| env(SCHEMA_VAR));
        if let Some(schema) = &schema {
            validate_identifier(schema).with_context(|| format!("invalid schema '{}'", schema))?;
        }

        let pool_max_connections = match args.pool_max_connections {
            Some(n) => n,
            None => parse_env(env(POOL_MAX_CONNECTIONS_VAR), POOL_MAX_CONNECTIONS_VAR)?
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
        };
        if pool_max_connections == 0 {
            bail!("{} must be at least 1", POOL_MAX_CONNECTIONS_VAR);
        }

        let pool_acquire_timeout_secs = match args.pool_acquire_timeout_secs {
            Some(secs) => secs,
            None => parse_env(env(POOL_ACQUIRE_TIMEOUT_VAR), POOL_ACQUIRE_TIMEOUT_VAR)?
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        };

        Ok(Self {
            database_url,
            schema,
            source_table: pick(&args.source_table, SOURCE_TABLE_VAR, SOURCE_TABLE),
            metadata_table: pick(&args.metadata_table, METADATA_TABLE_VAR, METADATA_TABLE),
            record_id_column: pick(&args.record_id_column, RECORD_ID_COLUMN_VAR, RECORD_ID_COLUMN),
            timestamp_column: pick(&args.timestamp_column, TIMESTAMP_COLUMN_VAR, TIMESTAMP_COLUMN),
            partition_prefix,
            pool_max_connections,
            pool_acquire_timeout: Duration::from_secs(pool_acquire_timeout_secs),
        })
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new()
            .max_connections(self.pool_max_connections)
            .acquire_timeout(self.pool_acquire_timeout)
    }

    /// Archiver configuration using the prefix naming strategy.
    pub fn archiver_config(&self) -> hotarchive_core::Result<ArchiverConfig> {
        let naming = PrefixNamingStrategy::new(self.source_table.as_str())
            .with_prefix(self.partition_prefix);

        ArchiverConfig::builder()
            .source_table(self.source_table.as_str())
            .metadata_table(self.metadata_table.as_str())
            .archive_name_strategy(naming.into_strategy())
            .record_id_column(self.record_id_column.as_str())
            .timestamp_column(self.timestamp_column.as_str())
            .build()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("database_url", &"<redacted>")
            .field("schema", &self.schema)
            .field("source_table", &self.source_table)
            .field("metadata_table", &self.metadata_table)
            .field("record_id_column", &self.record_id_column)
            .field("timestamp_column", &self.timestamp_column)
            .field("partition_prefix", &self.partition_prefix)
            .field("pool_max_connections", &self.pool_max_connections)
            .field("pool_acquire_timeout", &self.pool_acquire_timeout)
            .finish()
    }
}

fn parse_env<T>(value: Option<String>, var: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid {}", var))
}

fn parse_prefix(value: &str) -> anyhow::Result<char> {
    let mut chars = value.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => bail!("expected a single character, got '{}'", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let settings = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[(DATABASE_URL_VAR, "mysql://localhost/chat")]),
        )
        .unwrap();

        assert_eq!(settings.database_url, "mysql://localhost/chat");
        assert_eq!(settings.source_table, "messages");
        assert_eq!(settings.metadata_table, "archived_message_partitions");
        assert_eq!(settings.record_id_column, "id");
        assert_eq!(settings.timestamp_column, "created_at");
        assert_eq!(settings.partition_prefix, 'p');
        assert_eq!(settings.schema, None);
        assert_eq!(settings.pool_config(), PoolConfig::default());
    }

    #[test]
    fn test_missing_database_url() {
        let err = Settings::resolve(&ConnectionArgs::default(), lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL is not set"));
    }

    #[test]
    fn test_empty_env_value_counts_as_unset() {
        let err = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[(DATABASE_URL_VAR, "  ")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_env_overrides_defaults() {
        let settings = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[
                (DATABASE_URL_VAR, "mysql://db/chat"),
                (SOURCE_TABLE_VAR, "events"),
                (METADATA_TABLE_VAR, "archived_event_partitions"),
                (TIMESTAMP_COLUMN_VAR, "occurred_at"),
                (PARTITION_PREFIX_VAR, "e"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.source_table, "events");
        assert_eq!(settings.metadata_table, "archived_event_partitions");
        assert_eq!(settings.timestamp_column, "occurred_at");
        assert_eq!(settings.partition_prefix, 'e');
    }

    #[test]
    fn test_flags_override_env() {
        let args = ConnectionArgs {
            database_url: Some("mysql://flag/chat".to_string()),
            source_table: Some("flag_messages".to_string()),
            partition_prefix: Some('q'),
            ..Default::default()
        };
        let settings = Settings::resolve(
            &args,
            lookup(&[
                (DATABASE_URL_VAR, "mysql://env/chat"),
                (SOURCE_TABLE_VAR, "env_messages"),
                (PARTITION_PREFIX_VAR, "e"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.database_url, "mysql://flag/chat");
        assert_eq!(settings.source_table, "flag_messages");
        assert_eq!(settings.partition_prefix, 'q');
    }

    #[test]
    fn test_multi_character_prefix_rejected() {
        let err = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[(DATABASE_URL_VAR, "mysql://db/chat"), (PARTITION_PREFIX_VAR, "px")]),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("expected a single character"));
    }

    #[test]
    fn test_archiver_config_uses_prefix() {
        let settings = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[(DATABASE_URL_VAR, "mysql://db/chat"), (PARTITION_PREFIX_VAR, "m")]),
        )
        .unwrap();
        let config = settings.archiver_config().unwrap();

        assert_eq!(
            config.archive_table_name("m2024_q1").unwrap(),
            "messages_archive_2024_Q1"
        );
        assert!(config.archive_table_name("p2024_q1").is_err());
    }

    #[test]
    fn test_invalid_table_name_fails_config() {
        let settings = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[
                (DATABASE_URL_VAR, "mysql://db/chat"),
                (SOURCE_TABLE_VAR, "messages; DROP TABLE x"),
            ]),
        )
        .unwrap();
        assert!(settings.archiver_config().is_err());
    }

    #[test]
    fn test_debug_redacts_url() {
        let settings = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[(DATABASE_URL_VAR, "mysql://user:secret@db/chat")]),
        )
        .unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_pool_settings_from_env_and_flags() {
        let vars = [
            (DATABASE_URL_VAR, "mysql://db/chat"),
            (POOL_MAX_CONNECTIONS_VAR, "3"),
            (POOL_ACQUIRE_TIMEOUT_VAR, "5"),
        ];
        let settings = Settings::resolve(&ConnectionArgs::default(), lookup(&vars)).unwrap();
        assert_eq!(
            settings.pool_config(),
            PoolConfig::new()
                .max_connections(3)
                .acquire_timeout(Duration::from_secs(5))
        );

        let args = ConnectionArgs {
            pool_acquire_timeout_secs: Some(60),
            ..Default::default()
        };
        let settings = Settings::resolve(&args, lookup(&vars)).unwrap();
        assert_eq!(settings.pool_max_connections, 3);
        assert_eq!(settings.pool_acquire_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_bad_pool_settings_rejected() {
        let err = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[(DATABASE_URL_VAR, "mysql://db/chat"), (POOL_MAX_CONNECTIONS_VAR, "0")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be at least 1"));

        let err = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[(DATABASE_URL_VAR, "mysql://db/chat"), (POOL_ACQUIRE_TIMEOUT_VAR, "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains(POOL_ACQUIRE_TIMEOUT_VAR));
    }

    #[test]
    fn test_schema_setting() {
        let settings = Settings::resolve(
            &ConnectionArgs::default(),
            lookup(&[(DATABASE_URL_VAR, "mysql://db/chat"), (SCHEMA_VAR, "chat_archive")]),
        )
        .unwrap();
        assert_eq!(settings.schema.as_deref(), Some("chat_archive"));

        let args = ConnectionArgs {
            schema: Some("chat`; DROP".to_string()),
            ..Default::default()
        };
        let err = Settings::resolve(&args, lookup(&[(DATABASE_URL_VAR, "mysql://db/chat")]))
            .unwrap_err();
        assert!(err.to_string().contains("invalid schema"));
    }

    #[test]
    fn test_help_reflects_defaults() {
        let command = ConnectionArgs::augment_args(clap::Command::new("hotarchive"));
        let help = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_help())
                .map(|help| help.to_string())
                .unwrap_or_default()
        };

        assert!(help("source_table").ends_with(&format!(
            "[env: {}] [default: {}]",
            SOURCE_TABLE_VAR, SOURCE_TABLE
        )));
        assert!(help("metadata_table").contains(METADATA_TABLE));
        assert!(help("partition_prefix").ends_with(&format!("[default: {}]", PARTITION_PREFIX)));
        assert!(help("pool_max_connections")
            .ends_with(&format!("[default: {}]", DEFAULT_MAX_CONNECTIONS)));
        assert!(help("database_url").ends_with(&format!("[env: {}]", DATABASE_URL_VAR)));
    }
}
