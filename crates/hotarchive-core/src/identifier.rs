//! Identifier validation for table, column and partition names.
//!
//! DDL statements cannot bind identifiers as parameters, so every name that
//! ends up in a `format!()`-built statement passes through
//! [`validate_identifier`] first and is then wrapped by [`quote_identifier`]
//! or [`quote_qualified`]. Table and column names are checked when
//! `ArchiverConfig` is built, partition names when the archive table name is
//! resolved.

use crate::defaults::MAX_IDENTIFIER_LEN;
use crate::error::{Error, Result};

const RESERVED_KEYWORDS: &[&str] = &[
    "mysql",
    "information_schema",
    "performance_schema",
    "sys",
    "select",
    "insert",
    "update",
    "delete",
    "drop",
    "create",
    "alter",
    "grant",
    "revoke",
    "truncate",
    "table",
    "partition",
];

/// Validate a MySQL identifier (table, column or partition name).
///
/// Identifiers must:
/// - Not be empty
/// - Not exceed 64 characters (MySQL identifier limit)
/// - Start with an ASCII letter or underscore
/// - Contain only ASCII alphanumerics and underscores
/// - Not be a reserved keyword or system schema name
///
/// # Examples
///
/// ```
/// use hotarchive_core::validate_identifier;
///
/// assert!(validate_identifier("messages").is_ok());
/// assert!(validate_identifier("messages_archive_2024_Q1").is_ok());
/// assert!(validate_identifier("2024_q1").is_err());
/// assert!(validate_identifier("").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "Identifier exceeds {} character limit: {} characters",
            MAX_IDENTIFIER_LEN,
            name.len()
        )));
    }

    if let Some(first) = name.chars().next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::InvalidInput(format!(
                "Identifier must start with a letter or underscore, found: '{}'",
                first
            )));
        }
    }

    for ch in name.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '_' {
            return Err(Error::InvalidInput(format!(
                "Identifier '{}' contains invalid character: '{}'",
                name, ch
            )));
        }
    }

    if RESERVED_KEYWORDS.contains(&name.to_lowercase().as_str()) {
        return Err(Error::InvalidInput(format!(
            "Identifier '{}' is a reserved keyword",
            name
        )));
    }

    Ok(())
}

/// Wrap an identifier in backticks, doubling any embedded backtick.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote `name`, qualified by `schema` when one is given.
pub fn quote_qualified(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(name)),
        None => quote_identifier(name),
    }
}
