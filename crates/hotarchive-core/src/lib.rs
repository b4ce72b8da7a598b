//! # hotarchive-core
//!
//! Core types, traits, and the archival workflow for hotarchive.
//!
//! This crate is storage-agnostic: it defines what an archival run does
//! ([`PartitionArchiver`]) against the [`PartitionCatalog`] and
//! [`ArchiveBackend`] traits. `hotarchive-db` implements them for MySQL and
//! [`mock`] implements them in memory.

pub mod archiver;
pub mod config;
pub mod defaults;
pub mod error;
pub mod identifier;
pub mod logging;
pub mod mock;
pub mod models;
pub mod naming;
pub mod traits;

// Re-export commonly used types at crate root
pub use archiver::{check_compatible, ArchiveStep, PartitionArchiver};
pub use config::{ArchiverConfig, ArchiverConfigBuilder};
pub use error::{ArchiveFailure, Error, Result};
pub use identifier::{quote_identifier, quote_qualified, validate_identifier};
pub use models::*;
pub use naming::{ArchiveNameStrategy, PrefixNamingStrategy};
pub use traits::*;
