//! Storage and configuration errors shared by the romdock crates
//!
//! Per-file pipeline failures live in `romdock_import::ImportError`; this
//! type covers what sits underneath them: the catalog database, the settings
//! file and the system list.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Catalog database failure
    #[cfg(feature = "sqlx")]
    #[error("Catalog database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file unreadable or a value out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// System list failed to parse or validate
    #[error("Invalid system list: {0}")]
    Systems(String),

    /// No catalog entry holds this content hash
    #[error("No catalog entry for hash {0}")]
    EntryNotFound(String),

    /// A stored catalog row could not be decoded or encoded
    #[error("Catalog entry {content_hash} is malformed: {reason}")]
    MalformedEntry {
        content_hash: String,
        reason: String,
    },
}
