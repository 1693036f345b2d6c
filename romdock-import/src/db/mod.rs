//! Database access for romdock-import
//!
//! The catalog lives in `romdock.db` under the root folder. The reference
//! metadata database is a separate read-only SQLite file.

pub mod catalog;
pub mod reference;

pub use catalog::{CatalogStore, EntryMutation, PathPredicate, SqliteCatalog};
pub use reference::{OpenVgdb, ReferenceDatabase, ReferenceDbError, UnavailableReference};

use romdock_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the file and the catalog tables when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create catalog tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_entries (
            content_hash TEXT PRIMARY KEY,
            system_id TEXT NOT NULL,
            relative_path TEXT NOT NULL,
            related_files TEXT NOT NULL DEFAULT '[]',
            requires_metadata_sync INTEGER NOT NULL DEFAULT 1,
            title TEXT NOT NULL,
            artwork_url TEXT,
            artwork_ref TEXT,
            custom_artwork_ref TEXT,
            box_back_url TEXT,
            region TEXT,
            region_id INTEGER,
            description TEXT,
            developer TEXT,
            publisher TEXT,
            genres TEXT,
            release_date TEXT,
            reference_url TEXT,
            external_release_id INTEGER,
            serial_number TEXT,
            imported_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_system_path ON catalog_entries (system_id, relative_path)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (catalog_entries)");

    Ok(())
}
