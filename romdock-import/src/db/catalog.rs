//! Catalog store
//!
//! One row per content hash. Every mutation runs in its own transaction.

use crate::models::CatalogEntry;
use crate::naming;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use romdock_common::{Error, Result};
use sqlx::SqlitePool;

/// How a catalog search matches an entry's paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPredicate {
    /// Stored relative path equals the value
    RelativePath(String),
    /// Value is one of the entry's related files
    RelatedFile(String),
    /// Entry's file name contains the value, ignoring case
    FileNameContains(String),
    /// Entry's stem, with disc qualifiers stripped and cut to the value's
    /// length, equals the value
    StrippedPrefix(String),
}

impl PathPredicate {
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        match self {
            PathPredicate::RelativePath(path) => entry.relative_path == *path,
            PathPredicate::RelatedFile(path) => entry.related_files.iter().any(|p| p == path),
            PathPredicate::FileNameContains(fragment) => {
                !fragment.is_empty()
                    && entry
                        .file_name()
                        .to_lowercase()
                        .contains(&fragment.to_lowercase())
            }
            PathPredicate::StrippedPrefix(stripped) => {
                naming::matches_stripped(entry.base_name(), stripped)
            }
        }
    }
}

/// In-place edit of a stored entry, applied inside the update transaction
pub type EntryMutation = Box<dyn for<'a> FnOnce(&'a mut CatalogEntry) + Send>;

/// Catalog persistence used by the pipeline
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<CatalogEntry>>;

    /// Entries of the given systems matching `predicate`, ordered by path
    async fn find(
        &self,
        system_ids: &[String],
        predicate: &PathPredicate,
    ) -> Result<Vec<CatalogEntry>>;

    /// Insert a new entry; false when an entry with that hash already exists
    async fn insert(&self, entry: &CatalogEntry) -> Result<bool>;

    /// Apply `mutation` to the stored entry and write it back
    ///
    /// The mutation may change the content hash; writing fails if another
    /// entry already owns the new hash.
    async fn update(
        &self,
        content_hash: &str,
        mutation: EntryMutation,
    ) -> Result<CatalogEntry>;

    async fn all(&self) -> Result<Vec<CatalogEntry>>;
}

#[derive(sqlx::FromRow)]
struct CatalogRow {
    content_hash: String,
    system_id: String,
    relative_path: String,
    related_files: String,
    requires_metadata_sync: bool,
    title: String,
    artwork_url: Option<String>,
    artwork_ref: Option<String>,
    custom_artwork_ref: Option<String>,
    box_back_url: Option<String>,
    region: Option<String>,
    region_id: Option<i64>,
    description: Option<String>,
    developer: Option<String>,
    publisher: Option<String>,
    genres: Option<String>,
    release_date: Option<String>,
    reference_url: Option<String>,
    external_release_id: Option<i64>,
    serial_number: Option<String>,
    imported_at: DateTime<Utc>,
}

impl TryFrom<CatalogRow> for CatalogEntry {
    type Error = Error;

    fn try_from(row: CatalogRow) -> Result<Self> {
        let related_files: Vec<String> =
            serde_json::from_str(&row.related_files).map_err(|e| Error::MalformedEntry {
                content_hash: row.content_hash.clone(),
                reason: format!("related_files: {}", e),
            })?;

        Ok(CatalogEntry {
            content_hash: row.content_hash,
            system_id: row.system_id,
            relative_path: row.relative_path,
            related_files,
            requires_metadata_sync: row.requires_metadata_sync,
            title: row.title,
            artwork_url: row.artwork_url,
            artwork_ref: row.artwork_ref,
            custom_artwork_ref: row.custom_artwork_ref,
            box_back_url: row.box_back_url,
            region: row.region,
            region_id: row.region_id,
            description: row.description,
            developer: row.developer,
            publisher: row.publisher,
            genres: row.genres,
            release_date: row.release_date,
            reference_url: row.reference_url,
            external_release_id: row.external_release_id,
            serial_number: row.serial_number,
            imported_at: row.imported_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT content_hash, system_id, relative_path, related_files, \
     requires_metadata_sync, title, artwork_url, artwork_ref, custom_artwork_ref, box_back_url, \
     region, region_id, description, developer, publisher, genres, release_date, reference_url, \
     external_release_id, serial_number, imported_at FROM catalog_entries";

/// SQLite-backed catalog
#[derive(Clone)]
pub struct SqliteCatalog {
    db: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    async fn fetch_system(&self, system_id: &str) -> Result<Vec<CatalogEntry>> {
        let rows: Vec<CatalogRow> = sqlx::query_as(&format!(
            "{} WHERE system_id = ? ORDER BY relative_path",
            SELECT_COLUMNS
        ))
        .bind(system_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(CatalogEntry::try_from).collect()
    }
}

fn related_json(entry: &CatalogEntry) -> Result<String> {
    serde_json::to_string(&entry.related_files).map_err(|e| Error::MalformedEntry {
        content_hash: entry.content_hash.clone(),
        reason: format!("related_files: {}", e),
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<CatalogEntry>> {
        let row: Option<CatalogRow> =
            sqlx::query_as(&format!("{} WHERE content_hash = ?", SELECT_COLUMNS))
                .bind(content_hash)
                .fetch_optional(&self.db)
                .await?;

        row.map(CatalogEntry::try_from).transpose()
    }

    async fn find(
        &self,
        system_ids: &[String],
        predicate: &PathPredicate,
    ) -> Result<Vec<CatalogEntry>> {
        let mut found = Vec::new();

        for system_id in system_ids {
            if let PathPredicate::RelativePath(path) = predicate {
                let rows: Vec<CatalogRow> = sqlx::query_as(&format!(
                    "{} WHERE system_id = ? AND relative_path = ?",
                    SELECT_COLUMNS
                ))
                .bind(system_id)
                .bind(path)
                .fetch_all(&self.db)
                .await?;
                for row in rows {
                    found.push(CatalogEntry::try_from(row)?);
                }
            } else {
                found.extend(
                    self.fetch_system(system_id)
                        .await?
                        .into_iter()
                        .filter(|e| predicate.matches(e)),
                );
            }
        }

        found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(found)
    }

    async fn insert(&self, entry: &CatalogEntry) -> Result<bool> {
        let related = related_json(entry)?;
        let result = sqlx::query(
            r#"
            INSERT INTO catalog_entries (
                content_hash, system_id, relative_path, related_files, requires_metadata_sync,
                title, artwork_url, artwork_ref, custom_artwork_ref, box_back_url, region,
                region_id, description, developer, publisher, genres, release_date,
                reference_url, external_release_id, serial_number, imported_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
        )
        .bind(&entry.content_hash)
        .bind(&entry.system_id)
        .bind(&entry.relative_path)
        .bind(related)
        .bind(entry.requires_metadata_sync)
        .bind(&entry.title)
        .bind(&entry.artwork_url)
        .bind(&entry.artwork_ref)
        .bind(&entry.custom_artwork_ref)
        .bind(&entry.box_back_url)
        .bind(&entry.region)
        .bind(entry.region_id)
        .bind(&entry.description)
        .bind(&entry.developer)
        .bind(&entry.publisher)
        .bind(&entry.genres)
        .bind(&entry.release_date)
        .bind(&entry.reference_url)
        .bind(entry.external_release_id)
        .bind(&entry.serial_number)
        .bind(entry.imported_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(
        &self,
        content_hash: &str,
        mutation: EntryMutation,
    ) -> Result<CatalogEntry> {
        let mut tx = self.db.begin().await?;

        let row: Option<CatalogRow> =
            sqlx::query_as(&format!("{} WHERE content_hash = ?", SELECT_COLUMNS))
                .bind(content_hash)
                .fetch_optional(&mut *tx)
                .await?;
        let mut entry = match row {
            Some(row) => CatalogEntry::try_from(row)?,
            None => return Err(Error::EntryNotFound(content_hash.to_string())),
        };

        mutation(&mut entry);
        let related = related_json(&entry)?;

        sqlx::query(
            r#"
            UPDATE catalog_entries SET
                content_hash = ?, system_id = ?, relative_path = ?, related_files = ?,
                requires_metadata_sync = ?, title = ?, artwork_url = ?, artwork_ref = ?,
                custom_artwork_ref = ?, box_back_url = ?, region = ?, region_id = ?,
                description = ?, developer = ?, publisher = ?, genres = ?, release_date = ?,
                reference_url = ?, external_release_id = ?, serial_number = ?
            WHERE content_hash = ?
            "#,
        )
        .bind(&entry.content_hash)
        .bind(&entry.system_id)
        .bind(&entry.relative_path)
        .bind(related)
        .bind(entry.requires_metadata_sync)
        .bind(&entry.title)
        .bind(&entry.artwork_url)
        .bind(&entry.artwork_ref)
        .bind(&entry.custom_artwork_ref)
        .bind(&entry.box_back_url)
        .bind(&entry.region)
        .bind(entry.region_id)
        .bind(&entry.description)
        .bind(&entry.developer)
        .bind(&entry.publisher)
        .bind(&entry.genres)
        .bind(&entry.release_date)
        .bind(&entry.reference_url)
        .bind(entry.external_release_id)
        .bind(&entry.serial_number)
        .bind(content_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    async fn all(&self) -> Result<Vec<CatalogEntry>> {
        let rows: Vec<CatalogRow> =
            sqlx::query_as(&format!("{} ORDER BY system_id, relative_path", SELECT_COLUMNS))
                .fetch_all(&self.db)
                .await?;

        rows.into_iter().map(CatalogEntry::try_from).collect()
    }
}
