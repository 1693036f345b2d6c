//! Reference metadata database (OpenVGDB layout)
//!
//! Read-only. ROM hashes are stored upper-case.

use crate::models::MetadataRecord;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reference database errors
#[derive(Debug, Error)]
pub enum ReferenceDbError {
    #[error("Reference database query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Reference database unavailable: {0}")]
    Unavailable(String),
}

/// Lookups against the reference metadata database
#[async_trait]
pub trait ReferenceDatabase: Send + Sync {
    /// Releases of the ROM with this MD5, in release-id order
    async fn query_by_hash(&self, md5: &str) -> Result<Vec<MetadataRecord>, ReferenceDbError>;

    /// Releases of one system whose title contains `name`, titles starting
    /// with `name` first
    async fn query_by_filename(
        &self,
        system_database_id: i64,
        name: &str,
    ) -> Result<Vec<MetadataRecord>, ReferenceDbError>;
}

const RELEASE_COLUMNS: &str = "SELECT DISTINCT \
    rom.systemID AS system_id, \
    release.releaseID AS release_id, \
    release.releaseTitleName AS title, \
    release.releaseCoverFront AS artwork_url, \
    release.releaseCoverBack AS box_back_url, \
    rom.TEMPRomRegion AS region, \
    release.regionLocalizedID AS region_id, \
    release.releaseDescription AS description, \
    release.releaseDeveloper AS developer, \
    release.releasePublisher AS publisher, \
    release.releaseGenre AS genres, \
    release.releaseDate AS release_date, \
    release.releaseReferenceURL AS reference_url, \
    rom.romSerial AS serial_number \
    FROM ROMs rom LEFT JOIN RELEASES release USING (romID)";

#[derive(sqlx::FromRow)]
struct ReleaseRow {
    system_id: Option<i64>,
    release_id: Option<i64>,
    title: Option<String>,
    artwork_url: Option<String>,
    box_back_url: Option<String>,
    region: Option<String>,
    region_id: Option<i64>,
    description: Option<String>,
    developer: Option<String>,
    publisher: Option<String>,
    genres: Option<String>,
    release_date: Option<String>,
    reference_url: Option<String>,
    serial_number: Option<String>,
}

impl From<ReleaseRow> for MetadataRecord {
    fn from(row: ReleaseRow) -> Self {
        MetadataRecord {
            title: row.title,
            artwork_url: row.artwork_url,
            box_back_url: row.box_back_url,
            region: row.region,
            region_id: row.region_id,
            description: row.description,
            developer: row.developer,
            publisher: row.publisher,
            genres: row.genres,
            release_date: row.release_date,
            reference_url: row.reference_url,
            external_release_id: row.release_id,
            serial_number: row.serial_number,
            system_database_id: row.system_id,
        }
    }
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// OpenVGDB SQLite file
#[derive(Clone)]
pub struct OpenVgdb {
    db: SqlitePool,
}

impl OpenVgdb {
    /// Open read-only
    pub async fn open(path: &Path) -> Result<Self, ReferenceDbError> {
        if !path.exists() {
            return Err(ReferenceDbError::Unavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let db = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        tracing::info!(path = %path.display(), "Reference database opened");
        Ok(Self { db })
    }

    pub fn from_pool(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReferenceDatabase for OpenVgdb {
    async fn query_by_hash(&self, md5: &str) -> Result<Vec<MetadataRecord>, ReferenceDbError> {
        let rows: Vec<ReleaseRow> = sqlx::query_as(&format!(
            "{} WHERE rom.romHashMD5 = ? ORDER BY release.releaseID",
            RELEASE_COLUMNS
        ))
        .bind(md5.to_uppercase())
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(MetadataRecord::from).collect())
    }

    async fn query_by_filename(
        &self,
        system_database_id: i64,
        name: &str,
    ) -> Result<Vec<MetadataRecord>, ReferenceDbError> {
        let escaped = escape_like(name);
        let rows: Vec<ReleaseRow> = sqlx::query_as(&format!(
            "{} WHERE release.releaseTitleName LIKE ? ESCAPE '\\' AND rom.systemID = ? \
             ORDER BY CASE WHEN release.releaseTitleName LIKE ? ESCAPE '\\' THEN 0 ELSE 1 END, \
             release.releaseID",
            RELEASE_COLUMNS
        ))
        .bind(format!("%{}%", escaped))
        .bind(system_database_id)
        .bind(format!("{}%", escaped))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(MetadataRecord::from).collect())
    }
}

/// Stand-in used when no reference database file is configured
///
/// Every query fails, so entries stay flagged for a later sync.
pub struct UnavailableReference {
    path: PathBuf,
}

impl UnavailableReference {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReferenceDatabase for UnavailableReference {
    async fn query_by_hash(&self, _md5: &str) -> Result<Vec<MetadataRecord>, ReferenceDbError> {
        Err(ReferenceDbError::Unavailable(self.path.display().to_string()))
    }

    async fn query_by_filename(
        &self,
        _system_database_id: i64,
        _name: &str,
    ) -> Result<Vec<MetadataRecord>, ReferenceDbError> {
        Err(ReferenceDbError::Unavailable(self.path.display().to_string()))
    }
}
