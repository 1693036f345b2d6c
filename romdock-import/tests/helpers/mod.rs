//! Test Helper Utilities
//!
//! Shared utilities for romdock-import integration tests: a temporary root
//! folder, a fixture reference database in the OpenVGDB layout and an
//! in-memory media cache.

#![allow(dead_code)]

use async_trait::async_trait;
use md5::{Digest, Md5};
use romdock_common::config::ImportSettings;
use romdock_common::events::EventBus;
use romdock_import::config::ImportConfig;
use romdock_import::db::{
    init_database_pool, OpenVgdb, ReferenceDatabase, ReferenceDbError, SqliteCatalog,
};
use romdock_import::models::{system::parse_systems, MetadataRecord, SystemRegistry};
use romdock_import::services::{ImportContext, ImportOrchestrator, MediaCache};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// NES-like cartridge system with a 16-byte header
pub const NES: &str = "test.nes";
/// Disc-image system claiming cue sheets
pub const PSX: &str = "test.psx";
/// Three systems sharing the `bin` extension
pub const BIN_SYSTEMS: [&str; 3] = ["test.alpha", "test.beta", "test.gamma"];

/// Contents of the `PSX` BIOS `scph5501.bin` listed in `TEST_SYSTEMS`
pub const PSX_FIRMWARE: &[u8] = b"test firmware dump";

/// Reference-database system id of `NES`
pub const NES_DATABASE_ID: i64 = 25;

pub const TEST_SYSTEMS: &str = r#"
[[system]]
id = "test.nes"
name = "Test Cartridge"
short_name = "NES"
extensions = ["nes"]
database_id = 25
header_size = 16

[[system]]
id = "test.psx"
name = "Test Disc"
short_name = "PSX"
extensions = ["cue"]
uses_disc_images = true
database_id = 6

[[system.bios]]
file_name = "scph5501.bin"
md5 = "c65d407d0bf2c76a61ce8fb418548f43"
size = 18

[[system]]
id = "test.alpha"
name = "Alpha"
extensions = ["bin"]

[[system]]
id = "test.beta"
name = "Beta"
extensions = ["bin"]

[[system]]
id = "test.gamma"
name = "Gamma"
extensions = ["bin"]
"#;

/// Temporary root folder with the full layout created
pub struct TestRoot {
    /// Must be kept alive for the duration of the test
    pub dir: TempDir,
    pub config: ImportConfig,
}

impl TestRoot {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp root");
        let settings = ImportSettings {
            work_concurrency: 2,
            stability_interval_ms: 200,
            ..ImportSettings::default()
        };
        let config = ImportConfig::from_settings(dir.path(), &settings);
        config
            .layout
            .ensure_dirs()
            .expect("Failed to create root layout");
        Self { dir, config }
    }

    pub fn imports(&self) -> &Path {
        &self.config.layout.imports
    }

    pub fn conflicts(&self) -> &Path {
        &self.config.layout.conflicts
    }

    pub fn system_dir(&self, system_id: &str) -> PathBuf {
        self.config.layout.system_dir(system_id)
    }

    pub fn bios_dir(&self, system_id: &str) -> PathBuf {
        self.config.layout.bios.join(system_id)
    }

    /// Write a file into the import directory
    pub fn drop_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.imports().join(name);
        std::fs::write(&path, contents).expect("Failed to write import file");
        path
    }
}

/// Bytes of a headered cartridge dump: 16 header bytes, then `payload`
pub fn cartridge(payload: &[u8]) -> Vec<u8> {
    let mut bytes = b"NES\x1a\x01\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

/// Lower-case MD5 hex, as the catalog stores it
pub fn md5_hex(bytes: &[u8]) -> String {
    Md5::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// PNG-encoded solid image
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    out.into_inner()
}

/// Empty reference database in the OpenVGDB layout
pub struct ReferenceFixture {
    pub pool: SqlitePool,
}

impl ReferenceFixture {
    pub async fn create(dir: &Path) -> Self {
        let db_url = format!("sqlite:{}?mode=rwc", dir.join("openvgdb.sqlite").display());
        let pool = SqlitePool::connect(&db_url)
            .await
            .expect("Failed to create reference database");

        sqlx::query(
            r#"
            CREATE TABLE ROMs (
                romID INTEGER PRIMARY KEY,
                systemID INTEGER,
                romHashMD5 TEXT,
                romSerial TEXT,
                TEMPRomRegion TEXT
            );

            CREATE TABLE RELEASES (
                releaseID INTEGER PRIMARY KEY,
                romID INTEGER,
                releaseTitleName TEXT,
                releaseCoverFront TEXT,
                releaseCoverBack TEXT,
                regionLocalizedID INTEGER,
                releaseDescription TEXT,
                releaseDeveloper TEXT,
                releasePublisher TEXT,
                releaseGenre TEXT,
                releaseDate TEXT,
                releaseReferenceURL TEXT
            );
            "#,
        )
        .execute(&pool)
        .await
        .expect("Failed to create reference schema");

        Self { pool }
    }

    /// ROM row; `md5` is stored upper-case like the real database
    pub async fn add_rom(&self, rom_id: i64, system_id: i64, md5: &str, region: &str) {
        sqlx::query(
            "INSERT INTO ROMs (romID, systemID, romHashMD5, TEMPRomRegion) VALUES (?, ?, ?, ?)",
        )
        .bind(rom_id)
        .bind(system_id)
        .bind(md5.to_uppercase())
        .bind(region)
        .execute(&self.pool)
        .await
        .expect("Failed to insert ROM row");
    }

    pub async fn add_release(
        &self,
        release_id: i64,
        rom_id: i64,
        title: &str,
        region_id: i64,
        publisher: &str,
        cover_url: Option<&str>,
    ) {
        sqlx::query(
            "INSERT INTO RELEASES (releaseID, romID, releaseTitleName, regionLocalizedID, \
             releasePublisher, releaseCoverFront) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(release_id)
        .bind(rom_id)
        .bind(title)
        .bind(region_id)
        .bind(publisher)
        .bind(cover_url)
        .execute(&self.pool)
        .await
        .expect("Failed to insert release row");
    }

    pub fn database(&self) -> Arc<dyn ReferenceDatabase> {
        Arc::new(OpenVgdb::from_pool(self.pool.clone()))
    }
}

/// Reference database wrapper counting queries
pub struct CountingReference {
    inner: Arc<dyn ReferenceDatabase>,
    pub hash_queries: AtomicUsize,
    pub name_queries: AtomicUsize,
}

impl CountingReference {
    pub fn new(inner: Arc<dyn ReferenceDatabase>) -> Self {
        Self {
            inner,
            hash_queries: AtomicUsize::new(0),
            name_queries: AtomicUsize::new(0),
        }
    }

    pub fn hash_query_count(&self) -> usize {
        self.hash_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceDatabase for CountingReference {
    async fn query_by_hash(&self, md5: &str) -> Result<Vec<MetadataRecord>, ReferenceDbError> {
        self.hash_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query_by_hash(md5).await
    }

    async fn query_by_filename(
        &self,
        system_database_id: i64,
        name: &str,
    ) -> Result<Vec<MetadataRecord>, ReferenceDbError> {
        self.name_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query_by_filename(system_database_id, name).await
    }
}

/// Media cache held in memory
#[derive(Default)]
pub struct MemoryMediaCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryMediaCache {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaCache for MemoryMediaCache {
    async fn exists(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    async fn put(&self, bytes: Vec<u8>, key: &str) -> std::io::Result<PathBuf> {
        self.entries.lock().unwrap().insert(key.to_string(), bytes);
        Ok(PathBuf::from(format!("memory://{}", key)))
    }

    async fn get(&self, key: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }
}

/// Catalog backed by `romdock.db` under the test root
pub async fn create_catalog(root: &TestRoot) -> Arc<SqliteCatalog> {
    let pool = init_database_pool(&root.config.layout.catalog_db)
        .await
        .expect("Failed to create catalog database");
    Arc::new(SqliteCatalog::new(pool))
}

pub struct TestPipeline {
    pub orchestrator: Arc<ImportOrchestrator>,
    pub catalog: Arc<SqliteCatalog>,
    pub media_cache: Arc<MemoryMediaCache>,
    pub event_bus: EventBus,
}

/// Orchestrator over the test systems, a SQLite catalog and `reference`
pub async fn create_pipeline(root: &TestRoot, reference: Arc<dyn ReferenceDatabase>) -> TestPipeline {
    let systems = parse_systems(TEST_SYSTEMS).expect("Invalid test systems");
    let registry = Arc::new(SystemRegistry::new(systems, &root.config.layout.roms));
    let catalog = create_catalog(root).await;
    let media_cache = Arc::new(MemoryMediaCache::default());
    let event_bus = EventBus::new(256);

    let orchestrator = Arc::new(ImportOrchestrator::new(ImportContext {
        config: root.config.clone(),
        registry,
        catalog: catalog.clone(),
        reference,
        media_cache: media_cache.clone(),
        event_bus: event_bus.clone(),
        http: reqwest::Client::new(),
    }));

    TestPipeline {
        orchestrator,
        catalog,
        media_cache,
        event_bus,
    }
}
