//! Configuration resolution for romdock-import
//!
//! Combines the resolved root folder with the `[import]` TOML section.
//! Environment variables override individual TOML values:
//! `ROMDOCK_WORK_CONCURRENCY`, `ROMDOCK_STABILITY_INTERVAL_MS`,
//! `ROMDOCK_REFERENCE_DB`.

use romdock_common::config::{ImportSettings, TomlConfig};
use romdock_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Well-known folders below the root folder
#[derive(Debug, Clone)]
pub struct RootLayout {
    pub root: PathBuf,
    /// Drop folder the watcher monitors
    pub imports: PathBuf,
    /// Flat holding area for unresolved files
    pub conflicts: PathBuf,
    /// Parent of every system's storage directory
    pub roms: PathBuf,
    pub artwork_cache: PathBuf,
    /// Parent of every system's BIOS directory
    pub bios: PathBuf,
    pub catalog_db: PathBuf,
    /// Optional override of the bundled system list
    pub systems_file: PathBuf,
}

impl RootLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            imports: root.join("Imports"),
            conflicts: root.join("Conflicts"),
            roms: root.join("ROMs"),
            artwork_cache: root.join("Caches").join("Artwork"),
            bios: root.join("BIOS"),
            catalog_db: root.join("romdock.db"),
            systems_file: root.join("systems.toml"),
            root,
        }
    }

    /// Storage directory of one system
    pub fn system_dir(&self, system_id: &str) -> PathBuf {
        self.roms.join(system_id)
    }

    /// Create the folders the pipeline writes into
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.imports,
            &self.conflicts,
            &self.roms,
            &self.artwork_cache,
            &self.bios,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Effective configuration of the import service
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub layout: RootLayout,
    pub reference_db: PathBuf,
    pub stability_interval: Duration,
    pub work_concurrency: usize,
    pub artwork_max_resolution: u32,
    pub artwork_jpeg_quality: u8,
    pub bind_address: String,
    pub http_timeout: Duration,
}

impl ImportConfig {
    /// Resolve from TOML plus environment overrides
    ///
    /// **Priority:** ENV → TOML → default
    pub fn resolve(root: &Path, toml_config: &TomlConfig) -> Result<Self> {
        let mut settings = toml_config.import.clone();

        if let Some(value) = env_override::<usize>("ROMDOCK_WORK_CONCURRENCY")? {
            info!(work_concurrency = value, "Work concurrency from environment");
            settings.work_concurrency = value;
        }
        if let Some(value) = env_override::<u64>("ROMDOCK_STABILITY_INTERVAL_MS")? {
            info!(stability_interval_ms = value, "Stability interval from environment");
            settings.stability_interval_ms = value;
        }
        if let Ok(path) = std::env::var("ROMDOCK_REFERENCE_DB") {
            if settings.reference_database.is_some() {
                warn!("Reference database set in both environment and TOML, using environment");
            }
            settings.reference_database = Some(PathBuf::from(path));
        }

        settings.validate()?;
        Ok(Self::from_settings(root, &settings))
    }

    /// Build without consulting the environment
    pub fn from_settings(root: &Path, settings: &ImportSettings) -> Self {
        let layout = RootLayout::new(root);
        let reference_db = settings
            .reference_database
            .clone()
            .unwrap_or_else(|| layout.root.join("openvgdb.sqlite"));

        Self {
            layout,
            reference_db,
            stability_interval: Duration::from_millis(settings.stability_interval_ms),
            work_concurrency: settings.work_concurrency,
            artwork_max_resolution: settings.artwork_max_resolution,
            artwork_jpeg_quality: settings.artwork_jpeg_quality,
            bind_address: settings.bind_address.clone(),
            http_timeout: Duration::from_secs(settings.http_timeout_secs),
        }
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is not a valid value: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
