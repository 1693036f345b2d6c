//! Emulated systems and the registry of lookup maps built from them
//!
//! Every lookup table (extension → systems, system → storage directory,
//! reference-database id → system) lives in one immutable `SystemSnapshot`.
//! `SystemRegistry` swaps in a complete new snapshot when the system list
//! changes; readers hold an `Arc` to whichever snapshot was current when they
//! started and never take a lock.

use arc_swap::ArcSwap;
use romdock_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Systems bundled with the binary
const BUNDLED_SYSTEMS: &str = include_str!("../../systems.toml");

/// One emulated system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDescriptor {
    /// Stable identifier, also the storage directory name
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    /// Lower-case extensions without the leading dot
    pub extensions: BTreeSet<String>,
    /// Multi-file disc images (cue/bin and friends)
    #[serde(default)]
    pub uses_disc_images: bool,
    /// System id in the reference database
    #[serde(default)]
    pub database_id: Option<i64>,
    /// Bytes of copier/iNES header skipped before hashing
    #[serde(default)]
    pub header_size: u64,
    /// Firmware files the system's emulators expect
    #[serde(default)]
    pub bios: Vec<BiosEntry>,
}

/// One firmware file a system needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiosEntry {
    /// Name the file must have in the system's BIOS directory
    pub file_name: String,
    #[serde(default)]
    pub description: String,
    /// Lower-case hex MD5 of a good dump
    #[serde(default)]
    pub md5: Option<String>,
    /// Byte size of a good dump; files of other sizes are never hashed
    #[serde(default)]
    pub size: Option<u64>,
}

/// A BIOS entry together with the system it belongs to
#[derive(Debug, Clone)]
pub struct BiosMatch {
    pub system: Arc<SystemDescriptor>,
    pub entry: BiosEntry,
}

impl SystemDescriptor {
    pub fn supports_extension(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.to_ascii_lowercase())
    }
}

#[derive(Debug, Deserialize)]
struct SystemsFile {
    #[serde(default)]
    system: Vec<SystemDescriptor>,
}

/// Parse a systems TOML document (`[[system]]` tables)
pub fn parse_systems(toml_text: &str) -> Result<Vec<SystemDescriptor>> {
    let file: SystemsFile =
        toml::from_str(toml_text).map_err(|e| Error::Systems(e.to_string()))?;

    let mut seen = BTreeSet::new();
    let mut systems = Vec::with_capacity(file.system.len());
    for mut system in file.system {
        if system.id.trim().is_empty() || system.id.contains(['/', '\\']) {
            return Err(Error::Systems(format!("invalid system id {:?}", system.id)));
        }
        if !seen.insert(system.id.clone()) {
            return Err(Error::Systems(format!("duplicate system id {}", system.id)));
        }
        system.extensions = system
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        for bios in &mut system.bios {
            if bios.file_name.trim().is_empty() || bios.file_name.contains(['/', '\\']) {
                return Err(Error::Systems(format!(
                    "invalid BIOS file name {:?} in {}",
                    bios.file_name, system.id
                )));
            }
            bios.md5 = bios.md5.take().map(|m| m.to_ascii_lowercase());
        }
        systems.push(system);
    }
    Ok(systems)
}

/// Systems from `override_file` when it exists, otherwise the bundled list
pub fn load_systems(override_file: &Path) -> Result<Vec<SystemDescriptor>> {
    if override_file.exists() {
        tracing::info!(path = %override_file.display(), "Loading systems from file");
        let text = std::fs::read_to_string(override_file)?;
        parse_systems(&text)
    } else {
        parse_systems(BUNDLED_SYSTEMS)
    }
}

/// Immutable lookup tables for one version of the system list
#[derive(Debug, Default)]
pub struct SystemSnapshot {
    systems: HashMap<String, Arc<SystemDescriptor>>,
    by_extension: HashMap<String, Vec<Arc<SystemDescriptor>>>,
    storage_dirs: HashMap<String, PathBuf>,
    by_database_id: HashMap<i64, Arc<SystemDescriptor>>,
    /// Lower-case BIOS file name → entry
    bios_by_name: HashMap<String, BiosMatch>,
    bios_by_md5: HashMap<String, BiosMatch>,
    bios_sizes: BTreeSet<u64>,
}

impl SystemSnapshot {
    pub fn build(systems: Vec<SystemDescriptor>, roms_root: &Path) -> Self {
        let mut snapshot = SystemSnapshot::default();

        for system in systems {
            let system = Arc::new(system);
            for ext in &system.extensions {
                snapshot
                    .by_extension
                    .entry(ext.clone())
                    .or_default()
                    .push(Arc::clone(&system));
            }
            if let Some(db_id) = system.database_id {
                snapshot.by_database_id.insert(db_id, Arc::clone(&system));
            }
            for entry in &system.bios {
                let bios = BiosMatch {
                    system: Arc::clone(&system),
                    entry: entry.clone(),
                };
                if let (Some(md5), Some(size)) = (&entry.md5, entry.size) {
                    snapshot.bios_sizes.insert(size);
                    snapshot
                        .bios_by_md5
                        .entry(md5.clone())
                        .or_insert_with(|| bios.clone());
                }
                snapshot
                    .bios_by_name
                    .entry(entry.file_name.to_lowercase())
                    .or_insert(bios);
            }
            snapshot
                .storage_dirs
                .insert(system.id.clone(), roms_root.join(&system.id));
            snapshot.systems.insert(system.id.clone(), system);
        }

        // Stable candidate order regardless of input order
        for candidates in snapshot.by_extension.values_mut() {
            candidates.sort_by(|a, b| a.id.cmp(&b.id));
        }
        snapshot
    }

    /// Systems claiming an extension (case-insensitive, no leading dot)
    pub fn systems_for_extension(&self, ext: &str) -> &[Arc<SystemDescriptor>] {
        self.by_extension
            .get(&ext.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_known_extension(&self, ext: &str) -> bool {
        !self.systems_for_extension(ext).is_empty()
    }

    pub fn system(&self, id: &str) -> Option<&Arc<SystemDescriptor>> {
        self.systems.get(id)
    }

    pub fn storage_dir(&self, id: &str) -> Option<&Path> {
        self.storage_dirs.get(id).map(PathBuf::as_path)
    }

    pub fn system_for_database_id(&self, db_id: i64) -> Option<&Arc<SystemDescriptor>> {
        self.by_database_id.get(&db_id)
    }

    /// BIOS entry with this file name, ignoring case
    pub fn bios_for_file_name(&self, file_name: &str) -> Option<&BiosMatch> {
        self.bios_by_name.get(&file_name.to_lowercase())
    }

    pub fn bios_for_md5(&self, md5: &str) -> Option<&BiosMatch> {
        self.bios_by_md5.get(&md5.to_ascii_lowercase())
    }

    /// Whether some BIOS identified by MD5 has this size
    pub fn is_bios_size(&self, size: u64) -> bool {
        self.bios_sizes.contains(&size)
    }

    /// Systems sorted by id
    pub fn systems(&self) -> Vec<Arc<SystemDescriptor>> {
        let mut all: Vec<_> = self.systems.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

/// Current system snapshot, replaced wholesale on reload
pub struct SystemRegistry {
    current: ArcSwap<SystemSnapshot>,
    roms_root: PathBuf,
}

impl SystemRegistry {
    pub fn new(systems: Vec<SystemDescriptor>, roms_root: impl Into<PathBuf>) -> Self {
        let roms_root = roms_root.into();
        let snapshot = SystemSnapshot::build(systems, &roms_root);
        Self {
            current: ArcSwap::from_pointee(snapshot),
            roms_root,
        }
    }

    /// Snapshot to use for one unit of work
    pub fn snapshot(&self) -> Arc<SystemSnapshot> {
        self.current.load_full()
    }

    /// Install a new system list; returns the number of systems
    ///
    /// Snapshots handed out earlier stay valid and unchanged.
    pub fn reload(&self, systems: Vec<SystemDescriptor>) -> usize {
        let snapshot = SystemSnapshot::build(systems, &self.roms_root);
        let count = snapshot.len();
        self.current.store(Arc::new(snapshot));
        tracing::info!(system_count = count, "System registry reloaded");
        count
    }
}
