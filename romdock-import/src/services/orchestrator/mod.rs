//! Import orchestrator
//!
//! # Batch progression
//! SCAN → RESOLVE → ARTWORK → COMPLETED
//!
//! - **SCAN** (`phase_scan`): expand folders and archives, order the batch,
//!   group disc images and attach playlists. Serial.
//! - **RESOLVE** (`phase_resolve`): per file, system resolution, move into
//!   storage, catalog insert-or-update, metadata, artwork download. Runs up
//!   to `work_concurrency` files at once.
//! - **ARTWORK**: images dropped next to ROMs become custom artwork, after
//!   every ROM of the batch is in the catalog.
//! - **COMPLETED**: `BatchCompleted` goes out with the conflict flag.
//!
//! Whole batches run one after another through the phase queue. Conflict
//! replays (`conflict_replay`) queue among themselves and then take the same
//! phase queue, so they never interleave with arriving imports.

use crate::config::ImportConfig;
use crate::db::{CatalogStore, ReferenceDatabase};
use crate::error::{ImportError, ImportResult};
use crate::models::{BatchReport, SystemDescriptor, SystemRegistry};
use crate::naming;
use crate::services::archive_extractor::ArchiveExtractor;
use crate::services::artwork_fetcher::{ArtworkFetcher, ArtworkSettings};
use crate::services::bios_router::BiosRouter;
use crate::services::catalog_matcher::CatalogMatcher;
use crate::services::conflict_handler::{ConflictHandler, HeldConflict};
use crate::services::media_cache::MediaCache;
use crate::services::metadata_resolver::MetadataResolver;
use crate::services::system_resolver::SystemResolver;
use romdock_common::events::{EventBus, RomdockEvent};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

mod conflict_replay;
mod phase_resolve;
mod phase_scan;

/// Everything the pipeline needs, built once at startup
#[derive(Clone)]
pub struct ImportContext {
    pub config: ImportConfig,
    pub registry: Arc<SystemRegistry>,
    pub catalog: Arc<dyn CatalogStore>,
    pub reference: Arc<dyn ReferenceDatabase>,
    pub media_cache: Arc<dyn MediaCache>,
    pub event_bus: EventBus,
    pub http: reqwest::Client,
}

/// One file ready for the resolve phase
#[derive(Debug)]
struct WorkItem {
    /// Where the file was when the batch started
    source: PathBuf,
    candidate: crate::services::candidate::ImportCandidate,
    /// Decided during scan (disc images, conflict replays)
    system: Option<Arc<SystemDescriptor>>,
    /// Catalog-relative paths of siblings that moved with the file
    related: Vec<String>,
}

/// Import pipeline service
pub struct ImportOrchestrator {
    ctx: ImportContext,
    extractor: ArchiveExtractor,
    bios: BiosRouter,
    resolver: SystemResolver,
    matcher: CatalogMatcher,
    conflicts: ConflictHandler,
    metadata: MetadataResolver,
    artwork: ArtworkFetcher,
    phase_queue: Mutex<()>,
    conflict_queue: Mutex<()>,
    hash_locks: HashLocks,
}

impl ImportOrchestrator {
    pub fn new(ctx: ImportContext) -> Self {
        let layout = &ctx.config.layout;
        let artwork = ArtworkFetcher::new(
            ctx.http.clone(),
            Arc::clone(&ctx.catalog),
            Arc::clone(&ctx.media_cache),
            ctx.event_bus.clone(),
            ArtworkSettings {
                max_resolution: ctx.config.artwork_max_resolution,
                jpeg_quality: ctx.config.artwork_jpeg_quality,
            },
        );

        Self {
            extractor: ArchiveExtractor::new(),
            bios: BiosRouter::new(&layout.bios),
            resolver: SystemResolver::new(
                Arc::clone(&ctx.catalog),
                Arc::clone(&ctx.reference),
                &layout.imports,
            ),
            matcher: CatalogMatcher::new(Arc::clone(&ctx.catalog)),
            conflicts: ConflictHandler::new(&layout.conflicts),
            metadata: MetadataResolver::new(Arc::clone(&ctx.catalog), Arc::clone(&ctx.reference)),
            artwork,
            phase_queue: Mutex::new(()),
            conflict_queue: Mutex::new(()),
            hash_locks: HashLocks::default(),
            ctx,
        }
    }

    pub fn context(&self) -> &ImportContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<SystemRegistry> {
        &self.ctx.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.ctx.event_bus
    }

    /// Run one batch to completion
    ///
    /// Individual file failures are recorded in the report; nothing aborts
    /// the batch.
    pub async fn import_batch(&self, paths: Vec<PathBuf>) -> BatchReport {
        self.import_batch_with_id(Uuid::new_v4(), paths).await
    }

    /// Same as `import_batch` with a caller-chosen batch id
    pub async fn import_batch_with_id(&self, batch_id: Uuid, paths: Vec<PathBuf>) -> BatchReport {
        let _phase = self.phase_queue.lock().await;
        let snapshot = self.ctx.registry.snapshot();
        let mut report = BatchReport::new(batch_id);

        tracing::info!(batch_id = %batch_id, inputs = paths.len(), "Batch started");

        let scanned = self.phase_scan(paths, &snapshot, &mut report).await;
        self.phase_resolve(scanned.work, &snapshot, &mut report).await;
        self.phase_artwork(scanned.images, &snapshot, &mut report).await;

        self.complete_batch(&report);
        report
    }

    /// Visible top-level entries of the import directory
    pub async fn list_import_dir(&self) -> ImportResult<Vec<PathBuf>> {
        let imports = &self.ctx.config.layout.imports;
        let mut read_dir = tokio::fs::read_dir(imports)
            .await
            .map_err(|e| ImportError::fs(imports, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| ImportError::fs(imports, e))?
        {
            let path = entry.path();
            if !naming::is_hidden_or_marker(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Files waiting in the conflicts directory
    pub async fn list_conflicts(&self) -> ImportResult<Vec<HeldConflict>> {
        let snapshot = self.ctx.registry.snapshot();
        self.conflicts.list(&snapshot).await
    }

    /// Install a new system list
    pub fn reload_systems(&self, systems: Vec<SystemDescriptor>) -> usize {
        let system_count = self.ctx.registry.reload(systems);
        self.ctx.event_bus.emit_lossy(RomdockEvent::SystemsReloaded {
            system_count,
            timestamp: chrono::Utc::now(),
        });
        system_count
    }

    fn complete_batch(&self, report: &BatchReport) {
        tracing::info!(
            batch_id = %report.batch_id,
            imported = report.imported(),
            updated = report.updated(),
            conflicts = report.conflicted(),
            failed = report.failed(),
            "Batch completed"
        );
        self.ctx.event_bus.emit_lossy(RomdockEvent::BatchCompleted {
            batch_id: report.batch_id,
            encountered_conflicts: report.encountered_conflicts,
            imported: report.imported(),
            updated: report.updated(),
            failed: report.failed(),
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Per-hash mutual exclusion for catalog writes
///
/// Two files with the same content never run insert-or-update at the same
/// time; the second waits and then finds the first one's entry.
#[derive(Default)]
struct HashLocks {
    inner: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

struct HashGuard<'a> {
    locks: &'a HashLocks,
    hash: String,
    _guard: OwnedMutexGuard<()>,
}

impl HashLocks {
    async fn acquire(&self, hash: &str) -> HashGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(map.entry(hash.to_string()).or_default())
        };
        HashGuard {
            locks: self,
            hash: hash.to_string(),
            _guard: lock.lock_owned().await,
        }
    }
}

impl Drop for HashGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.inner.lock().unwrap_or_else(|p| p.into_inner());
        // Map plus this guard: nobody is waiting
        if map
            .get(&self.hash)
            .map(|lock| Arc::strong_count(lock) <= 2)
            .unwrap_or(false)
        {
            map.remove(&self.hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_hash_lock_serializes_same_hash() {
        let locks = Arc::new(HashLocks::default());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let first = locks.acquire("abc").await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let _guard = locks.acquire("abc").await;
                order.lock().unwrap().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        order.lock().unwrap().push("first");
        drop(first);
        waiter.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert!(locks.inner.lock().unwrap().is_empty(), "entry removed when idle");
    }

    #[tokio::test]
    async fn test_hash_lock_other_hash_not_blocked() {
        let locks = HashLocks::default();
        let _a = locks.acquire("aaa").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("bbb")).await;
        assert!(b.is_ok());
    }
}
