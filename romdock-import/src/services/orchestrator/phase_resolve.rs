//! RESOLVE and ARTWORK phases
//!
//! Per file: system → storage move → catalog → metadata → artwork. Files run
//! concurrently up to the configured limit; each one's failure stays its own.

use super::{ImportOrchestrator, WorkItem};
use crate::error::ImportResult;
use crate::models::{BatchReport, FileOutcome, SystemDescriptor, SystemSnapshot};
use crate::naming;
use crate::services::candidate::ImportCandidate;
use crate::services::file_ops;
use crate::services::system_resolver::Resolution;
use futures::stream::{self, StreamExt};
use romdock_common::events::RomdockEvent;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

impl ImportOrchestrator {
    pub(super) async fn phase_resolve(
        &self,
        work: Vec<WorkItem>,
        snapshot: &Arc<SystemSnapshot>,
        report: &mut BatchReport,
    ) {
        if work.is_empty() {
            return;
        }
        let concurrency = self.ctx.config.work_concurrency.max(1);
        tracing::debug!(files = work.len(), concurrency, "Phase RESOLVE");

        let results: Vec<Vec<(PathBuf, FileOutcome)>> = stream::iter(group_disc_parts(work))
            .map(|group| async move {
                let mut outcomes = Vec::with_capacity(group.len());
                for item in group {
                    let source = item.source.clone();
                    let outcome = match self.process_item(item, snapshot).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::warn!(path = %source.display(), "Import failed: {}", e);
                            e.into()
                        }
                    };
                    outcomes.push((source, outcome));
                }
                outcomes
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (path, outcome) in results.into_iter().flatten() {
            report.record(path, outcome);
        }
    }

    async fn process_item(
        &self,
        item: WorkItem,
        snapshot: &Arc<SystemSnapshot>,
    ) -> ImportResult<FileOutcome> {
        let WorkItem {
            candidate,
            system,
            related,
            ..
        } = item;

        // A sibling grouped or held by another file of this batch
        if !candidate.path().exists() {
            if self.conflicts.is_held(&candidate.file_name()) {
                let candidate_systems = snapshot
                    .systems_for_extension(&candidate.extension())
                    .iter()
                    .map(|s| s.id.clone())
                    .collect();
                return Ok(FileOutcome::Conflicted { candidate_systems });
            }
            return Ok(FileOutcome::Skipped {
                reason: "moved with its disc image".to_string(),
            });
        }

        let system = match system {
            Some(system) => system,
            None => match self.resolver.resolve(&candidate, snapshot).await? {
                Resolution::Resolved { system, via } => {
                    tracing::debug!(
                        path = %candidate.path().display(),
                        system = %system.id,
                        via = ?via,
                        "System resolved"
                    );
                    system
                }
                Resolution::Conflict { candidate_systems } => {
                    self.hold_conflict(candidate.path(), candidate_systems.clone())
                        .await?;
                    return Ok(FileOutcome::Conflicted { candidate_systems });
                }
                Resolution::NotImportable { deleted } => {
                    return Ok(super::phase_scan::not_importable(deleted));
                }
            },
        };

        let dest_dir = self.storage_dir(snapshot, &system.id);
        let moved = file_ops::move_into(candidate.path(), &dest_dir).await?;
        let candidate = candidate.relocate(moved);

        self.finish(&system, candidate, related).await
    }

    /// Catalog, metadata and artwork for a file already in storage
    pub(super) async fn finish(
        &self,
        system: &SystemDescriptor,
        candidate: ImportCandidate,
        related: Vec<String>,
    ) -> ImportResult<FileOutcome> {
        let hash = candidate.content_hash().await?.to_string();
        let relative = naming::relative_rom_path(&system.id, &candidate.file_name());

        let _guard = self.hash_locks.acquire(&hash).await;
        let outcome = self.matcher.record(system, &relative, &hash, &related).await?;
        let inserted = outcome.is_insert();
        let mut entry = outcome.into_entry();

        let mut was_modified = false;
        if entry.requires_metadata_sync {
            self.ctx.event_bus.emit_lossy(RomdockEvent::ImportStarted {
                path: candidate.path().to_path_buf(),
                timestamp: chrono::Utc::now(),
            });
            match self.metadata.sync(&entry, system, true).await {
                Ok(sync) => {
                    if !sync.matched {
                        tracing::debug!(path = %relative, "No reference metadata for entry");
                    }
                    entry = sync.entry;
                    was_modified = true;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %relative,
                        "Metadata lookup failed, will retry on a later import: {}",
                        e
                    );
                }
            }
        }

        self.ctx.event_bus.emit_lossy(RomdockEvent::ImportFinished {
            content_hash: entry.content_hash.clone(),
            was_modified,
            timestamp: chrono::Utc::now(),
        });

        if let Err(e) = self.artwork.fetch(&entry).await {
            tracing::warn!(path = %relative, "Artwork not cached: {}", e);
        }

        let content_hash = entry.content_hash;
        Ok(if inserted {
            FileOutcome::Imported { content_hash }
        } else {
            FileOutcome::Updated { content_hash }
        })
    }

    /// Images become custom artwork of the ROMs they are named after
    pub(super) async fn phase_artwork(
        &self,
        images: Vec<PathBuf>,
        snapshot: &Arc<SystemSnapshot>,
        report: &mut BatchReport,
    ) {
        for image in images {
            let outcome = match self.artwork.import_local_artwork(&image, snapshot).await {
                Ok(Some(entry)) => FileOutcome::Attached {
                    content_hash: entry.content_hash,
                },
                Ok(None) => FileOutcome::Skipped {
                    reason: "no catalog entry for image".to_string(),
                },
                Err(e) => {
                    tracing::warn!(path = %image.display(), "Custom artwork failed: {}", e);
                    e.into()
                }
            };
            report.record(image, outcome);
        }
    }
}

/// Split a batch's work into units that may run concurrently
///
/// Loose disc-image parts sharing a folder and title run one after another,
/// shortest name first, so a conflict hold that takes the siblings along
/// never races their own work.
fn group_disc_parts(work: Vec<WorkItem>) -> Vec<Vec<WorkItem>> {
    let mut groups: Vec<Vec<WorkItem>> = Vec::new();
    let mut by_title: HashMap<(PathBuf, String), usize> = HashMap::new();

    for item in work {
        let path = item.candidate.path();
        if item.system.is_some() || !naming::is_cd_file(path) {
            groups.push(vec![item]);
            continue;
        }
        let key = (
            path.parent().map(Path::to_path_buf).unwrap_or_default(),
            naming::title_key(path),
        );
        match by_title.get(&key) {
            Some(&idx) => groups[idx].push(item),
            None => {
                by_title.insert(key, groups.len());
                groups.push(vec![item]);
            }
        }
    }

    for group in &mut groups {
        group.sort_by_cached_key(|item| {
            let path = item.candidate.path();
            (naming::stem_of(path).len(), path.to_path_buf())
        });
    }
    groups
}
