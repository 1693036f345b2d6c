//! SCAN phase
//!
//! Turns the raw input paths into work items. Runs serially so that disc
//! images are grouped and moved before any per-file work starts.

use super::{ImportOrchestrator, WorkItem};
use crate::models::{BatchReport, FileOutcome, SystemSnapshot};
use crate::naming;
use crate::services::candidate::ImportCandidate;
use crate::services::cd_grouper;
use crate::services::system_resolver::Resolution;
use romdock_common::events::RomdockEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Output of the scan phase
pub(super) struct Scanned {
    pub work: Vec<WorkItem>,
    /// Images to try as custom artwork once ROMs are in the catalog
    pub images: Vec<PathBuf>,
}

impl ImportOrchestrator {
    pub(super) async fn phase_scan(
        &self,
        inputs: Vec<PathBuf>,
        snapshot: &Arc<SystemSnapshot>,
        report: &mut BatchReport,
    ) -> Scanned {
        let mut paths = self.expand_inputs(inputs, report).await;
        naming::sort_for_import(&mut paths);
        tracing::debug!(files = paths.len(), "Phase SCAN");

        let mut scanned = Scanned {
            work: Vec::new(),
            images: Vec::new(),
        };

        for path in paths {
            // Moved away earlier in this loop as part of a disc image
            if !path.exists() {
                continue;
            }

            if naming::is_artwork(&path) {
                scanned.images.push(path);
                continue;
            }

            if let Some(outcome) = self.route_bios(&path, snapshot).await {
                report.record(path, outcome);
                continue;
            }

            if naming::is_playlist(&path) {
                match cd_grouper::attach_playlist(&path, &self.ctx.catalog, snapshot).await {
                    Ok(Some(entry)) => {
                        report.record(
                            path,
                            FileOutcome::Attached {
                                content_hash: entry.content_hash,
                            },
                        );
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "Playlist attach failed: {}", e);
                        report.record(path, e.into());
                        continue;
                    }
                }
            }

            if naming::is_descriptor(&path) {
                if let Err(e) = self.scan_descriptor(&path, snapshot, &mut scanned, report).await {
                    tracing::warn!(path = %path.display(), "Disc image grouping failed: {}", e);
                    report.record(path, e.into());
                }
                continue;
            }

            scanned.work.push(WorkItem {
                source: path.clone(),
                candidate: ImportCandidate::for_snapshot(path, snapshot),
                system: None,
                related: Vec::new(),
            });
        }

        scanned
    }

    /// Install the file as a BIOS when it is one; None when it is not
    async fn route_bios(&self, path: &Path, snapshot: &SystemSnapshot) -> Option<FileOutcome> {
        let bios = match self.bios.identify(path, snapshot).await {
            Ok(Some(bios)) => bios,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "BIOS check failed: {}", e);
                return None;
            }
        };

        Some(match self.bios.install(path, &bios).await {
            Ok(installed) => {
                self.ctx.event_bus.emit_lossy(RomdockEvent::BiosInstalled {
                    system_id: bios.system.id.clone(),
                    path: installed,
                    timestamp: chrono::Utc::now(),
                });
                FileOutcome::Bios {
                    system_id: bios.system.id.clone(),
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "BIOS install failed: {}", e);
                e.into()
            }
        })
    }

    /// Resolve a descriptor and move it with its siblings
    async fn scan_descriptor(
        &self,
        path: &Path,
        snapshot: &Arc<SystemSnapshot>,
        scanned: &mut Scanned,
        report: &mut BatchReport,
    ) -> crate::error::ImportResult<()> {
        let candidate = ImportCandidate::for_snapshot(path, snapshot);

        match self.resolver.resolve(&candidate, snapshot).await? {
            Resolution::Resolved { system, .. } => {
                if !system.uses_disc_images {
                    scanned.work.push(WorkItem {
                        source: path.to_path_buf(),
                        candidate,
                        system: Some(system),
                        related: Vec::new(),
                    });
                    return Ok(());
                }

                let dest = self.storage_dir(snapshot, &system.id);
                let grouped = cd_grouper::move_with_siblings(path, &dest).await?;
                let related = grouped
                    .siblings
                    .iter()
                    .map(|p| naming::relative_rom_path(&system.id, &naming::file_name_of(p)))
                    .collect();

                scanned.work.push(WorkItem {
                    source: path.to_path_buf(),
                    candidate: candidate.relocate(grouped.descriptor),
                    system: Some(system),
                    related,
                });
            }
            Resolution::Conflict { candidate_systems } => {
                self.hold_conflict(path, candidate_systems.clone()).await?;
                report.record(path.to_path_buf(), FileOutcome::Conflicted { candidate_systems });
            }
            Resolution::NotImportable { deleted } => {
                report.record(path.to_path_buf(), not_importable(deleted));
            }
        }
        Ok(())
    }

    /// Expand folders and archives into files
    async fn expand_inputs(&self, inputs: Vec<PathBuf>, report: &mut BatchReport) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for input in inputs {
            if !input.exists() || naming::is_hidden_or_marker(&input) {
                continue;
            }

            if input.is_dir() {
                files.extend(walk_folder(&input));
                continue;
            }

            if naming::is_archive(&input) {
                let dest = input
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.ctx.config.layout.imports.clone());
                self.ctx.event_bus.emit_lossy(RomdockEvent::ArchiveInflationStarted {
                    path: input.clone(),
                    timestamp: chrono::Utc::now(),
                });
                match self.extractor.extract(&input, &dest, None).await {
                    Ok(members) => files.extend(
                        members
                            .into_iter()
                            .filter(|m| !naming::is_hidden_or_marker(m)),
                    ),
                    Err(e) => {
                        tracing::warn!(archive = %input.display(), "Archive extraction failed: {}", e);
                        self.ctx.event_bus.emit_lossy(RomdockEvent::ArchiveInflationFailed {
                            path: input.clone(),
                            reason: e.to_string(),
                            timestamp: chrono::Utc::now(),
                        });
                        let error = crate::error::ImportError::ArchiveExtraction {
                            path: input.clone(),
                            reason: e.to_string(),
                        };
                        report.record(input, error.into());
                    }
                }
                continue;
            }

            files.push(input);
        }

        files
    }

    pub(super) fn storage_dir(&self, snapshot: &SystemSnapshot, system_id: &str) -> PathBuf {
        snapshot
            .storage_dir(system_id)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.ctx.config.layout.system_dir(system_id))
    }

    pub(super) async fn hold_conflict(
        &self,
        path: &Path,
        candidate_systems: Vec<String>,
    ) -> crate::error::ImportResult<PathBuf> {
        let held = self.conflicts.hold(path).await?;
        self.ctx.event_bus.emit_lossy(RomdockEvent::ConflictHeld {
            path: held.clone(),
            candidate_systems,
            timestamp: chrono::Utc::now(),
        });
        Ok(held)
    }
}

pub(super) fn not_importable(deleted: bool) -> FileOutcome {
    let reason = if deleted {
        "unsupported file type, deleted"
    } else {
        "unsupported file type"
    };
    FileOutcome::Skipped {
        reason: reason.to_string(),
    }
}

/// Visible files below a dropped folder; `__MACOSX` folders are deleted
fn walk_folder(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut walker = WalkDir::new(dir).into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "Walking folder failed: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if entry.depth() > 0 && naming::file_name_of(path) == "__MACOSX" {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            if let Err(e) = std::fs::remove_dir_all(path) {
                tracing::warn!(path = %path.display(), "Failed to delete __MACOSX folder: {}", e);
            }
            continue;
        }
        if entry.depth() > 0 && naming::is_hidden_or_marker(path) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }
        if entry.file_type().is_file() {
            files.push(path.to_path_buf());
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_walk_folder_skips_hidden_and_macosx() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("Drop");
        std::fs::create_dir_all(folder.join("__MACOSX")).unwrap();
        std::fs::create_dir_all(folder.join(".git")).unwrap();
        std::fs::create_dir_all(folder.join("disc")).unwrap();
        std::fs::write(folder.join("__MACOSX/._Game.nes"), b"x").unwrap();
        std::fs::write(folder.join(".git/HEAD"), b"x").unwrap();
        std::fs::write(folder.join(".DS_Store"), b"x").unwrap();
        std::fs::write(folder.join("Game.nes"), b"x").unwrap();
        std::fs::write(folder.join("disc/Game.cue"), b"x").unwrap();

        let mut files = walk_folder(&folder);
        files.sort();

        assert_eq!(files, vec![folder.join("Game.nes"), folder.join("disc/Game.cue")]);
        assert!(!folder.join("__MACOSX").exists());
    }
}
