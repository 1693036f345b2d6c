//! Conflict re-entry
//!
//! A person picked a system for files held in the conflicts directory. Each
//! file leaves the holding area for that system's storage directory and goes
//! through the same catalog, metadata and artwork steps as a fresh import.

use super::{ImportOrchestrator, WorkItem};
use crate::models::{BatchReport, FileOutcome};
use crate::naming;
use crate::services::candidate::ImportCandidate;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

impl ImportOrchestrator {
    /// Replay held files with the systems a person chose
    ///
    /// Keys may be absolute paths inside the conflicts directory or bare
    /// file names. Entries that name no held file or an unknown system are
    /// reported as failed and left alone.
    pub async fn resolve_conflicts(&self, mapping: HashMap<PathBuf, String>) -> BatchReport {
        let _conflict = self.conflict_queue.lock().await;
        let _phase = self.phase_queue.lock().await;

        let snapshot = self.ctx.registry.snapshot();
        let mut report = BatchReport::new(Uuid::new_v4());
        let mut requests: Vec<(PathBuf, String)> = mapping.into_iter().collect();
        requests.sort();

        tracing::info!(
            batch_id = %report.batch_id,
            files = requests.len(),
            "Replaying conflict resolutions"
        );

        let mut work = Vec::new();
        for (path, system_id) in requests {
            let Some(held) = self.conflicts.locate(&path) else {
                report.record(
                    path,
                    FileOutcome::Failed {
                        error: "not a file in the conflicts directory".to_string(),
                    },
                );
                continue;
            };
            let Some(system) = snapshot.system(&system_id).map(Arc::clone) else {
                report.record(
                    held,
                    FileOutcome::Failed {
                        error: format!("unknown system {}", system_id),
                    },
                );
                continue;
            };

            let dest = self.storage_dir(&snapshot, &system.id);
            match self.conflicts.take(&held, &dest, system.uses_disc_images).await {
                Ok((moved, siblings)) => {
                    let related = siblings
                        .iter()
                        .map(|p| naming::relative_rom_path(&system.id, &naming::file_name_of(p)))
                        .collect();
                    tracing::debug!(
                        path = %held.display(),
                        system = %system.id,
                        "Conflict resolved by user"
                    );
                    work.push(WorkItem {
                        source: held,
                        candidate: ImportCandidate::new(moved, system.header_size),
                        system: Some(system),
                        related,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %held.display(), "Moving held file failed: {}", e);
                    report.record(held, e.into());
                }
            }
        }

        self.phase_resolve(work, &snapshot, &mut report).await;
        self.complete_batch(&report);
        report
    }
}
