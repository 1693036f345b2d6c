//! Batch reports

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FileOutcome {
    /// A new catalog entry was created
    Imported { content_hash: String },
    /// An existing catalog entry matched
    Updated { content_hash: String },
    /// Moved to the conflicts directory
    Conflicted { candidate_systems: Vec<String> },
    /// Attached to an existing entry as a playlist or artwork
    Attached { content_hash: String },
    /// Installed as a system's BIOS file
    Bios { system_id: String },
    /// Not importable; left in place or deleted as junk
    Skipped { reason: String },
    /// Failed; the file stays where it was
    Failed { error: String },
}

/// Summary of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub encountered_conflicts: bool,
    pub files: Vec<(PathBuf, FileOutcome)>,
}

impl BatchReport {
    pub fn new(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            encountered_conflicts: false,
            files: Vec::new(),
        }
    }

    pub fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        if matches!(outcome, FileOutcome::Conflicted { .. }) {
            self.encountered_conflicts = true;
        }
        self.files.push((path, outcome));
    }

    pub fn imported(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Imported { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Updated { .. }))
    }

    pub fn conflicted(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Conflicted { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    pub fn outcome_for(&self, path: &std::path::Path) -> Option<&FileOutcome> {
        self.files.iter().find(|(p, _)| p == path).map(|(_, o)| o)
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|(_, o)| pred(o)).count()
    }
}
