//! Decides which system a candidate belongs to
//!
//! Extension first. When several systems claim the extension the content
//! hash is looked up in the reference database, then in the catalog, and
//! finally the catalog is searched for an entry with the same stripped name.
//! Anything still ambiguous is a conflict for a person to settle.

use crate::db::{CatalogStore, PathPredicate, ReferenceDatabase};
use crate::error::{ImportError, ImportResult};
use crate::models::{SystemDescriptor, SystemSnapshot};
use crate::naming;
use crate::services::candidate::ImportCandidate;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// How a system was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVia {
    /// Only one system claims the extension
    Extension,
    /// The reference database knows the hash for exactly one system
    ReferenceHash,
    /// The catalog already holds this content
    CatalogHash,
    /// Exactly one catalog entry has the same stripped name
    CatalogName,
}

/// Outcome of system resolution
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved {
        system: Arc<SystemDescriptor>,
        via: ResolvedVia,
    },
    /// Several systems remain possible
    Conflict { candidate_systems: Vec<String> },
    /// No system claims the extension
    NotImportable { deleted: bool },
}

/// Maps candidates to systems
pub struct SystemResolver {
    catalog: Arc<dyn CatalogStore>,
    reference: Arc<dyn ReferenceDatabase>,
    import_dir: PathBuf,
}

impl SystemResolver {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        reference: Arc<dyn ReferenceDatabase>,
        import_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            reference,
            import_dir: import_dir.into(),
        }
    }

    pub async fn resolve(
        &self,
        candidate: &ImportCandidate,
        snapshot: &SystemSnapshot,
    ) -> ImportResult<Resolution> {
        let path = candidate.path();
        let systems = snapshot.systems_for_extension(&candidate.extension());

        match systems {
            [] => {
                let deleted = self.delete_if_junk(candidate).await?;
                return Ok(Resolution::NotImportable { deleted });
            }
            [only] => {
                return Ok(Resolution::Resolved {
                    system: Arc::clone(only),
                    via: ResolvedVia::Extension,
                });
            }
            _ => {}
        }

        let ids: Vec<String> = systems.iter().map(|s| s.id.clone()).collect();
        let hash = candidate.content_hash().await?.to_string();
        tracing::debug!(path = %path.display(), candidates = ?ids, "Extension is ambiguous, checking hash");

        match self.reference.query_by_hash(&hash).await {
            Ok(records) => {
                let matched: BTreeSet<&str> = records
                    .iter()
                    .filter_map(|r| r.system_database_id)
                    .filter_map(|db_id| snapshot.system_for_database_id(db_id))
                    .map(|s| s.id.as_str())
                    .filter(|id| ids.iter().any(|c| c == id))
                    .collect();
                if matched.len() == 1 {
                    if let Some(system) = matched.iter().next().and_then(|id| snapshot.system(id)) {
                        return Ok(Resolution::Resolved {
                            system: Arc::clone(system),
                            via: ResolvedVia::ReferenceHash,
                        });
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Reference lookup by hash failed: {}", e);
            }
        }

        if let Some(existing) = self.catalog.find_by_hash(&hash).await? {
            if let Some(system) = snapshot.system(&existing.system_id) {
                if ids.contains(&existing.system_id) {
                    return Ok(Resolution::Resolved {
                        system: Arc::clone(system),
                        via: ResolvedVia::CatalogHash,
                    });
                }
            }
        }

        let stripped = candidate.stripped_stem();
        let hits = self
            .catalog
            .find(&ids, &PathPredicate::StrippedPrefix(stripped))
            .await?;
        if let [hit] = hits.as_slice() {
            if let Some(system) = snapshot.system(&hit.system_id) {
                tracing::debug!(
                    path = %path.display(),
                    matched = %hit.relative_path,
                    "Resolved by existing catalog entry"
                );
                return Ok(Resolution::Resolved {
                    system: Arc::clone(system),
                    via: ResolvedVia::CatalogName,
                });
            }
        }

        Ok(Resolution::Conflict {
            candidate_systems: ids,
        })
    }

    /// Delete a file nobody can use, but only from the import directory
    ///
    /// Kept: anything outside the import directory, folders, archives,
    /// images and disc-image parts.
    async fn delete_if_junk(&self, candidate: &ImportCandidate) -> ImportResult<bool> {
        let path = candidate.path();
        if !path.starts_with(&self.import_dir)
            || path.is_dir()
            || naming::is_archive(path)
            || naming::is_artwork(path)
            || naming::is_cd_file(path)
        {
            tracing::debug!(path = %path.display(), "Not importable, leaving in place");
            return Ok(false);
        }

        tokio::fs::remove_file(path)
            .await
            .map_err(|e| ImportError::fs(path, e))?;
        tracing::info!(path = %path.display(), "Deleted junk file");
        Ok(true)
    }
}
