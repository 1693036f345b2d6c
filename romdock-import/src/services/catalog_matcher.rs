//! Insert-or-update against the catalog
//!
//! A resolved file either belongs to an entry that is already there (same
//! stored path, listed as a related file, or a name match within the system)
//! or becomes a new entry. The check and the insert happen in the same
//! call so two tasks never both insert one hash.

use crate::db::{CatalogStore, PathPredicate};
use crate::error::ImportResult;
use crate::models::{CatalogEntry, SystemDescriptor};
use crate::naming;
use std::path::Path;
use std::sync::Arc;

/// What `record` did
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// A new entry was written
    Inserted(CatalogEntry),
    /// An existing entry took the file
    Updated {
        entry: CatalogEntry,
        /// The file at the stored path now has different content
        content_changed: bool,
    },
}

impl MatchOutcome {
    pub fn entry(&self) -> &CatalogEntry {
        match self {
            MatchOutcome::Inserted(entry) => entry,
            MatchOutcome::Updated { entry, .. } => entry,
        }
    }

    pub fn into_entry(self) -> CatalogEntry {
        match self {
            MatchOutcome::Inserted(entry) => entry,
            MatchOutcome::Updated { entry, .. } => entry,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, MatchOutcome::Inserted(_))
    }
}

pub struct CatalogMatcher {
    catalog: Arc<dyn CatalogStore>,
}

impl CatalogMatcher {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Record a file stored at `relative_path` with content `content_hash`
    ///
    /// `related` lists catalog-relative paths of sibling files that moved
    /// with it; they are added to whichever entry ends up owning the file.
    pub async fn record(
        &self,
        system: &SystemDescriptor,
        relative_path: &str,
        content_hash: &str,
        related: &[String],
    ) -> ImportResult<MatchOutcome> {
        let scope = [system.id.clone()];

        // Same stored path
        let by_path = self
            .catalog
            .find(&scope, &PathPredicate::RelativePath(relative_path.to_string()))
            .await?;
        if let Some(hit) = by_path.into_iter().next() {
            if hit.content_hash == content_hash {
                let entry = self.merge_related(&hit.content_hash, related, None).await?;
                return Ok(MatchOutcome::Updated {
                    entry,
                    content_changed: false,
                });
            }

            // Content changed in place. Another entry may already own the new hash.
            if let Some(owner) = self.catalog.find_by_hash(content_hash).await? {
                tracing::info!(
                    path = relative_path,
                    owner = %owner.relative_path,
                    "Changed file now duplicates another entry"
                );
                let entry = self.merge_related(&owner.content_hash, related, None).await?;
                return Ok(MatchOutcome::Updated {
                    entry,
                    content_changed: false,
                });
            }

            tracing::info!(path = relative_path, "File content changed, entry flagged for sync");
            let new_hash = content_hash.to_string();
            let related = related.to_vec();
            let entry = self
                .catalog
                .update(
                    &hit.content_hash,
                    Box::new(move |e| {
                        e.content_hash = new_hash;
                        e.requires_metadata_sync = true;
                        for path in related {
                            e.add_related_file(path);
                        }
                    }),
                )
                .await?;
            return Ok(MatchOutcome::Updated {
                entry,
                content_changed: true,
            });
        }

        // Already listed as a sibling of some entry
        let by_related = self
            .catalog
            .find(&scope, &PathPredicate::RelatedFile(relative_path.to_string()))
            .await?;
        if let Some(hit) = by_related.into_iter().next() {
            let entry = self.merge_related(&hit.content_hash, related, None).await?;
            return Ok(MatchOutcome::Updated {
                entry,
                content_changed: false,
            });
        }

        // Another dump of a game the system already has
        let stripped = naming::stripped_stem(Path::new(relative_path));
        let by_name = self
            .catalog
            .find(&scope, &PathPredicate::FileNameContains(stripped))
            .await?;
        if let Some(hit) = by_name.into_iter().find(|e| e.content_hash != content_hash) {
            tracing::debug!(
                path = relative_path,
                entry = %hit.relative_path,
                "Attached file to existing entry by name"
            );
            let entry = self
                .merge_related(&hit.content_hash, related, Some(relative_path))
                .await?;
            return Ok(MatchOutcome::Updated {
                entry,
                content_changed: false,
            });
        }

        // Same content stored under another name
        if let Some(existing) = self.catalog.find_by_hash(content_hash).await? {
            tracing::debug!(
                path = relative_path,
                existing = %existing.relative_path,
                "Content already in catalog"
            );
            let entry = self.merge_related(&existing.content_hash, related, None).await?;
            return Ok(MatchOutcome::Updated {
                entry,
                content_changed: false,
            });
        }

        let mut entry = CatalogEntry::new(content_hash, &system.id, relative_path);
        for path in related {
            entry.add_related_file(path.clone());
        }
        if self.catalog.insert(&entry).await? {
            tracing::info!(path = relative_path, system = %system.id, "New catalog entry");
            return Ok(MatchOutcome::Inserted(entry));
        }

        // Lost a race with a writer outside this process
        let entry = self.merge_related(content_hash, related, None).await?;
        Ok(MatchOutcome::Updated {
            entry,
            content_changed: false,
        })
    }

    async fn merge_related(
        &self,
        content_hash: &str,
        related: &[String],
        extra: Option<&str>,
    ) -> ImportResult<CatalogEntry> {
        let mut paths = related.to_vec();
        if let Some(extra) = extra {
            paths.push(extra.to_string());
        }
        if paths.is_empty() {
            if let Some(entry) = self.catalog.find_by_hash(content_hash).await? {
                return Ok(entry);
            }
        }
        let entry = self
            .catalog
            .update(
                content_hash,
                Box::new(move |e| {
                    for path in paths {
                        e.add_related_file(path);
                    }
                }),
            )
            .await?;
        Ok(entry)
    }
}
