//! Metadata lookup and merge
//!
//! Hash match first, then a title search within the entry's system. When
//! several releases come back the USA one wins; among equals the lowest
//! release id.

use crate::db::{CatalogStore, ReferenceDatabase};
use crate::error::{ImportError, ImportResult};
use crate::models::{CatalogEntry, MetadataRecord, SystemDescriptor};
use crate::naming;
use std::path::Path;
use std::sync::Arc;

/// Result of one metadata pass over an entry
#[derive(Debug, Clone)]
pub struct MetadataSync {
    pub entry: CatalogEntry,
    /// A reference record was found and merged
    pub matched: bool,
}

pub struct MetadataResolver {
    catalog: Arc<dyn CatalogStore>,
    reference: Arc<dyn ReferenceDatabase>,
}

impl MetadataResolver {
    pub fn new(catalog: Arc<dyn CatalogStore>, reference: Arc<dyn ReferenceDatabase>) -> Self {
        Self { catalog, reference }
    }

    /// Look up metadata for `entry` and merge it under `overwrite`
    ///
    /// The sync flag is cleared when the lookup ran, found or not. A failed
    /// query leaves the entry untouched and flagged.
    pub async fn sync(
        &self,
        entry: &CatalogEntry,
        system: &SystemDescriptor,
        overwrite: bool,
    ) -> ImportResult<MetadataSync> {
        let records = self.lookup(entry, system).await?;
        let chosen = choose(&records).cloned();

        if let Some(record) = &chosen {
            tracing::debug!(
                entry = %entry.relative_path,
                title = record.title.as_deref().unwrap_or(""),
                candidates = records.len(),
                "Merging reference metadata"
            );
        }

        let matched = chosen.is_some();
        let updated = self
            .catalog
            .update(
                &entry.content_hash,
                Box::new(move |e| {
                    if let Some(record) = chosen {
                        e.merge_metadata(&record, overwrite);
                    }
                    e.requires_metadata_sync = false;
                }),
            )
            .await?;

        Ok(MetadataSync {
            entry: updated,
            matched,
        })
    }

    /// Candidate records: by hash, else by name
    async fn lookup(
        &self,
        entry: &CatalogEntry,
        system: &SystemDescriptor,
    ) -> ImportResult<Vec<MetadataRecord>> {
        let mut by_hash = self
            .reference
            .query_by_hash(&entry.content_hash)
            .await
            .map_err(|e| ImportError::MetadataLookup(e.to_string()))?;

        // A hash shared across systems only counts for this one
        by_hash.retain(|r| match (r.system_database_id, system.database_id) {
            (Some(found), Some(expected)) => found == expected,
            _ => true,
        });
        by_hash.sort_by_key(|r| r.external_release_id.unwrap_or(i64::MAX));
        if !by_hash.is_empty() {
            return Ok(by_hash);
        }

        let (Some(system_db_id), Some(name)) = (
            system.database_id,
            naming::metadata_search_name(&naming::stem_of(Path::new(&entry.relative_path))),
        ) else {
            return Ok(Vec::new());
        };

        self.reference
            .query_by_filename(system_db_id, &name)
            .await
            .map_err(|e| ImportError::MetadataLookup(e.to_string()))
    }
}

/// Pick the release to merge
///
/// USA by region id, then USA by region name, then the first record. Callers
/// pass records in a deterministic order.
pub fn choose(records: &[MetadataRecord]) -> Option<&MetadataRecord> {
    records
        .iter()
        .find(|r| r.is_usa_region_id())
        .or_else(|| records.iter().find(|r| r.region_mentions_usa()))
        .or_else(|| records.first())
}
