//! Catalog entries

use super::metadata::MetadataRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One identified game in the catalog, keyed by content hash
///
/// `relative_path` and `related_files` are relative to the ROMs root, in the
/// form `<system-id>/<file name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub content_hash: String,
    pub system_id: String,
    pub relative_path: String,
    pub related_files: Vec<String>,
    pub requires_metadata_sync: bool,
    pub title: String,
    /// Remote artwork location taken from metadata
    pub artwork_url: Option<String>,
    /// Media cache key of the downloaded artwork
    pub artwork_ref: Option<String>,
    /// Media cache key of artwork the user dropped next to the ROM
    pub custom_artwork_ref: Option<String>,
    pub box_back_url: Option<String>,
    pub region: Option<String>,
    pub region_id: Option<i64>,
    pub description: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub genres: Option<String>,
    pub release_date: Option<String>,
    pub reference_url: Option<String>,
    pub external_release_id: Option<i64>,
    pub serial_number: Option<String>,
    pub imported_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Fresh entry, flagged for a metadata lookup
    ///
    /// The title starts out as the file name without extension.
    pub fn new(
        content_hash: impl Into<String>,
        system_id: impl Into<String>,
        relative_path: impl Into<String>,
    ) -> Self {
        let relative_path = relative_path.into();
        let title = file_stem(&relative_path).to_string();
        Self {
            content_hash: content_hash.into(),
            system_id: system_id.into(),
            relative_path,
            related_files: Vec::new(),
            requires_metadata_sync: true,
            title,
            artwork_url: None,
            artwork_ref: None,
            custom_artwork_ref: None,
            box_back_url: None,
            region: None,
            region_id: None,
            description: None,
            developer: None,
            publisher: None,
            genres: None,
            release_date: None,
            reference_url: None,
            external_release_id: None,
            serial_number: None,
            imported_at: Utc::now(),
        }
    }

    /// File name component of `relative_path`
    pub fn file_name(&self) -> &str {
        file_name(&self.relative_path)
    }

    /// File name without extension
    pub fn base_name(&self) -> &str {
        file_stem(&self.relative_path)
    }

    /// Record a sibling file, keeping insertion order and skipping duplicates
    pub fn add_related_file(&mut self, relative_path: impl Into<String>) -> bool {
        let relative_path = relative_path.into();
        if relative_path == self.relative_path || self.related_files.contains(&relative_path) {
            return false;
        }
        self.related_files.push(relative_path);
        true
    }

    /// Copy descriptive fields from a reference record
    ///
    /// With `overwrite`, every non-empty source field replaces the entry's
    /// value; without it only fields the entry has no value for are filled.
    pub fn merge_metadata(&mut self, record: &MetadataRecord, overwrite: bool) {
        if let Some(title) = non_empty(&record.title) {
            if overwrite || self.title.is_empty() {
                self.title = title.replace(" (Disc 1)", "");
            }
        }

        merge_field(&mut self.artwork_url, &record.artwork_url, overwrite);
        merge_field(&mut self.box_back_url, &record.box_back_url, overwrite);
        merge_field(&mut self.region, &record.region, overwrite);
        merge_field(&mut self.description, &record.description, overwrite);
        merge_field(&mut self.developer, &record.developer, overwrite);
        merge_field(&mut self.publisher, &record.publisher, overwrite);
        merge_field(&mut self.genres, &record.genres, overwrite);
        merge_field(&mut self.release_date, &record.release_date, overwrite);
        merge_field(&mut self.reference_url, &record.reference_url, overwrite);
        merge_field(&mut self.serial_number, &record.serial_number, overwrite);

        if record.region_id.is_some() && (overwrite || self.region_id.is_none()) {
            self.region_id = record.region_id;
        }
        if record.external_release_id.is_some() && (overwrite || self.external_release_id.is_none())
        {
            self.external_release_id = record.external_release_id;
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn merge_field(target: &mut Option<String>, source: &Option<String>, overwrite: bool) {
    let Some(value) = non_empty(source) else {
        return;
    };
    let target_empty = target.as_deref().map(str::is_empty).unwrap_or(true);
    if overwrite || target_empty {
        *target = Some(value.to_string());
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}
