//! Reference database rows

use serde::{Deserialize, Serialize};

/// Region identifier the reference database assigns to "USA"
pub const USA_REGION_ID: i64 = 21;

/// One release row returned by the reference database
///
/// Carries the same descriptive fields as a catalog entry plus the numeric
/// region identifier used when several releases match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub title: Option<String>,
    pub artwork_url: Option<String>,
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
    /// System id in the reference database's own numbering
    pub system_database_id: Option<i64>,
}

impl MetadataRecord {
    pub fn is_usa_region_id(&self) -> bool {
        self.region_id == Some(USA_REGION_ID)
    }

    pub fn region_mentions_usa(&self) -> bool {
        self.region
            .as_deref()
            .map(|r| r.to_uppercase().contains("USA"))
            .unwrap_or(false)
    }
}
