//! Data models for romdock-import
//!
//! - System descriptors, their BIOS files and the snapshot registry built
//!   from them
//! - Catalog entries recorded by the pipeline
//! - Metadata records returned by the reference database
//! - Per-batch reports

pub mod batch;
pub mod catalog;
pub mod metadata;
pub mod system;

pub use batch::{BatchReport, FileOutcome};
pub use catalog::CatalogEntry;
pub use metadata::MetadataRecord;
pub use system::{BiosEntry, BiosMatch, SystemDescriptor, SystemRegistry, SystemSnapshot};
