//! Import pipeline components
//!
//! Leaves first: candidates and archives, then the watcher, BIOS routing,
//! system resolution, disc grouping, catalog matching, conflicts, metadata
//! and artwork. The orchestrator sequences them per batch.

pub mod archive_extractor;
pub mod artwork_fetcher;
pub mod bios_router;
pub mod candidate;
pub mod catalog_matcher;
pub mod cd_grouper;
pub mod conflict_handler;
pub mod directory_watcher;
pub mod file_ops;
pub mod media_cache;
pub mod metadata_resolver;
pub mod orchestrator;
pub mod system_resolver;

pub use archive_extractor::{ArchiveError, ArchiveExtractor, ExtractionProgress};
pub use artwork_fetcher::{ArtworkError, ArtworkFetcher, ArtworkSettings};
pub use bios_router::BiosRouter;
pub use candidate::ImportCandidate;
pub use catalog_matcher::{CatalogMatcher, MatchOutcome};
pub use conflict_handler::{ConflictHandler, HeldConflict};
pub use directory_watcher::{DirectoryWatcher, WatcherError, WatcherState};
pub use media_cache::{FileMediaCache, MediaCache};
pub use metadata_resolver::{MetadataResolver, MetadataSync};
pub use orchestrator::{ImportContext, ImportOrchestrator};
pub use system_resolver::{Resolution, ResolvedVia, SystemResolver};
