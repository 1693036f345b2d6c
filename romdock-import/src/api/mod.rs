//! HTTP API handlers for romdock-import
//!
//! REST endpoints to trigger scans and settle conflicts, plus an SSE stream
//! of pipeline events.

pub mod conflicts;
pub mod health;
pub mod import;
pub mod sse;
pub mod systems;

pub use conflicts::conflict_routes;
pub use health::health_routes;
pub use import::import_routes;
pub use sse::event_stream;
pub use systems::system_routes;
