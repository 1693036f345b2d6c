//! Event types for the romdock event system
//!
//! Provides the shared event vocabulary and the EventBus used by the import
//! pipeline and the HTTP event stream.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted while importing files
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RomdockEvent {
    /// Catalog work (metadata lookup) started for a file
    ImportStarted {
        path: PathBuf,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A file finished importing
    ImportFinished {
        /// Content hash of the catalog entry the file landed in
        content_hash: String,
        /// True when metadata was (re)queried for the entry
        was_modified: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An artwork download attempt finished
    ArtworkFinished {
        url: String,
        /// Whether the artwork ended up in the media cache
        cached: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// All files of a batch were processed
    BatchCompleted {
        batch_id: Uuid,
        encountered_conflicts: bool,
        imported: usize,
        updated: usize,
        failed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Archive extraction started
    ArchiveInflationStarted {
        path: PathBuf,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One archive member was written
    ArchiveInflationProgress {
        path: PathBuf,
        completed: usize,
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Archive extraction failed; the archive was left in place
    ArchiveInflationFailed {
        path: PathBuf,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A dropped file was installed as a system's BIOS
    BiosInstalled {
        system_id: String,
        path: PathBuf,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A file was moved into the conflicts directory
    ConflictHeld {
        path: PathBuf,
        candidate_systems: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new system registry snapshot was installed
    SystemsReloaded {
        system_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl RomdockEvent {
    /// Event name, as used for the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            RomdockEvent::ImportStarted { .. } => "ImportStarted",
            RomdockEvent::ImportFinished { .. } => "ImportFinished",
            RomdockEvent::ArtworkFinished { .. } => "ArtworkFinished",
            RomdockEvent::BatchCompleted { .. } => "BatchCompleted",
            RomdockEvent::ArchiveInflationStarted { .. } => "ArchiveInflationStarted",
            RomdockEvent::ArchiveInflationProgress { .. } => "ArchiveInflationProgress",
            RomdockEvent::ArchiveInflationFailed { .. } => "ArchiveInflationFailed",
            RomdockEvent::BiosInstalled { .. } => "BiosInstalled",
            RomdockEvent::ConflictHeld { .. } => "ConflictHeld",
            RomdockEvent::SystemsReloaded { .. } => "SystemsReloaded",
        }
    }
}

/// Broadcast bus for RomdockEvents
///
/// Cheap to clone; every clone feeds the same channel.
///
/// ```
/// use romdock_common::events::{EventBus, RomdockEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(RomdockEvent::SystemsReloaded {
///     system_count: 12,
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RomdockEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RomdockEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: RomdockEvent,
    ) -> Result<usize, broadcast::error::SendError<RomdockEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RomdockEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
