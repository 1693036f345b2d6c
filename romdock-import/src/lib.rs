//! romdock-import library interface
//!
//! The import pipeline (watch, extract, identify, catalog, enrich) plus the
//! HTTP surface that drives it. Exposed as a library for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod naming;
pub mod services;

pub use crate::error::{ApiError, ApiResult, ImportError, ImportResult};

use axum::Router;
use chrono::{DateTime, Utc};
use models::BatchReport;
use romdock_common::events::EventBus;
use services::ImportOrchestrator;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ImportOrchestrator>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Reports of batches finished since startup
    pub batch_reports: Arc<RwLock<HashMap<Uuid, BatchReport>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background error, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<ImportOrchestrator>) -> Self {
        let event_bus = orchestrator.event_bus().clone();
        Self {
            orchestrator,
            event_bus,
            batch_reports: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::system_routes())
        .merge(api::import_routes())
        .merge(api::conflict_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
}
