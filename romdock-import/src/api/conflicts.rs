//! Conflict API handlers
//!
//! GET /conflicts, POST /conflicts/resolve

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ApiError, ApiResult};
use crate::models::BatchReport;
use crate::services::HeldConflict;
use crate::AppState;

/// One user decision
#[derive(Debug, Deserialize)]
pub struct ConflictResolution {
    /// Held file, absolute or by file name
    pub path: PathBuf,
    pub system_id: String,
}

/// POST /conflicts/resolve request
#[derive(Debug, Deserialize)]
pub struct ResolveConflictsRequest {
    pub resolutions: Vec<ConflictResolution>,
}

/// GET /conflicts
pub async fn list_conflicts(State(state): State<AppState>) -> ApiResult<Json<Vec<HeldConflict>>> {
    let held = state.orchestrator.list_conflicts().await?;
    Ok(Json(held))
}

/// POST /conflicts/resolve
///
/// Runs to completion and returns the batch report. Unknown files or
/// systems show up as failed entries in the report.
pub async fn resolve_conflicts(
    State(state): State<AppState>,
    Json(request): Json<ResolveConflictsRequest>,
) -> ApiResult<Json<BatchReport>> {
    if request.resolutions.is_empty() {
        return Err(ApiError::BadRequest("resolutions must not be empty".to_string()));
    }

    let mut mapping = HashMap::with_capacity(request.resolutions.len());
    for resolution in request.resolutions {
        if mapping
            .insert(resolution.path.clone(), resolution.system_id)
            .is_some()
        {
            return Err(ApiError::BadRequest(format!(
                "Duplicate resolution for {}",
                resolution.path.display()
            )));
        }
    }

    let report = state.orchestrator.resolve_conflicts(mapping).await;
    state
        .batch_reports
        .write()
        .await
        .insert(report.batch_id, report.clone());
    Ok(Json(report))
}

/// Build conflict routes
pub fn conflict_routes() -> Router<AppState> {
    Router::new()
        .route("/conflicts", get(list_conflicts))
        .route("/conflicts/resolve", post(resolve_conflicts))
}
