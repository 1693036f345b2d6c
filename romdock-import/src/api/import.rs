//! Import scan API handlers
//!
//! POST /import/scan, GET /import/batches/{batch_id}

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::BatchReport;
use crate::AppState;

/// POST /import/scan request
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    /// Files or folders to import; the whole import directory when absent
    #[serde(default)]
    pub paths: Option<Vec<PathBuf>>,
}

/// POST /import/scan response
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub batch_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// POST /import/scan
///
/// Starts a batch in the background and returns its id. The batch report is
/// available from GET /import/batches/{batch_id} once it completes.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<Json<ScanResponse>> {
    let paths = match request.paths {
        Some(paths) => {
            if paths.is_empty() {
                return Err(ApiError::BadRequest("paths must not be empty".to_string()));
            }
            if let Some(missing) = paths.iter().find(|p| !p.exists()) {
                return Err(ApiError::BadRequest(format!(
                    "Path does not exist: {}",
                    missing.display()
                )));
            }
            Some(paths)
        }
        None => None,
    };

    let batch_id = Uuid::new_v4();
    let response = ScanResponse {
        batch_id,
        started_at: chrono::Utc::now(),
    };

    let state_clone = state.clone();
    tokio::spawn(async move {
        tracing::info!(batch_id = %batch_id, "Background import batch started");
        let orchestrator = &state_clone.orchestrator;

        let paths = match paths {
            Some(paths) => paths,
            None => match orchestrator.list_import_dir().await {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::error!(batch_id = %batch_id, error = %e, "Listing import directory failed");
                    *state_clone.last_error.write().await = Some(e.to_string());
                    return;
                }
            },
        };

        let report = orchestrator.import_batch_with_id(batch_id, paths).await;
        state_clone.batch_reports.write().await.insert(batch_id, report);
    });

    Ok(Json(response))
}

/// GET /import/batches/{batch_id}
pub async fn get_batch_report(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<BatchReport>> {
    state
        .batch_reports
        .read()
        .await
        .get(&batch_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Batch not found or still running: {}", batch_id)))
}

/// Build import routes
pub fn import_routes() -> Router<AppState> {
    Router::new()
        .route("/import/scan", post(start_scan))
        .route("/import/batches/:batch_id", get(get_batch_report))
}
