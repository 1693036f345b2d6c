//! System registry endpoint

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::models::system::load_systems;
use crate::AppState;

/// One system as reported over HTTP
#[derive(Debug, Serialize)]
pub struct SystemSummary {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub extensions: Vec<String>,
    pub uses_disc_images: bool,
}

/// GET /systems
///
/// Systems of the current registry snapshot, sorted by id.
pub async fn list_systems(State(state): State<AppState>) -> Json<Vec<SystemSummary>> {
    let snapshot = state.orchestrator.registry().snapshot();
    let systems = snapshot
        .systems()
        .into_iter()
        .map(|s| SystemSummary {
            id: s.id.clone(),
            name: s.name.clone(),
            short_name: s.short_name.clone(),
            extensions: s.extensions.iter().cloned().collect(),
            uses_disc_images: s.uses_disc_images,
        })
        .collect();
    Json(systems)
}

/// POST /systems/reload response
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub system_count: usize,
}

/// POST /systems/reload
///
/// Re-reads the system list (root folder override, else bundled) and swaps
/// in a new snapshot. Batches already running keep the snapshot they started
/// with.
pub async fn reload_systems(State(state): State<AppState>) -> ApiResult<Json<ReloadResponse>> {
    let systems_file = state.orchestrator.context().config.layout.systems_file.clone();
    let systems = tokio::task::spawn_blocking(move || load_systems(&systems_file))
        .await
        .map_err(|e| ApiError::Import(e.into()))?
        .map_err(|e| ApiError::BadRequest(format!("Invalid system list: {}", e)))?;

    let system_count = state.orchestrator.reload_systems(systems);
    tracing::info!(system_count, "System registry reloaded");
    Ok(Json(ReloadResponse { system_count }))
}

pub fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/systems", get(list_systems))
        .route("/systems/reload", post(reload_systems))
}
