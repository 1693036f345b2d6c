//! Error types for romdock-import
//!
//! `ImportError` is the per-file failure taxonomy of the pipeline; nothing
//! that produces one is fatal to a batch. `ApiError` is what HTTP handlers
//! return.

use crate::models::FileOutcome;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while importing a single file
#[derive(Debug, Error)]
pub enum ImportError {
    /// Create, move or delete failed; the file stays where it was
    #[error("Filesystem error on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive could not be extracted; the archive is retained
    #[error("Archive extraction failed for {path}: {reason}")]
    ArchiveExtraction { path: PathBuf, reason: String },

    /// Reference database query failed; the entry stays flagged for sync
    #[error("Metadata lookup failed: {0}")]
    MetadataLookup(String),

    /// Artwork could not be fetched or decoded; the entry keeps no artwork
    #[error("Artwork download failed for {url}: {reason}")]
    ArtworkDownload { url: String, reason: String },

    /// Catalog store failure
    #[error("Catalog error: {0}")]
    Catalog(#[from] romdock_common::Error),

    /// A background task panicked or was aborted
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ImportError {
    /// Wrap an io::Error with the path it concerns
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImportError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

impl From<sqlx::Error> for ImportError {
    fn from(err: sqlx::Error) -> Self {
        ImportError::Catalog(romdock_common::Error::Database(err))
    }
}

/// Result type for pipeline steps
pub type ImportResult<T> = Result<T, ImportError>;

impl From<ImportError> for FileOutcome {
    fn from(err: ImportError) -> Self {
        FileOutcome::Failed {
            error: err.to_string(),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Pipeline error
    #[error(transparent)]
    Import(#[from] ImportError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Import(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IMPORT_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
