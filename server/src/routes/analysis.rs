use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use docinspect::query::{self, AnalysisStatusDto};
use docinspect::reanalysis;

use super::blocking;
use crate::error::AppResult;
use crate::state::AppState;

/// A document id as a number, or a string holding an id or a path ending
/// in one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DocumentRef {
    Id(i64),
    Raw(String),
}

impl DocumentRef {
    fn into_raw(self) -> String {
        match self {
            DocumentRef::Id(id) => id.to_string(),
            DocumentRef::Raw(raw) => raw,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub document_id: DocumentRef,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisAccepted {
    pub message: &'static str,
    pub document_id: String,
    pub status: &'static str,
}

/// GET /api/v1/document-analysis/status/{*document_id}
///
/// Accepts a bare id or any path ending in one.
async fn analysis_status(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> AppResult<Json<AnalysisStatusDto>> {
    let db = state.db.clone();
    let dto = blocking(move || query::analysis_status(&db, &document_id)).await?;
    Ok(Json(dto))
}

/// POST /api/v1/document-analysis/analyze
///
/// Re-runs extraction and analysis from the stored page images and answers
/// once the result is stored.
async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> AppResult<Json<AnalysisStatusDto>> {
    let raw = request.document_id.into_raw();
    let db = state.db.clone();
    let pipeline = state.pipeline.clone();
    let dto = blocking(move || reanalysis::run(&pipeline, &db, &raw)).await?;
    Ok(Json(dto))
}

/// POST /api/v1/document-analysis/analyze-async
async fn analyze_async(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> AppResult<(StatusCode, Json<AnalysisAccepted>)> {
    let raw = request.document_id.into_raw();
    let db = state.db.clone();
    let jobs = state.jobs.clone();
    let document_id = blocking(move || reanalysis::schedule(&db, jobs.as_ref(), &raw)).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalysisAccepted {
            message: "Analysis started",
            document_id: document_id.to_string(),
            status: "PROCESSING",
        }),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/document-analysis/status/{*document_id}",
            get(analysis_status),
        )
        .route("/document-analysis/analyze", post(analyze))
        .route("/document-analysis/analyze-async", post(analyze_async))
}
