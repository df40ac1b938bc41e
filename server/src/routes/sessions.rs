use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};

use docinspect::intake::Upload;
use docinspect::query::{self, DocumentDetailsDto, DocumentDto, SessionDto};
use docinspect::{DocumentStatus, SessionStatus};

use super::{blocking, parse_id, parse_status};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Multipart field names that carry uploads.
const UPLOAD_FIELDS: [&str; 2] = ["files", "file"];

#[derive(Debug, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

/// POST /api/v1/sessions
///
/// Accepts PDFs and ZIP archives of PDFs. Returns as soon as the documents
/// are recorded and queued; processing continues in the worker pool.
async fn create_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<SessionDto>)> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if !field.name().is_some_and(|n| UPLOAD_FIELDS.contains(&n)) {
            continue;
        }
        let name = field.file_name().unwrap_or("upload.pdf").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        uploads.push(Upload::new(name, bytes.to_vec()));
    }

    tracing::info!(files = uploads.len(), "Received upload");

    let intake = state.intake.clone();
    let jobs = state.jobs.clone();
    let session = tokio::task::spawn_blocking(move || intake.create_session(uploads, jobs.as_ref()))
        .await
        .map_err(|e| AppError::InternalError(format!("Blocking task failed: {e}")))??;

    Ok((StatusCode::CREATED, Json(SessionDto::from(session))))
}

/// GET /api/v1/sessions?status=
async fn list_sessions(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> AppResult<Json<Vec<SessionDto>>> {
    let status: Option<SessionStatus> = parse_status(filter.status.as_deref())?;
    let db = state.db.clone();
    Ok(Json(blocking(move || query::list_sessions(&db, status)).await?))
}

/// GET /api/v1/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SessionDto>> {
    let session_id = parse_id(&id, "session")?;
    let db = state.db.clone();
    Ok(Json(blocking(move || query::get_session(&db, session_id)).await?))
}

/// GET /api/v1/sessions/{id}/documents?status=
async fn list_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(filter): Query<StatusFilter>,
) -> AppResult<Json<Vec<DocumentDto>>> {
    let session_id = parse_id(&id, "session")?;
    let status: Option<DocumentStatus> = parse_status(filter.status.as_deref())?;
    let db = state.db.clone();
    Ok(Json(
        blocking(move || query::list_documents(&db, session_id, status)).await?,
    ))
}

/// GET /api/v1/sessions/{id}/documents/labels-map
async fn labels_map(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Map<String, Value>>> {
    let session_id = parse_id(&id, "session")?;
    let db = state.db.clone();
    Ok(Json(blocking(move || query::labels_map(&db, session_id)).await?))
}

/// GET /api/v1/sessions/{id}/documents/{doc_id}
async fn get_document(
    State(state): State<AppState>,
    Path((id, doc_id)): Path<(String, String)>,
) -> AppResult<Json<DocumentDetailsDto>> {
    let session_id = parse_id(&id, "session")?;
    let document_id = parse_id(&doc_id, "document")?;
    let db = state.db.clone();
    Ok(Json(
        blocking(move || query::get_document(&db, session_id, document_id)).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/documents", get(list_documents))
        .route("/sessions/{id}/documents/labels-map", get(labels_map))
        .route("/sessions/{id}/documents/{doc_id}", get(get_document))
}
