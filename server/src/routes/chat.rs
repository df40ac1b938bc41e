use axum::extract::{Path, State};
use axum::http::header::ACCEPT_LANGUAGE;
use axum::http::HeaderMap;
use axum::{routing::post, Json, Router};
use serde::Deserialize;

use docinspect::analysis::ChatReply;
use docinspect::chat;

use super::blocking;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// POST /api/v1/chat/{document_id}
///
/// Answers a question about a document whose analysis is COMPLETED. The
/// reply language follows `Accept-Language`.
async fn chat_with_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatReply>> {
    if request.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".to_string()));
    }
    let language = chat::pick_language(
        headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok()),
    );

    let db = state.db.clone();
    let context = blocking(move || chat::load_context(&db, &document_id)).await?;
    let reply = chat::answer(
        state.pipeline.analyzer(),
        &context,
        language.as_deref(),
        &request.message,
    )
    .await?;
    Ok(Json(reply))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/chat/{document_id}", post(chat_with_document))
}
