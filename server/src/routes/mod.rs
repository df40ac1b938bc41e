pub mod analysis;
pub mod chat;
pub mod health;
pub mod sessions;

use axum::Router;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Everything under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(sessions::router())
        .merge(analysis::router())
        .merge(chat::router())
}

/// Runs a synchronous library call off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> docinspect::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::InternalError(format!("Blocking task failed: {e}")))?
        .map_err(AppError::from)
}

pub(crate) fn parse_id(raw: &str, what: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest(format!("Invalid {what} id: {raw:?}")))
}

pub(crate) fn parse_status<S: std::str::FromStr<Err = String>>(raw: Option<&str>) -> AppResult<Option<S>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .to_ascii_uppercase()
            .parse()
            .map(Some)
            .map_err(AppError::BadRequest),
        None => Ok(None),
    }
}
