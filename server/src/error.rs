use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use docinspect::pipeline::PipelineError;
use docinspect::{InspectError, IntakeError, PersistenceError};

/// Handler error with a JSON body `{"error": message, "code": CODE}`.
///
/// Server-side failures are logged here and reported without details.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Inspect(#[from] InspectError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Inspect(err) => classify_inspect_error(err),
            AppError::Intake(err) => classify_intake_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => internal(msg),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal(detail: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %detail, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_inspect_error(err: &InspectError) -> (StatusCode, &'static str, String) {
    match err {
        InspectError::Persistence(PersistenceError::NotFound { entity, id })
        | InspectError::Pipeline(PipelineError::Persistence(PersistenceError::NotFound { entity, id })) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        InspectError::AnalysisNotReady(_) => (
            StatusCode::CONFLICT,
            "CONFLICT",
            "Document analysis not ready".to_string(),
        ),
        InspectError::Analysis(e) => {
            tracing::error!(error = %e, "Language model request failed");
            (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                "Language model request failed".to_string(),
            )
        }
        InspectError::Worker(e) => {
            tracing::error!(error = %e, "Worker pool unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                "Processing is unavailable, try again later".to_string(),
            )
        }
        InspectError::InvalidId(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
        InspectError::Intake(e) => classify_intake_error(e),
        other => internal(other),
    }
}

fn classify_intake_error(err: &IntakeError) -> (StatusCode, &'static str, String) {
    match err {
        IntakeError::NoFiles
        | IntakeError::NoPdfs
        | IntakeError::CorruptArchive { .. }
        | IntakeError::ArchiveTooLarge { .. } => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
        }
        IntakeError::Io { .. } | IntakeError::Persistence(_) => internal(err),
    }
}
