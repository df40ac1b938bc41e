use std::path::PathBuf;

use thiserror::Error;

use crate::error::{
    AnalysisError, AnnotateError, DetectionError, ExtractionError, PersistenceError, RasterError,
    UploadError,
};

/// A failure in any step outside the analysis sub-pipeline. Each one ends
/// the run with the document marked FAILED.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Rasterization failed: {0}")]
    Raster(#[from] RasterError),

    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("Annotation failed: {0}")]
    Annotate(#[from] AnnotateError),

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Step '{0}' ran before its inputs were produced")]
    MissingInput(&'static str),
}

impl From<crate::db::DatabaseError> for PipelineError {
    fn from(e: crate::db::DatabaseError) -> Self {
        PipelineError::Persistence(PersistenceError::Database(e))
    }
}

/// Why the analysis sub-pipeline failed. Its message is what ends up in the
/// analysis record's error log.
#[derive(Error, Debug)]
pub enum AnalysisFailure {
    #[error("Failed to extract text from PDF: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Failed to analyze text with LLM: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("No page images are stored for this document")]
    NoPages,

    #[error("Failed to fetch page images: {0}")]
    Fetch(#[from] UploadError),

    #[error("Failed to stage page image '{path}': {message}")]
    Stage { path: PathBuf, message: String },
}
