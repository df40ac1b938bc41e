use std::path::PathBuf;
use thiserror::Error;

use crate::detect::Category;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error(transparent)]
    InvalidId(#[from] InvalidIdError),

    #[error("Storage error: {0}")]
    Upload(#[from] UploadError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Document analysis not ready for document {0}")]
    AnalysisNotReady(i64),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to resolve secret: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

/// Rejected uploads. Always the caller's fault, surfaced as a client error.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("No files were uploaded")]
    NoFiles,

    #[error("No PDF files found in the upload")]
    NoPdfs,

    #[error("Archive '{name}' could not be read: {message}")]
    CorruptArchive { name: String, message: String },

    #[error("Archive '{name}' expands to more than {limit} bytes")]
    ArchiveTooLarge { name: String, limit: u64 },

    #[error("Failed to store upload '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("Failed to read PDF '{path}': {source}")]
    ReadPdf {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Failed to render page {page}: {message}")]
    Render { page: u32, message: String },

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read rendered page '{path}': {message}")]
    Image { path: PathBuf, message: String },
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("{category} detector request failed: {message}")]
    Request { category: Category, message: String },

    #[error("{category} detector returned {got} page results for {expected} pages")]
    PageCountMismatch {
        category: Category,
        expected: usize,
        got: usize,
    },

    #[error("Failed to read page image '{path}': {source}")]
    ReadPage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Failed to load page image '{path}': {message}")]
    LoadImage { path: PathBuf, message: String },

    #[error("Failed to write '{path}': {message}")]
    Write { path: PathBuf, message: String },

    #[error("Failed to build labeled PDF: {0}")]
    Pdf(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to read '{path}' for upload: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload of '{key}' failed: {message}")]
    Request { key: String, message: String },

    #[error("Download of '{key}' failed: {message}")]
    Download { key: String, message: String },

    #[error("Object store client could not be created: {0}")]
    Client(String),
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("No text could be extracted from the document")]
    NoText,

    #[error("Text extraction timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("OCR request failed: {0}")]
    Request(String),

    #[error("OCR engine error: {0}")]
    Engine(String),

    #[error("Failed to read page image '{path}': {source}")]
    ReadPage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Document analysis timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{query} query failed: {message}")]
    Request {
        query: &'static str,
        message: String,
    },

    #[error("{query} query returned an unexpected response: {message}")]
    MalformedResponse {
        query: &'static str,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),

    #[error("{entity} {id} is already in a terminal state")]
    AlreadyFinal { entity: &'static str, id: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Failed to serialize labels payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid document id: {0:?}")]
pub struct InvalidIdError(pub String);

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker queue is full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, InspectError>;
