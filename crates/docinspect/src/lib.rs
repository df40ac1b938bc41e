pub mod analysis;
pub mod annotate;
pub mod chat;
pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod extract;
pub mod ids;
pub mod intake;
pub mod payload;
pub mod pipeline;
pub mod query;
pub mod raster;
pub mod reanalysis;
pub mod sanitize;
pub mod secrets;
pub mod services;
pub mod storage;
pub mod worker;

pub use config::{load_config, load_from_env, Config};
pub use db::{Database, DocumentStatus, SessionStatus};
pub use error::{
    ConfigError, InspectError, IntakeError, InvalidIdError, PersistenceError, Result, WorkerError,
};
pub use ids::normalize_document_id;
pub use intake::{SessionIntake, Upload};
pub use payload::{LabelsPayload, PayloadError};
pub use pipeline::{Adapters, Pipeline, PipelineConfig, PipelineContext};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use services::{Lazy, Services};
pub use worker::{Job, JobKind, JobResult, JobSink, WorkerPool};
