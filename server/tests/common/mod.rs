//! Router construction and request helpers for API tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use async_trait::async_trait;
use docinspect::analysis::{AnalysisReport, Analyzer, ChatReply, StubAnalyzer};
use docinspect::detect::{Category, NullDetector};
use docinspect::error::{AnalysisError, WorkerError};
use docinspect::extract::StubExtractor;
use docinspect::intake::SessionIntake;
use docinspect::pipeline::{Adapters, Pipeline, PipelineConfig};
use docinspect::raster::PdftoppmRenderer;
use docinspect::storage::MemoryStore;
use docinspect::worker::{Job, JobSink};
use docinspect::Database;
use docinspect_server::config::ServerConfig;
use docinspect_server::routes;
use docinspect_server::state::AppState;

pub const BOUNDARY: &str = "docinspect-test-boundary";

/// Keeps jobs instead of running them, so tests control document state.
#[derive(Default)]
pub struct RecordingSink {
    pub jobs: Mutex<Vec<Job>>,
}

impl JobSink for RecordingSink {
    fn submit(&self, job: Job) -> Result<(), WorkerError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Language model that is always down.
pub struct UnreachableAnalyzer;

#[async_trait]
impl Analyzer for UnreachableAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<AnalysisReport, AnalysisError> {
        Err(AnalysisError::Timeout { secs: 1 })
    }

    async fn chat(&self, _prompt: &str) -> Result<ChatReply, AnalysisError> {
        Err(AnalysisError::Timeout { secs: 1 })
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<MemoryStore>,
    _work_root: TempDir,
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        max_upload_bytes: 10 * 1024 * 1024,
    }
}

/// Mirrors the router assembled in `main.rs`. Must be called inside a
/// Tokio runtime.
pub fn build_test_app() -> TestApp {
    build_test_app_with_analyzer(Arc::new(StubAnalyzer))
}

pub fn build_test_app_with_analyzer(analyzer: Arc<dyn Analyzer>) -> TestApp {
    let work_root = TempDir::new().unwrap();
    let db = Database::open_in_memory().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(MemoryStore::new("api-test"));

    let adapters = Adapters {
        renderer: Arc::new(PdftoppmRenderer),
        qr: Arc::new(NullDetector(Category::Qr)),
        signature: Arc::new(NullDetector(Category::Signature)),
        stamp: Arc::new(NullDetector(Category::Stamp)),
        store: store.clone(),
        extractor: Arc::new(StubExtractor),
        analyzer,
    };
    let pipeline_config = PipelineConfig {
        work_root: work_root.path().to_path_buf(),
        dpi: 72,
        threshold: 0.25,
        upload_concurrency: 2,
        analysis_enabled: true,
        extraction_timeout: Duration::from_secs(5),
        analysis_timeout: Duration::from_secs(5),
    };
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(pipeline_config),
        db.clone(),
        adapters,
        tokio::runtime::Handle::current(),
    ));

    let state = AppState {
        db: db.clone(),
        intake: Arc::new(SessionIntake::new(db.clone(), work_root.path())),
        jobs: sink.clone(),
        pipeline,
        config: Arc::new(test_config()),
    };

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(axum::extract::DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state);

    TestApp {
        router,
        db,
        sink,
        store,
        _work_root: work_root,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    app.router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// POSTs `(field, filename, bytes)` parts as multipart/form-data.
pub async fn post_files(app: &TestApp, uri: &str, parts: &[(&str, &str, &[u8])]) -> Response<Body> {
    let mut body = Vec::new();
    for (field, filename, bytes) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

/// POSTs a JSON body with optional extra headers.
pub async fn post_json(
    app: &TestApp,
    uri: &str,
    body: &serde_json::Value,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut request = Request::post(uri).header("content-type", "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let request = request.body(Body::from(body.to_string())).unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
