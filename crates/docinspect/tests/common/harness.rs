//! Isolated environment for running documents through the pipeline.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::runtime::Runtime;

use docinspect::db::document_repo::{self, DocumentRow, Order};
use docinspect::db::{analysis_repo, analysis_repo::AnalysisRow, session_repo, Database};
use docinspect::detect::Category;
use docinspect::intake::{SessionIntake, Upload};
use docinspect::pipeline::{Adapters, Pipeline, PipelineConfig};
use docinspect::storage::MemoryStore;
use docinspect::worker::{JobResult, WorkerPool};
use docinspect::{DocumentStatus, SessionStatus};

use super::fakes::{FakeDetector, FakeExtractor, FakeAnalyzer, WhitePageRenderer};

pub const BUCKET: &str = "inspect-test";

/// How long a test waits on the result channel before giving up.
const RESULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TestHarness {
    temp_dir: TempDir,
    pub work_root: PathBuf,
    pub db: Database,
    pub store: Arc<MemoryStore>,
    pub runtime: Runtime,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(BUCKET))
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let work_root = temp_dir.path().join("work");
        std::fs::create_dir_all(&work_root).expect("Failed to create work root");

        Self {
            temp_dir,
            work_root,
            db: Database::open_in_memory().expect("Failed to open database"),
            store: Arc::new(store),
            runtime: Runtime::new().expect("Failed to start runtime"),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            work_root: self.work_root.clone(),
            dpi: 72,
            threshold: 0.25,
            upload_concurrency: 4,
            analysis_enabled: true,
            extraction_timeout: Duration::from_secs(10),
            analysis_timeout: Duration::from_secs(10),
        }
    }

    /// Adapters that find nothing and analyze everything successfully.
    pub fn adapters(&self) -> Adapters {
        Adapters {
            renderer: Arc::new(WhitePageRenderer::default()),
            qr: FakeDetector::silent(Category::Qr),
            signature: FakeDetector::silent(Category::Signature),
            stamp: FakeDetector::silent(Category::Stamp),
            store: self.store.clone(),
            extractor: FakeExtractor::returning("Invoice 42\nTotal due: 100 EUR"),
            analyzer: FakeAnalyzer::reporting("Invoice"),
        }
    }

    pub fn pipeline(&self, config: PipelineConfig, adapters: Adapters) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            Arc::new(config),
            self.db.clone(),
            adapters,
            self.runtime.handle().clone(),
        ))
    }

    pub fn pool(&self, pipeline: Arc<Pipeline>, workers: usize) -> WorkerPool {
        WorkerPool::new(pipeline, workers).expect("Failed to start worker pool")
    }

    pub fn intake(&self) -> SessionIntake {
        SessionIntake::new(self.db.clone(), self.work_root.clone())
    }

    /// Blocks until `n` results arrived on the pool's result channel.
    pub fn collect_results(&self, pool: &WorkerPool, n: usize) -> Vec<JobResult> {
        let results = pool.results();
        (0..n)
            .map(|i| {
                results
                    .recv_timeout(RESULT_TIMEOUT)
                    .unwrap_or_else(|e| panic!("result {} of {} never arrived: {}", i + 1, n, e))
            })
            .collect()
    }

    pub fn session_status(&self, session_id: i64) -> SessionStatus {
        session_repo::find_by_id(&self.db, session_id)
            .expect("session lookup failed")
            .expect("session missing")
            .status
    }

    pub fn documents(&self, session_id: i64) -> Vec<DocumentRow> {
        document_repo::list_by_session(&self.db, session_id, None, Order::OldestFirst)
            .expect("document listing failed")
    }

    pub fn document_statuses(&self, session_id: i64) -> Vec<DocumentStatus> {
        self.documents(session_id).iter().map(|d| d.status).collect()
    }

    pub fn analysis(&self, document_id: i64) -> Option<AnalysisRow> {
        analysis_repo::find_by_document_id(&self.db, document_id).expect("analysis lookup failed")
    }
}

pub fn pdf_upload(name: &str, pages: usize) -> Upload {
    Upload::new(name, super::fakes::blank_pdf(pages))
}
