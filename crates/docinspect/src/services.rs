//! Shared adapters, built on first use and handed out by `Arc`.
//!
//! The process holds one [`Services`]; the pipeline and the HTTP layer ask it
//! for adapters instead of reaching for globals.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::analysis::{Analyzer, LlmAnalyzer, LlmSettings, StubAnalyzer};
use crate::config::{Config, OcrBackend};
use crate::detect::{Category, Detector, NullDetector, RemoteDetector};
use crate::error::{ExtractionError, InspectError};
use crate::extract::{RemoteOcrExtractor, StubExtractor, TextExtractor};
use crate::pipeline::Adapters;
use crate::raster::{PageRenderer, PdftoppmRenderer};
use crate::storage::{MemoryStore, ObjectStore, S3Store};

/// A value initialised at most once, on first successful `get_or_try_init`.
///
/// Reads after initialisation take the lock-free `OnceLock` path. Concurrent
/// first callers serialise on the async mutex and re-check before building,
/// so the initialiser runs once even under contention. A failed initialiser
/// leaves the cell empty for the next caller.
pub struct Lazy<T> {
    cell: OnceLock<T>,
    init: Mutex<()>,
}

impl<T: Clone> Lazy<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Option<T> {
        self.cell.get().cloned()
    }

    pub async fn get_or_try_init<F, Fut, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }

        let _guard = self.init.lock().await;
        if let Some(value) = self.cell.get() {
            return Ok(value.clone());
        }

        let value = f().await?;
        // Only the guard holder sets the cell, so this cannot already be full.
        let _ = self.cell.set(value.clone());
        Ok(value)
    }
}

impl<T: Clone> Default for Lazy<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One detector per category, in merge order.
#[derive(Clone)]
pub struct DetectorSet {
    pub qr: Arc<dyn Detector>,
    pub signature: Arc<dyn Detector>,
    pub stamp: Arc<dyn Detector>,
}

pub struct Services {
    config: Arc<Config>,
    store: Lazy<Arc<dyn ObjectStore>>,
    detectors: Lazy<DetectorSet>,
    extractor: Lazy<Arc<dyn TextExtractor>>,
    analyzer: Lazy<Arc<dyn Analyzer>>,
}

impl Services {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            store: Lazy::new(),
            detectors: Lazy::new(),
            extractor: Lazy::new(),
            analyzer: Lazy::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn object_store(&self) -> Result<Arc<dyn ObjectStore>, InspectError> {
        self.store
            .get_or_try_init(|| async {
                if self.config.use_stub_adapters {
                    tracing::info!(bucket = %self.config.storage.bucket, "Using in-memory object store");
                    let store: Arc<dyn ObjectStore> =
                        Arc::new(MemoryStore::new(self.config.storage.bucket.clone()));
                    return Ok(store);
                }
                let store = S3Store::connect(&self.config.storage).await?;
                tracing::info!(bucket = %self.config.storage.bucket, "Connected to object store");
                Ok::<Arc<dyn ObjectStore>, InspectError>(Arc::new(store))
            })
            .await
    }

    pub async fn detectors(&self) -> Result<DetectorSet, InspectError> {
        self.detectors
            .get_or_try_init(|| async {
                Ok::<_, InspectError>(DetectorSet {
                    qr: self.detector(Category::Qr)?,
                    signature: self.detector(Category::Signature)?,
                    stamp: self.detector(Category::Stamp)?,
                })
            })
            .await
    }

    fn detector(&self, category: Category) -> Result<Arc<dyn Detector>, InspectError> {
        let detection = &self.config.detection;
        let endpoint = match category {
            Category::Qr => &detection.endpoints.qr,
            Category::Signature => &detection.endpoints.signature,
            Category::Stamp => &detection.endpoints.stamp,
        };

        match endpoint {
            Some(endpoint) if !self.config.use_stub_adapters => {
                let detector = RemoteDetector::new(
                    category,
                    endpoint.clone(),
                    Duration::from_secs(detection.timeout_secs),
                    detection.batch_size,
                )?;
                Ok(Arc::new(detector))
            }
            _ => {
                if !self.config.use_stub_adapters {
                    tracing::warn!(%category, "No detector endpoint configured, category will never be flagged");
                }
                Ok(Arc::new(NullDetector(category)))
            }
        }
    }

    pub async fn text_extractor(&self) -> Result<Arc<dyn TextExtractor>, InspectError> {
        self.extractor
            .get_or_try_init(|| async { self.build_extractor() })
            .await
    }

    fn build_extractor(&self) -> Result<Arc<dyn TextExtractor>, InspectError> {
        if self.config.use_stub_adapters {
            return Ok(Arc::new(StubExtractor));
        }

        let ocr = &self.config.ocr;
        match ocr.backend {
            OcrBackend::Remote => {
                let endpoint = ocr
                    .endpoint
                    .clone()
                    .ok_or_else(|| ExtractionError::Request("ocr.endpoint is not configured".into()))?;
                let extractor =
                    RemoteOcrExtractor::new(endpoint, Duration::from_secs(ocr.timeout_secs))?;
                Ok(Arc::new(extractor))
            }
            #[cfg(feature = "tesseract")]
            OcrBackend::Tesseract => Ok(Arc::new(crate::extract::TesseractExtractor::new(
                &ocr.languages,
            ))),
            #[cfg(not(feature = "tesseract"))]
            OcrBackend::Tesseract => Err(ExtractionError::Engine(
                "built without the `tesseract` feature".into(),
            )
            .into()),
        }
    }

    pub async fn analyzer(&self) -> Result<Arc<dyn Analyzer>, InspectError> {
        self.analyzer
            .get_or_try_init(|| async { self.build_analyzer() })
            .await
    }

    fn build_analyzer(&self) -> Result<Arc<dyn Analyzer>, InspectError> {
        if self.config.use_stub_adapters {
            return Ok(Arc::new(StubAnalyzer));
        }

        let llm = &self.config.llm;
        match &llm.endpoint {
            Some(endpoint) => {
                let analyzer = LlmAnalyzer::new(LlmSettings {
                    endpoint: endpoint.clone(),
                    timeout: Duration::from_secs(llm.timeout_secs),
                    max_tokens: llm.max_tokens,
                    temperature: llm.temperature,
                })?;
                Ok(Arc::new(analyzer))
            }
            None => {
                tracing::warn!("No LLM endpoint configured, analysis returns placeholder results");
                Ok(Arc::new(StubAnalyzer))
            }
        }
    }

    /// Everything a [`crate::pipeline::Pipeline`] needs, building what is
    /// still missing.
    pub async fn adapters(&self) -> Result<Adapters, InspectError> {
        let renderer: Arc<dyn PageRenderer> = Arc::new(PdftoppmRenderer);
        let detectors = self.detectors().await?;

        Ok(Adapters {
            renderer,
            qr: detectors.qr,
            signature: detectors.signature,
            stamp: detectors.stamp,
            store: self.object_store().await?,
            extractor: self.text_extractor().await?,
            analyzer: self.analyzer().await?,
        })
    }
}
