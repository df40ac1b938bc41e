use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, error, info, info_span, warn};

use crate::analysis::{AnalysisReport, Analyzer};
use crate::annotate::{self, ArtifactAnnotator};
use crate::db::document_repo::{self, DetectionFlags, DocumentRow};
use crate::db::{analysis_repo, session_repo, Database};
use crate::detect::{DetectionAggregator, Detector};
use crate::error::{AnalysisError, ExtractionError, PersistenceError};
use crate::extract::TextExtractor;
use crate::payload::LabelsPayload;
use crate::raster::{PageImage, PageRenderer, Rasterizer};
use crate::sanitize;
use crate::storage::{self, DocumentKeys, ObjectStore};
use crate::worker::job::{Job, JobKind, JobResult};

use super::best_effort::best_effort;
use super::config::PipelineConfig;
use super::context::{AnalysisOutcome, PipelineContext};
use super::error::{AnalysisFailure, PipelineError};

/// Every external boundary the pipeline talks to.
#[derive(Clone)]
pub struct Adapters {
    pub renderer: Arc<dyn PageRenderer>,
    pub qr: Arc<dyn Detector>,
    pub signature: Arc<dyn Detector>,
    pub stamp: Arc<dyn Detector>,
    pub store: Arc<dyn ObjectStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub analyzer: Arc<dyn Analyzer>,
}

/// Drives one document from PENDING to a terminal status.
///
/// `run` is synchronous and meant for worker threads; async adapters are
/// driven on the shared runtime through `runtime`.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    db: Database,
    rasterizer: Rasterizer,
    aggregator: DetectionAggregator,
    annotator: ArtifactAnnotator,
    store: Arc<dyn ObjectStore>,
    extractor: Arc<dyn TextExtractor>,
    analyzer: Arc<dyn Analyzer>,
    runtime: Handle,
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>, db: Database, adapters: Adapters, runtime: Handle) -> Self {
        let rasterizer = Rasterizer::new(adapters.renderer, config.dpi);
        let aggregator = DetectionAggregator::new(
            adapters.qr,
            adapters.signature,
            adapters.stamp,
            config.threshold,
        );
        let annotator = ArtifactAnnotator::new(config.dpi);

        Self {
            config,
            db,
            rasterizer,
            aggregator,
            annotator,
            store: adapters.store,
            extractor: adapters.extractor,
            analyzer: adapters.analyzer,
            runtime,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &dyn Analyzer {
        self.analyzer.as_ref()
    }

    pub fn process(&self, job: Job) -> JobResult {
        match job.kind {
            JobKind::Inspect => self.run(PipelineContext::new(job)).0,
            JobKind::Reanalyze => match self.reanalyze(job.document_id) {
                Ok(AnalysisOutcome::Failed(message)) => JobResult::failure(&job, message),
                Ok(_) => JobResult::analyzed(&job),
                Err(e) => JobResult::failure(&job, e.to_string()),
            },
        }
    }

    /// Run the full pipeline for a single document.
    /// Returns a (JobResult, PipelineContext) pair. Never panics on step
    /// failure and never returns an error: every failure ends as FAILED.
    pub fn run(&self, mut ctx: PipelineContext) -> (JobResult, PipelineContext) {
        let filename = sanitize::redact_path(Path::new(&ctx.job.original_name));
        let _pipeline_span = info_span!("pipeline",
            session_id = ctx.job.session_id,
            document_id = ctx.job.document_id,
            filename = %filename,
        )
        .entered();

        let result = match self.run_steps(&mut ctx) {
            Ok(flags) => {
                info!(
                    has_qr = flags.has_qr,
                    has_signature = flags.has_signature,
                    has_stamp = flags.has_stamp,
                    "Document processed"
                );
                JobResult::success(&ctx.job, flags)
            }
            Err(e) => {
                let err_msg = e.to_string();
                error!(error = %err_msg, "Document processing failed");
                let document_id = ctx.job.document_id;
                best_effort("mark document failed", || {
                    document_repo::mark_failed(&self.db, document_id)
                });
                JobResult::failure(&ctx.job, err_msg)
            }
        };

        {
            let _step = info_span!("cleanup").entered();
            self.step_cleanup(&ctx);
        }

        {
            let _step = info_span!("aggregate_session").entered();
            let session_id = ctx.job.session_id;
            best_effort("recompute session status", || {
                session_repo::recompute_status(&self.db, session_id)
            });
        }

        (result, ctx)
    }

    /// Marks a job FAILED without running it, e.g. after a worker panic.
    /// A re-analysis job fails its analysis record only.
    pub fn abandon(&self, job: &Job) {
        if job.kind == JobKind::Reanalyze {
            self.record_analysis_failure(job.document_id, "pipeline panicked");
            return;
        }
        best_effort("mark document failed", || {
            document_repo::mark_failed(&self.db, job.document_id)
        });
        best_effort("recompute session status", || {
            session_repo::recompute_status(&self.db, job.session_id)
        });
    }

    fn run_steps(&self, ctx: &mut PipelineContext) -> Result<DetectionFlags, PipelineError> {
        {
            let _step = info_span!("rasterize").entered();
            self.step_rasterize(ctx)?;
        }

        {
            let _step = info_span!("upload_sources").entered();
            self.step_upload_sources(ctx)?;
        }

        if self.config.analysis_enabled {
            let _step = info_span!("analysis").entered();
            self.step_analysis(ctx);
        } else {
            ctx.analysis = Some(AnalysisOutcome::Skipped);
        }

        {
            let _step = info_span!("detect").entered();
            self.step_detect(ctx)?;
        }

        {
            let _step = info_span!("annotate").entered();
            self.step_annotate(ctx)?;
        }

        {
            let _step = info_span!("upload_labeled").entered();
            self.step_upload_labeled(ctx)?;
        }

        self.step_build_payload(ctx)?;

        let _step = info_span!("persist").entered();
        self.step_persist(ctx)
    }

    fn step_rasterize(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let scratch = self.config.scratch_root(ctx.job.document_id);
        let raster = self.rasterizer.rasterize(&ctx.job.pdf_path, &scratch)?;
        debug!(pages = raster.pages.len(), hash = %raster.content_hash, "Rasterized");
        ctx.raster = Some(raster);
        Ok(())
    }

    fn step_upload_sources(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let raster = ctx
            .raster
            .as_ref()
            .ok_or(PipelineError::MissingInput("upload_sources"))?;
        let items = annotate::source_uploads(&ctx.keys, raster);
        let urls = self.runtime.block_on(storage::upload_all(
            self.store.as_ref(),
            items,
            self.config.upload_concurrency,
        ))?;
        ctx.urls.extend(urls);
        Ok(())
    }

    /// Text extraction then semantic analysis. Failures end up in the
    /// analysis record only; the document itself carries on.
    fn step_analysis(&self, ctx: &mut PipelineContext) {
        let Some(raster) = ctx.raster.as_ref() else {
            return;
        };
        let outcome = self.analyze(ctx.job.document_id, || Ok(raster.pages.clone()));
        ctx.analysis = Some(outcome);
    }

    /// Runs the analysis sub-pipeline again for a processed document, reading
    /// its page images back from object storage. Analysis failures are
    /// recorded and returned as `AnalysisOutcome::Failed`; only an unknown
    /// document or an unreachable database is an error.
    pub fn reanalyze(&self, document_id: i64) -> Result<AnalysisOutcome, PipelineError> {
        let document = document_repo::find_by_id(&self.db, document_id)?.ok_or(
            PersistenceError::NotFound {
                entity: "document",
                id: document_id,
            },
        )?;
        let _span = info_span!("reanalysis",
            session_id = document.session_id,
            document_id,
        )
        .entered();

        let scratch = self.config.reanalysis_root(document_id);
        let outcome = self.analyze(document_id, || self.fetch_pages(&document, &scratch));

        if scratch.exists() {
            if let Err(e) = std::fs::remove_dir_all(&scratch) {
                warn!(error = %e, "Failed to remove re-analysis directory");
            }
        }
        Ok(outcome)
    }

    /// Opens the analysis record, runs extraction and analysis over the
    /// pages, and stores the result. The record ends COMPLETED or FAILED
    /// unless the database itself is unreachable.
    fn analyze<F>(&self, document_id: i64, pages: F) -> AnalysisOutcome
    where
        F: FnOnce() -> Result<Vec<PageImage>, AnalysisFailure>,
    {
        if let Err(e) = analysis_repo::start(&self.db, document_id) {
            error!(error = %e, "Could not open analysis record, skipping analysis");
            return AnalysisOutcome::Failed(e.to_string());
        }

        let result = pages().and_then(|pages| self.runtime.block_on(self.extract_and_analyze(&pages)));
        let (text, report) = match result {
            Ok(analyzed) => analyzed,
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Analysis failed");
                self.record_analysis_failure(document_id, &message);
                return AnalysisOutcome::Failed(message);
            }
        };

        match analysis_repo::complete(&self.db, document_id, &text, &report) {
            Ok(true) => {
                info!(
                    document_type = %report.document_type,
                    fraud_sentences = report.fraud_sentences.len(),
                    mistake_words = report.mistake_words.len(),
                    "Analysis completed"
                );
                AnalysisOutcome::Completed(report)
            }
            Ok(false) => {
                // Someone else already finalized the record.
                let e = PersistenceError::AlreadyFinal {
                    entity: "analysis",
                    id: document_id,
                };
                error!(error = %e, "Analysis result not stored");
                AnalysisOutcome::Failed(format!("Failed to store analysis result: {e}"))
            }
            Err(e) => {
                let message = format!("Failed to store analysis result: {e}");
                error!(error = %message, "Analysis result not stored");
                self.record_analysis_failure(document_id, &message);
                AnalysisOutcome::Failed(message)
            }
        }
    }

    fn record_analysis_failure(&self, document_id: i64, message: &str) {
        best_effort("record analysis failure", || -> Result<(), PersistenceError> {
            if analysis_repo::fail(&self.db, document_id, message)? {
                Ok(())
            } else {
                Err(PersistenceError::AlreadyFinal {
                    entity: "analysis",
                    id: document_id,
                })
            }
        });
    }

    /// Downloads the stored page images of `document` into `dir`.
    fn fetch_pages(&self, document: &DocumentRow, dir: &Path) -> Result<Vec<PageImage>, AnalysisFailure> {
        let indices = document
            .labels_position
            .as_ref()
            .and_then(|value| LabelsPayload::normalize(value).ok())
            .map(|payload| page_indices(&payload.pages_map()))
            .unwrap_or_default();
        if indices.is_empty() {
            return Err(AnalysisFailure::NoPages);
        }

        std::fs::create_dir_all(dir).map_err(|e| AnalysisFailure::Stage {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let keys = DocumentKeys::new(document.session_id, document.id);
        let mut pages = Vec::with_capacity(indices.len());
        for index in indices {
            let bytes = self.runtime.block_on(self.store.get_bytes(&keys.page(index)))?;
            let path = dir.join(format!("page_{index}.png"));
            let stage_err = |message: String| AnalysisFailure::Stage {
                path: path.clone(),
                message,
            };
            std::fs::write(&path, &bytes).map_err(|e| stage_err(e.to_string()))?;
            let (width, height) = image::image_dimensions(&path).map_err(|e| stage_err(e.to_string()))?;
            pages.push(PageImage {
                index,
                path,
                width,
                height,
            });
        }
        debug!(pages = pages.len(), "Fetched stored page images");
        Ok(pages)
    }

    async fn extract_and_analyze(
        &self,
        pages: &[PageImage],
    ) -> Result<(String, AnalysisReport), AnalysisFailure> {
        let extraction_timeout = self.config.extraction_timeout;
        let text = tokio::time::timeout(extraction_timeout, self.extractor.extract(pages))
            .await
            .unwrap_or_else(|_| {
                Err(ExtractionError::Timeout {
                    secs: extraction_timeout.as_secs(),
                })
            })?;

        let analysis_timeout = self.config.analysis_timeout;
        let report = tokio::time::timeout(analysis_timeout, self.analyzer.analyze(&text))
            .await
            .unwrap_or_else(|_| {
                Err(AnalysisError::Timeout {
                    secs: analysis_timeout.as_secs(),
                })
            })?;

        Ok((text, report))
    }

    fn step_detect(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let raster = ctx
            .raster
            .as_ref()
            .ok_or(PipelineError::MissingInput("detect"))?;
        let summary = self.runtime.block_on(self.aggregator.run(&raster.pages))?;
        debug!(detections = summary.total(), "Detection finished");
        ctx.detections = Some(summary);
        Ok(())
    }

    fn step_annotate(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let raster = ctx
            .raster
            .as_ref()
            .ok_or(PipelineError::MissingInput("annotate"))?;
        let detections = ctx
            .detections
            .as_ref()
            .ok_or(PipelineError::MissingInput("annotate"))?;
        ctx.annotated = Some(self.annotator.annotate(raster, detections)?);
        Ok(())
    }

    fn step_upload_labeled(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let annotated = ctx
            .annotated
            .as_ref()
            .ok_or(PipelineError::MissingInput("upload_labeled"))?;
        let items = annotate::labeled_uploads(&ctx.keys, annotated);
        let urls = self.runtime.block_on(storage::upload_all(
            self.store.as_ref(),
            items,
            self.config.upload_concurrency,
        ))?;
        ctx.urls.extend(urls);
        Ok(())
    }

    fn step_build_payload(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let raster = ctx
            .raster
            .as_ref()
            .ok_or(PipelineError::MissingInput("build_payload"))?;
        let detections = ctx
            .detections
            .as_ref()
            .ok_or(PipelineError::MissingInput("build_payload"))?;

        let artifacts = annotate::artifacts(&ctx.keys, &raster.pages, &ctx.urls);
        ctx.payload = Some(annotate::build_payload(
            &ctx.job.original_name,
            &raster.pages,
            detections,
            artifacts,
        ));
        Ok(())
    }

    fn step_persist(&self, ctx: &mut PipelineContext) -> Result<DetectionFlags, PipelineError> {
        let payload = ctx
            .payload
            .as_ref()
            .ok_or(PipelineError::MissingInput("persist"))?;
        let flags = ctx
            .detections
            .as_ref()
            .map(|d| d.flags)
            .ok_or(PipelineError::MissingInput("persist"))?;

        let value = payload.to_value().map_err(PersistenceError::from)?;
        let written = document_repo::mark_successful(&self.db, ctx.job.document_id, flags, &value)?;
        if !written {
            return Err(PersistenceError::AlreadyFinal {
                entity: "document",
                id: ctx.job.document_id,
            }
            .into());
        }
        Ok(flags)
    }

    fn step_cleanup(&self, ctx: &PipelineContext) {
        let scratch = self.config.scratch_root(ctx.job.document_id);
        if scratch.exists() {
            if let Err(e) = std::fs::remove_dir_all(&scratch) {
                warn!(error = %e, "Failed to remove working directory");
            }
        }
        if ctx.job.pdf_path.exists() {
            if let Err(e) = std::fs::remove_file(&ctx.job.pdf_path) {
                warn!(
                    path = %sanitize::redact_path(&ctx.job.pdf_path),
                    error = %e,
                    "Failed to remove upload blob"
                );
            }
        }
    }
}

/// `page_N` keys of a payload's page map, in page order.
fn page_indices(pages: &serde_json::Map<String, serde_json::Value>) -> Vec<u32> {
    let mut indices: Vec<u32> = pages
        .keys()
        .filter_map(|key| key.strip_prefix("page_")?.parse().ok())
        .collect();
    indices.sort_unstable();
    indices
}
