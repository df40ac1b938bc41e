//! On-demand re-analysis of documents that already went through the
//! pipeline, either inline or on the worker pool.

use tracing::{info, warn};

use crate::db::{analysis_repo, document_repo, Database};
use crate::error::{PersistenceError, Result};
use crate::ids::normalize_document_id;
use crate::pipeline::{best_effort, Pipeline};
use crate::query::{self, AnalysisStatusDto};
use crate::worker::{Job, JobSink};

/// Re-analyses a document on the calling thread and returns the stored
/// analysis state.
pub fn run(pipeline: &Pipeline, db: &Database, raw_document_id: &str) -> Result<AnalysisStatusDto> {
    let document_id = normalize_document_id(raw_document_id)?;
    pipeline.reanalyze(document_id)?;
    query::analysis_status(db, &document_id.to_string())
}

/// Marks the analysis PROCESSING and queues a re-analysis job. Waits for
/// room when the queue is full. Returns the normalized document id.
pub fn schedule(db: &Database, sink: &dyn JobSink, raw_document_id: &str) -> Result<i64> {
    let document_id = normalize_document_id(raw_document_id)?;
    let document = document_repo::find_by_id(db, document_id)?.ok_or(PersistenceError::NotFound {
        entity: "document",
        id: document_id,
    })?;

    analysis_repo::start(db, document_id)?;
    let job = Job::reanalysis(document.session_id, document_id, document.original_name);
    if let Err(e) = sink.submit(job) {
        warn!(document_id, error = %e, "Re-analysis job not accepted");
        best_effort("record analysis failure", || {
            analysis_repo::fail(db, document_id, &e.to_string())
        });
        return Err(e.into());
    }

    info!(document_id, "Re-analysis queued");
    Ok(document_id)
}
