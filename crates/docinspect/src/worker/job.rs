use std::path::PathBuf;

use crate::db::document_repo::DetectionFlags;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobKind {
    /// Full inspection of a freshly uploaded PDF.
    #[default]
    Inspect,
    /// Analysis only, from page images already in object storage.
    Reanalyze,
}

/// One document queued for the worker pool.
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    pub document_id: i64,
    pub session_id: i64,
    /// Upload blob written at intake; removed once the pipeline is done.
    /// Empty for re-analysis.
    pub pdf_path: PathBuf,
    pub original_name: String,
}

impl Job {
    pub fn new(
        session_id: i64,
        document_id: i64,
        pdf_path: PathBuf,
        original_name: impl Into<String>,
    ) -> Self {
        Self {
            kind: JobKind::Inspect,
            document_id,
            session_id,
            pdf_path,
            original_name: original_name.into(),
        }
    }

    pub fn reanalysis(session_id: i64, document_id: i64, original_name: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Reanalyze,
            document_id,
            session_id,
            pdf_path: PathBuf::new(),
            original_name: original_name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub document_id: i64,
    pub session_id: i64,
    pub success: bool,
    pub flags: Option<DetectionFlags>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(job: &Job, flags: DetectionFlags) -> Self {
        Self {
            document_id: job.document_id,
            session_id: job.session_id,
            success: true,
            flags: Some(flags),
            error: None,
        }
    }

    /// A re-analysis that stored its result. No detection flags change.
    pub fn analyzed(job: &Job) -> Self {
        Self {
            document_id: job.document_id,
            session_id: job.session_id,
            success: true,
            flags: None,
            error: None,
        }
    }

    pub fn failure(job: &Job, error: String) -> Self {
        Self {
            document_id: job.document_id,
            session_id: job.session_id,
            success: false,
            flags: None,
            error: Some(error),
        }
    }
}
