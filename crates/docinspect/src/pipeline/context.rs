use std::collections::HashMap;

use crate::analysis::AnalysisReport;
use crate::annotate::AnnotatedDocument;
use crate::detect::DetectionSummary;
use crate::payload::LabelsPayload;
use crate::raster::RasterOutput;
use crate::storage::DocumentKeys;
use crate::worker::job::Job;

/// How the isolated analysis sub-pipeline ended for this run.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Skipped,
    Completed(AnalysisReport),
    Failed(String),
}

pub struct PipelineContext {
    // Input
    pub job: Job,
    pub keys: DocumentKeys,

    // Step 1 result, guaranteed Some after step_rasterize
    pub raster: Option<RasterOutput>,

    // Object key → URL for everything uploaded so far
    pub urls: HashMap<String, String>,

    // Step 3 result
    pub analysis: Option<AnalysisOutcome>,

    // Step 4 result, guaranteed Some after step_detect
    pub detections: Option<DetectionSummary>,

    // Step 5 result
    pub annotated: Option<AnnotatedDocument>,

    // Step 6 result, the value written to the document row
    pub payload: Option<LabelsPayload>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        let keys = DocumentKeys::new(job.session_id, job.document_id);
        Self {
            job,
            keys,
            raster: None,
            urls: HashMap::new(),
            analysis: None,
            detections: None,
            annotated: None,
            payload: None,
        }
    }
}
