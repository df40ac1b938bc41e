use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

pub struct PipelineConfig {
    pub work_root: PathBuf,
    pub dpi: u32,
    pub threshold: f64,
    pub upload_concurrency: usize,
    pub analysis_enabled: bool,
    pub extraction_timeout: Duration,
    pub analysis_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_root: PathBuf::from(&config.work_root),
            dpi: config.rasterize.dpi,
            threshold: config.detection.threshold,
            upload_concurrency: config.storage.upload_concurrency,
            analysis_enabled: config.analysis_enabled,
            extraction_timeout: Duration::from_secs(config.ocr.timeout_secs),
            analysis_timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }

    /// Scratch root for one document. Rasterizer output lands at
    /// `{scratch}/{hash}/`, so concurrent runs over identical bytes never
    /// share a directory that one of them is about to remove.
    pub fn scratch_root(&self, document_id: i64) -> PathBuf {
        self.work_root.join("jobs").join(document_id.to_string())
    }

    /// Scratch directory for re-analysing a finished document. Pipeline
    /// cleanup never touches it.
    pub fn reanalysis_root(&self, document_id: i64) -> PathBuf {
        self.work_root.join("reanalysis").join(document_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_defaults() {
        let config = Config::default();
        let pc = PipelineConfig::from_config(&config);
        assert_eq!(pc.dpi, 300);
        assert_eq!(pc.threshold, 0.25);
        assert_eq!(pc.upload_concurrency, 8);
        assert!(pc.analysis_enabled);
        assert_eq!(pc.extraction_timeout, Duration::from_secs(600));
        assert_eq!(pc.analysis_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_threshold_is_carried_exactly() {
        let mut config = Config::default();
        config.detection.threshold = 0.3;
        assert_eq!(PipelineConfig::from_config(&config).threshold, 0.3);
    }

    #[test]
    fn test_scratch_root_is_per_document() {
        let pc = PipelineConfig::from_config(&Config {
            work_root: "/srv/work".to_string(),
            ..Config::default()
        });
        assert_eq!(pc.scratch_root(42), PathBuf::from("/srv/work/jobs/42"));
        assert_eq!(pc.reanalysis_root(42), PathBuf::from("/srv/work/reanalysis/42"));
    }
}
