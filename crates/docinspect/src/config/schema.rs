use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default = "default_work_root")]
    pub work_root: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Replace every external adapter (detectors, OCR, LLM, object store)
    /// with in-process stand-ins.
    #[serde(default)]
    pub use_stub_adapters: bool,
    #[serde(default = "default_true")]
    pub analysis_enabled: bool,
    #[serde(default)]
    pub rasterize: RasterizeConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            server: ServerSection::default(),
            work_root: default_work_root(),
            database_path: default_database_path(),
            worker_count: default_worker_count(),
            use_stub_adapters: false,
            analysis_enabled: true,
            rasterize: RasterizeConfig::default(),
            detection: DetectionConfig::default(),
            storage: StorageConfig::default(),
            ocr: OcrConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_work_root() -> String {
    "./work".to_string()
}

fn default_database_path() -> String {
    "./data/docinspect.db".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_mb() -> usize {
    200
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterizeConfig {
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_dpi() -> u32 {
    300
}

impl Default for RasterizeConfig {
    fn default() -> Self {
        Self { dpi: default_dpi() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub endpoints: DetectorEndpoints,
    #[serde(default = "default_detection_timeout")]
    pub timeout_secs: u64,
}

fn default_threshold() -> f64 {
    0.25
}

fn default_batch_size() -> usize {
    8
}

fn default_detection_timeout() -> u64 {
    300
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            batch_size: default_batch_size(),
            endpoints: DetectorEndpoints::default(),
            timeout_secs: default_detection_timeout(),
        }
    }
}

/// Inference endpoint per detector category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorEndpoints {
    #[serde(default)]
    pub qr: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub stamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// S3-compatible API endpoint. `None` uses the AWS default for the region.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Base for the URLs handed back to clients, e.g. a CDN or public MinIO host.
    #[serde(default)]
    pub public_endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_true")]
    pub path_style: bool,
    #[serde(default)]
    pub access_key: SecretRef,
    #[serde(default)]
    pub secret_key: SecretRef,
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket() -> String {
    "documents".to_string()
}

fn default_upload_concurrency() -> usize {
    8
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            public_endpoint: None,
            region: default_region(),
            bucket: default_bucket(),
            path_style: true,
            access_key: SecretRef::default(),
            secret_key: SecretRef::default(),
            upload_concurrency: default_upload_concurrency(),
        }
    }
}

/// A credential given directly, via a file, or via an environment variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretRef {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
}

impl SecretRef {
    pub fn is_set(&self) -> bool {
        crate::secrets::has_secret_source(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    #[default]
    Remote,
    Tesseract,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default)]
    pub backend: OcrBackend,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

fn default_ocr_timeout() -> u64 {
    600
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::Remote,
            endpoint: None,
            timeout_secs: default_ocr_timeout(),
            languages: default_languages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_llm_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Text,
        }
    }
}
