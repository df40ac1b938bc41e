pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, load_from_env};
pub use schema::{
    Config, DetectionConfig, DetectorEndpoints, LlmConfig, LogFormat, LoggingConfig, OcrBackend,
    OcrConfig, RasterizeConfig, SecretRef, ServerSection, StorageConfig,
};
