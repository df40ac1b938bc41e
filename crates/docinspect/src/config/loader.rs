use std::path::Path;

use crate::config::schema::{Config, OcrBackend};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DOCINSPECT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./docinspect.json";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads the file named by `DOCINSPECT_CONFIG` (or `./docinspect.json`).
///
/// A missing file yields the validated defaults; any other failure is an error.
pub fn load_from_env() -> Result<Config, ConfigError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let path = Path::new(&path);
    if !path.exists() {
        log::info!(
            "No config file at {}, using defaults",
            crate::sanitize::redact_path(path)
        );
        let config = Config::default();
        validate_config(&config)?;
        return Ok(config);
    }
    load_config(path)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.worker_count == 0 {
        return Err(invalid("worker_count must be at least 1"));
    }

    let threshold = config.detection.threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(invalid(format!(
            "detection.threshold must be within [0, 1], got {}",
            threshold
        )));
    }
    if config.detection.batch_size == 0 {
        return Err(invalid("detection.batch_size must be at least 1"));
    }
    if config.storage.upload_concurrency == 0 {
        return Err(invalid("storage.upload_concurrency must be at least 1"));
    }
    if !(72..=1200).contains(&config.rasterize.dpi) {
        return Err(invalid(format!(
            "rasterize.dpi must be within [72, 1200], got {}",
            config.rasterize.dpi
        )));
    }

    if config.ocr.backend == OcrBackend::Tesseract && !cfg!(feature = "tesseract") {
        return Err(invalid(
            "ocr.backend 'tesseract' requires building with the `tesseract` feature",
        ));
    }

    if config.use_stub_adapters {
        return Ok(());
    }

    let endpoints = &config.detection.endpoints;
    for (name, endpoint) in [
        ("qr", &endpoints.qr),
        ("signature", &endpoints.signature),
        ("stamp", &endpoints.stamp),
    ] {
        if endpoint.is_none() {
            return Err(invalid(format!(
                "detection.endpoints.{} is required unless use_stub_adapters is set",
                name
            )));
        }
    }

    if config.analysis_enabled {
        if config.ocr.backend == OcrBackend::Remote && config.ocr.endpoint.is_none() {
            return Err(invalid("ocr.endpoint is required for the remote OCR backend"));
        }
        if config.llm.endpoint.is_none() {
            return Err(invalid("llm.endpoint is required when analysis is enabled"));
        }
    }

    if config.storage.bucket.trim().is_empty() {
        return Err(invalid("storage.bucket must not be empty"));
    }

    Ok(())
}
