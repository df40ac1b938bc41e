use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Category, Detector, RawBox, BATCH_SIZE};
use crate::error::DetectionError;
use crate::raster::PageImage;

/// Calls a model-serving endpoint that accepts base64 PNG pages and answers
/// with one box list per page.
pub struct RemoteDetector {
    category: Category,
    endpoint: String,
    client: Client,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    images: Vec<String>,
    category: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    results: Vec<Vec<RawBox>>,
}

impl RemoteDetector {
    pub fn new(
        category: Category,
        endpoint: impl Into<String>,
        timeout: Duration,
        batch_size: usize,
    ) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Request {
                category,
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            category,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            batch_size: batch_size.clamp(1, BATCH_SIZE),
        })
    }

    fn request_error(&self, message: impl Into<String>) -> DetectionError {
        DetectionError::Request {
            category: self.category,
            message: message.into(),
        }
    }

    async fn detect_batch(&self, pages: &[PageImage]) -> Result<Vec<Vec<RawBox>>, DetectionError> {
        let mut images = Vec::with_capacity(pages.len());
        for page in pages {
            let bytes = tokio::fs::read(&page.path)
                .await
                .map_err(|e| DetectionError::ReadPage {
                    path: page.path.clone(),
                    source: e,
                })?;
            images.push(base64::engine::general_purpose::STANDARD.encode(bytes));
        }

        let url = format!("{}/detect", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&DetectRequest {
                images,
                category: self.category.as_str(),
            })
            .send()
            .await
            .map_err(|e| self.request_error(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(self.request_error(format!("HTTP {}", resp.status())));
        }

        let body: DetectResponse = resp
            .json()
            .await
            .map_err(|e| self.request_error(format!("Invalid response body: {}", e)))?;

        if body.results.len() != pages.len() {
            return Err(DetectionError::PageCountMismatch {
                category: self.category,
                expected: pages.len(),
                got: body.results.len(),
            });
        }
        Ok(body.results)
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    fn category(&self) -> Category {
        self.category
    }

    async fn detect(&self, pages: &[PageImage]) -> Result<Vec<Vec<RawBox>>, DetectionError> {
        let mut results = Vec::with_capacity(pages.len());
        for chunk in pages.chunks(self.batch_size) {
            results.extend(self.detect_batch(chunk).await?);
        }
        Ok(results)
    }
}

/// Finds nothing. Used when adapters are stubbed out.
#[derive(Debug, Clone, Copy)]
pub struct NullDetector(pub Category);

#[async_trait]
impl Detector for NullDetector {
    fn category(&self) -> Category {
        self.0
    }

    async fn detect(&self, pages: &[PageImage]) -> Result<Vec<Vec<RawBox>>, DetectionError> {
        Ok(vec![Vec::new(); pages.len()])
    }
}
