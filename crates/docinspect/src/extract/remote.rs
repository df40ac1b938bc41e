use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{join_pages, PageText, TextExtractor};
use crate::error::ExtractionError;
use crate::raster::PageImage;

/// OCR served over HTTP: page images in, per-page text out.
pub struct RemoteOcrExtractor {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ExtractRequest {
    images: Vec<ExtractImage>,
}

#[derive(Debug, Serialize)]
struct ExtractImage {
    filename: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    pages: Vec<PageText>,
}

impl RemoteOcrExtractor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }
}

#[async_trait]
impl TextExtractor for RemoteOcrExtractor {
    async fn extract(&self, pages: &[PageImage]) -> Result<String, ExtractionError> {
        let mut images = Vec::with_capacity(pages.len());
        for page in pages {
            let bytes = tokio::fs::read(&page.path)
                .await
                .map_err(|e| ExtractionError::ReadPage {
                    path: page.path.clone(),
                    source: e,
                })?;
            images.push(ExtractImage {
                filename: page.file_name(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            });
        }

        let url = format!("{}/extract", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&ExtractRequest { images })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractionError::Timeout {
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    ExtractionError::Request(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(ExtractionError::Request(format!("HTTP {}", resp.status())));
        }

        let body: ExtractResponse = resp
            .json()
            .await
            .map_err(|e| ExtractionError::Request(format!("Invalid response body: {}", e)))?;

        // Keep the order of the pages we sent, whatever order the service used.
        let mut by_name = body.pages;
        let ordered: Vec<PageText> = pages
            .iter()
            .filter_map(|p| {
                let name = p.file_name();
                by_name
                    .iter()
                    .position(|t| t.filename == name)
                    .map(|i| by_name.swap_remove(i))
            })
            .collect();

        join_pages(&ordered)
    }
}
