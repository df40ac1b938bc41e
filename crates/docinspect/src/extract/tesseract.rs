use std::sync::Arc;

use async_trait::async_trait;

use super::{join_pages, PageText, TextExtractor};
use crate::error::ExtractionError;
use crate::raster::PageImage;

/// Local OCR through Tesseract. Each page runs on the blocking pool.
#[derive(Clone)]
pub struct TesseractExtractor {
    inner: Arc<TesseractInner>,
}

struct TesseractInner {
    languages: String,
}

impl TesseractExtractor {
    pub fn new(languages: &[String]) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(TesseractInner {
                languages: lang_str,
            }),
        }
    }

    pub fn languages(&self) -> &str {
        &self.inner.languages
    }

    fn recognize(languages: &str, png: &[u8]) -> Result<String, ExtractionError> {
        let _span = tracing::debug_span!("extract.tesseract").entered();

        let mut lt = leptess::LepTess::new(None, languages).map_err(|e| {
            ExtractionError::Engine(format!("Failed to initialize Tesseract: {}", e))
        })?;
        lt.set_image_from_mem(png)
            .map_err(|e| ExtractionError::Engine(format!("Failed to set image for OCR: {}", e)))?;
        lt.get_utf8_text()
            .map_err(|e| ExtractionError::Engine(format!("OCR failed: {}", e)))
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    async fn extract(&self, pages: &[PageImage]) -> Result<String, ExtractionError> {
        let mut texts = Vec::with_capacity(pages.len());
        for page in pages {
            let png = tokio::fs::read(&page.path)
                .await
                .map_err(|e| ExtractionError::ReadPage {
                    path: page.path.clone(),
                    source: e,
                })?;

            let inner = Arc::clone(&self.inner);
            let text = tokio::task::spawn_blocking(move || Self::recognize(&inner.languages, &png))
                .await
                .map_err(|e| ExtractionError::Engine(format!("OCR task failed: {}", e)))??;

            texts.push(PageText {
                filename: page.file_name(),
                text,
            });
        }
        join_pages(&texts)
    }
}
