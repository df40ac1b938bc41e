//! Text extraction from rendered pages.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ExtractionError;
use crate::raster::PageImage;

mod remote;
#[cfg(feature = "tesseract")]
mod tesseract;

pub use remote::RemoteOcrExtractor;
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractExtractor;

/// Text recovered from one page image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageText {
    pub filename: String,
    #[serde(default)]
    pub text: String,
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Returns the document text with pages in input order, see [`join_pages`].
    async fn extract(&self, pages: &[PageImage]) -> Result<String, ExtractionError>;
}

/// Joins page texts as `--- Page: <file> ---\n<text>` blocks separated by a
/// blank line. Pages without text are left out; a document with no text at
/// all is [`ExtractionError::NoText`].
pub fn join_pages(pages: &[PageText]) -> Result<String, ExtractionError> {
    let blocks: Vec<String> = pages
        .iter()
        .filter(|p| !p.text.trim().is_empty())
        .map(|p| format!("--- Page: {} ---\n{}", p.filename, p.text.trim()))
        .collect();

    if blocks.is_empty() {
        return Err(ExtractionError::NoText);
    }
    Ok(blocks.join("\n\n"))
}

/// Produces placeholder text naming each page.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubExtractor;

#[async_trait]
impl TextExtractor for StubExtractor {
    async fn extract(&self, pages: &[PageImage]) -> Result<String, ExtractionError> {
        let texts: Vec<PageText> = pages
            .iter()
            .map(|p| PageText {
                filename: p.file_name(),
                text: format!("Placeholder text for page {}", p.index),
            })
            .collect();
        join_pages(&texts)
    }
}
