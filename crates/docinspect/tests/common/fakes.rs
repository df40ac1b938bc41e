//! In-process stand-ins for the external boundaries.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object};

use docinspect::analysis::{AnalysisReport, Analyzer, ChatReply};
use docinspect::detect::{Category, Detector, RawBox};
use docinspect::error::{AnalysisError, DetectionError, ExtractionError, RasterError};
use docinspect::extract::TextExtractor;
use docinspect::raster::{PageImage, PageRenderer};

/// Writes a white PNG instead of calling poppler.
pub struct WhitePageRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for WhitePageRenderer {
    fn default() -> Self {
        Self {
            width: 85,
            height: 110,
        }
    }
}

impl PageRenderer for WhitePageRenderer {
    fn render_page(&self, _pdf: &Path, page: u32, _dpi: u32, out: &Path) -> Result<(), RasterError> {
        image::RgbImage::from_pixel(self.width, self.height, image::Rgb([255, 255, 255]))
            .save(out)
            .map_err(|e| RasterError::Render {
                page,
                message: e.to_string(),
            })
    }
}

/// Returns canned boxes for chosen 1-based pages and nothing elsewhere.
pub struct FakeDetector {
    category: Category,
    boxes: HashMap<u32, Vec<RawBox>>,
}

impl FakeDetector {
    pub fn silent(category: Category) -> Arc<dyn Detector> {
        Arc::new(Self {
            category,
            boxes: HashMap::new(),
        })
    }

    pub fn on_page(category: Category, page: u32, boxes: Vec<RawBox>) -> Arc<dyn Detector> {
        Arc::new(Self {
            category,
            boxes: HashMap::from([(page, boxes)]),
        })
    }
}

#[async_trait]
impl Detector for FakeDetector {
    fn category(&self) -> Category {
        self.category
    }

    async fn detect(&self, pages: &[PageImage]) -> Result<Vec<Vec<RawBox>>, DetectionError> {
        Ok(pages
            .iter()
            .map(|p| self.boxes.get(&p.index).cloned().unwrap_or_default())
            .collect())
    }
}

pub fn raw_box(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawBox {
    RawBox {
        x1,
        y1,
        x2,
        y2,
        confidence,
    }
}

/// Extractor returning fixed text, optionally after a delay.
pub struct FakeExtractor {
    pub text: String,
    pub delay: Duration,
}

impl FakeExtractor {
    pub fn returning(text: &str) -> Arc<dyn TextExtractor> {
        Arc::new(Self {
            text: text.to_string(),
            delay: Duration::ZERO,
        })
    }

    /// Sleeps for `delay` before answering, to trip the pipeline timeout.
    pub fn hanging(delay: Duration) -> Arc<dyn TextExtractor> {
        Arc::new(Self {
            text: "late text".to_string(),
            delay,
        })
    }
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, _pages: &[PageImage]) -> Result<String, ExtractionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.text.clone())
    }
}

/// Analyzer returning a canned report, or failing when `report` is `None`.
/// Chat answers echo the prompt.
pub struct FakeAnalyzer {
    pub report: Option<AnalysisReport>,
}

impl FakeAnalyzer {
    pub fn reporting(document_type: &str) -> Arc<dyn Analyzer> {
        Arc::new(Self {
            report: Some(AnalysisReport {
                fraud_sentences: vec!["Pay in cash only.".to_string()],
                mistake_words: vec!["recieve".to_string()],
                document_type: document_type.to_string(),
                document_summary: "A short invoice.".to_string(),
            }),
        })
    }

    pub fn failing() -> Arc<dyn Analyzer> {
        Arc::new(Self { report: None })
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<AnalysisReport, AnalysisError> {
        self.report.clone().ok_or(AnalysisError::Request {
            query: "summary",
            message: "connection refused".to_string(),
        })
    }

    async fn chat(&self, prompt: &str) -> Result<ChatReply, AnalysisError> {
        match self.report {
            Some(_) => Ok(ChatReply {
                answer: prompt.to_string(),
                model: Some("fake".to_string()),
            }),
            None => Err(AnalysisError::Request {
                query: "chat",
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// A PDF with `pages` blank US-letter pages.
pub fn blank_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }))
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize test PDF");
    bytes
}

/// Builds a ZIP archive from `(entry name, bytes)` pairs.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(*name, options).expect("Failed to start zip entry");
        writer.write_all(bytes).expect("Failed to write zip entry");
    }
    writer.finish().expect("Failed to finish zip").into_inner()
}
