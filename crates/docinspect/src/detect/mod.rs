//! Visual artifact detection: QR codes, signatures and stamps.
//!
//! Each category has its own [`Detector`]. The aggregator calls them once per
//! document in a fixed order (qr, signature, stamp), filters low-confidence
//! boxes, clamps the rest into the page rectangle and derives the per-document
//! flags.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::document_repo::DetectionFlags;
use crate::error::DetectionError;
use crate::raster::PageImage;

mod remote;

pub use remote::{NullDetector, RemoteDetector};

/// Pages per inference request.
pub const BATCH_SIZE: usize = 8;

pub const DEFAULT_THRESHOLD: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Qr,
    Signature,
    Stamp,
}

impl Category {
    /// Merge order for per-page results.
    pub const ALL: [Category; 3] = [Category::Qr, Category::Signature, Category::Stamp];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Qr => "qr",
            Category::Signature => "signature",
            Category::Stamp => "stamp",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A box as the models emit it: two corners plus a score, in page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub category: Category,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub area: f64,
    pub confidence: f64,
}

impl Detection {
    /// Converts a corner box to origin/size form, clamped into a
    /// `page_width × page_height` page. Returns `None` when nothing of the
    /// box remains on the page.
    pub fn from_raw(category: Category, raw: RawBox, page_width: u32, page_height: u32) -> Option<Self> {
        let (w, h) = (page_width as f64, page_height as f64);
        let left = raw.x1.min(raw.x2).clamp(0.0, w);
        let right = raw.x1.max(raw.x2).clamp(0.0, w);
        let top = raw.y1.min(raw.y2).clamp(0.0, h);
        let bottom = raw.y1.max(raw.y2).clamp(0.0, h);

        let width = right - left;
        let height = bottom - top;
        if width <= 0.0 || height <= 0.0 {
            return None;
        }

        Some(Self {
            category,
            x: left,
            y: top,
            width,
            height,
            area: width * height,
            confidence: raw.confidence,
        })
    }
}

/// One detection model behind an inference boundary.
#[async_trait]
pub trait Detector: Send + Sync {
    fn category(&self) -> Category;

    /// Returns one box list per input page, in input order.
    async fn detect(&self, pages: &[PageImage]) -> Result<Vec<Vec<RawBox>>, DetectionError>;
}

#[derive(Debug, Clone, Default)]
pub struct DetectionSummary {
    /// Indexed like the input pages.
    pub per_page: Vec<Vec<Detection>>,
    pub flags: DetectionFlags,
}

impl DetectionSummary {
    pub fn total(&self) -> usize {
        self.per_page.iter().map(Vec::len).sum()
    }
}

pub struct DetectionAggregator {
    detectors: [Arc<dyn Detector>; 3],
    threshold: f64,
}

impl DetectionAggregator {
    pub fn new(
        qr: Arc<dyn Detector>,
        signature: Arc<dyn Detector>,
        stamp: Arc<dyn Detector>,
        threshold: f64,
    ) -> Self {
        Self {
            detectors: [qr, signature, stamp],
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub async fn run(&self, pages: &[PageImage]) -> Result<DetectionSummary, DetectionError> {
        let mut per_page: Vec<Vec<Detection>> = vec![Vec::new(); pages.len()];
        if pages.is_empty() {
            return Ok(DetectionSummary::default());
        }

        for detector in &self.detectors {
            let category = detector.category();
            let results = detector.detect(pages).await?;
            if results.len() != pages.len() {
                return Err(DetectionError::PageCountMismatch {
                    category,
                    expected: pages.len(),
                    got: results.len(),
                });
            }

            let mut kept = 0usize;
            for ((page, boxes), out) in pages.iter().zip(results).zip(per_page.iter_mut()) {
                for raw in boxes {
                    if raw.confidence < self.threshold {
                        continue;
                    }
                    if let Some(det) = Detection::from_raw(category, raw, page.width, page.height) {
                        out.push(det);
                        kept += 1;
                    }
                }
            }
            tracing::debug!(%category, kept, "Detector finished");
        }

        let any = |category: Category| {
            per_page
                .iter()
                .flatten()
                .any(|d| d.category == category)
        };
        let flags = DetectionFlags {
            has_qr: any(Category::Qr),
            has_signature: any(Category::Signature),
            has_stamp: any(Category::Stamp),
        };

        Ok(DetectionSummary { per_page, flags })
    }
}
