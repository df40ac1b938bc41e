//! Turns detections into reviewable artifacts: labeled page images, one
//! labeled PDF, the labels payload and the list of objects to upload.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::detect::DetectionSummary;
use crate::error::AnnotateError;
use crate::payload::{
    Annotation, AnnotationBody, Artifacts, DocumentLabels, LabelsPayload, PageArtifacts,
    PageLabels, PageSize,
};
use crate::raster::{PageImage, RasterOutput};
use crate::sanitize;
use crate::storage::{DocumentKeys, UploadItem};

pub mod draw;
pub mod glyphs;
pub mod pdf;

pub const LABELED_PDF_NAME: &str = "labeled.pdf";

#[derive(Debug, Clone)]
pub struct LabeledPage {
    pub index: u32,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AnnotatedDocument {
    pub pages: Vec<LabeledPage>,
    pub labeled_pdf: PathBuf,
}

pub struct ArtifactAnnotator {
    dpi: u32,
}

impl ArtifactAnnotator {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    /// Draws every detection onto a copy of its page and assembles the
    /// labeled PDF next to the raster output.
    pub fn annotate(
        &self,
        raster: &RasterOutput,
        detections: &DetectionSummary,
    ) -> Result<AnnotatedDocument, AnnotateError> {
        let _span = tracing::info_span!("annotate", pages = raster.pages.len()).entered();

        let mut labeled = Vec::with_capacity(raster.pages.len());
        for (i, page) in raster.pages.iter().enumerate() {
            let mut img = image::open(&page.path)
                .map_err(|e| AnnotateError::LoadImage {
                    path: page.path.clone(),
                    message: e.to_string(),
                })?
                .to_rgb8();

            for det in detections.per_page.get(i).into_iter().flatten() {
                draw::draw_detection(&mut img, det);
            }

            let out = labeled_page_path(page);
            img.save(&out).map_err(|e| AnnotateError::Write {
                path: out.clone(),
                message: e.to_string(),
            })?;
            labeled.push(LabeledPage {
                index: page.index,
                path: out,
            });
        }

        let paths: Vec<&PathBuf> = labeled.iter().map(|p| &p.path).collect();
        let bytes = pdf::images_to_pdf(&paths, self.dpi)?;
        let labeled_pdf = raster.doc_dir.join(LABELED_PDF_NAME);
        std::fs::write(&labeled_pdf, bytes).map_err(|e| AnnotateError::Write {
            path: labeled_pdf.clone(),
            message: e.to_string(),
        })?;

        Ok(AnnotatedDocument {
            pages: labeled,
            labeled_pdf,
        })
    }
}

fn labeled_page_path(page: &PageImage) -> PathBuf {
    page.path
        .with_file_name(format!("page_{}_labeled.png", page.index))
}

/// Original PDF and raw pages, uploaded before detection runs.
pub fn source_uploads(keys: &DocumentKeys, raster: &RasterOutput) -> Vec<UploadItem> {
    let mut items = Vec::with_capacity(raster.pages.len() + 1);
    items.push(UploadItem::pdf(keys.original_pdf(), raster.original_pdf.clone()));
    for page in &raster.pages {
        items.push(UploadItem::png(keys.page(page.index), page.path.clone()));
    }
    items
}

/// Labeled pages and the labeled PDF.
pub fn labeled_uploads(keys: &DocumentKeys, annotated: &AnnotatedDocument) -> Vec<UploadItem> {
    let mut items = Vec::with_capacity(annotated.pages.len() + 1);
    for page in &annotated.pages {
        items.push(UploadItem::png(keys.labeled_page(page.index), page.path.clone()));
    }
    items.push(UploadItem::pdf(keys.labeled_pdf(), annotated.labeled_pdf.clone()));
    items
}

/// Collects artifact URLs from uploaded key → URL pairs.
pub fn artifacts(keys: &DocumentKeys, pages: &[PageImage], urls: &HashMap<String, String>) -> Artifacts {
    Artifacts {
        original_pdf_url: urls
            .get(&keys.original_pdf())
            .cloned()
            .unwrap_or_default(),
        labeled_pdf_url: urls.get(&keys.labeled_pdf()).cloned(),
        pages: pages
            .iter()
            .map(|page| PageArtifacts {
                page_index: page.index,
                image_url: urls.get(&keys.page(page.index)).cloned().unwrap_or_default(),
                labeled_image_url: urls.get(&keys.labeled_page(page.index)).cloned(),
            })
            .collect(),
    }
}

/// Builds the payload stored on the document row. Annotation numbers run
/// across the whole document in page order.
pub fn build_payload(
    original_name: &str,
    pages: &[PageImage],
    detections: &DetectionSummary,
    artifacts: Artifacts,
) -> LabelsPayload {
    let mut number = 0u32;
    let mut labeled_pages = BTreeMap::new();

    for (i, page) in pages.iter().enumerate() {
        let annotations = detections
            .per_page
            .get(i)
            .into_iter()
            .flatten()
            .map(|det| {
                number += 1;
                Annotation {
                    number,
                    body: AnnotationBody::from(det),
                }
            })
            .collect();

        labeled_pages.insert(
            page.index,
            PageLabels {
                annotations,
                page_size: Some(PageSize {
                    width: page.width,
                    height: page.height,
                }),
            },
        );
    }

    LabelsPayload::challenge(
        sanitize::payload_key(original_name),
        DocumentLabels {
            pages: labeled_pages,
            original_name: Some(original_name.to_string()),
            artifacts: Some(artifacts),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::document_repo::DetectionFlags;
    use crate::detect::{Category, Detection};
    use crate::storage::CONTENT_TYPE_PNG;
    use tempfile::TempDir;

    fn det(category: Category, x: f64) -> Detection {
        Detection {
            category,
            x,
            y: 10.0,
            width: 20.0,
            height: 20.0,
            area: 400.0,
            confidence: 0.9,
        }
    }

    fn raster_with_pages(tmp: &TempDir, n: u32) -> RasterOutput {
        let doc_dir = tmp.path().join("abc123");
        let pages_dir = doc_dir.join("pages");
        std::fs::create_dir_all(&pages_dir).unwrap();
        let original_pdf = doc_dir.join("original.pdf");
        std::fs::write(&original_pdf, b"%PDF-1.5").unwrap();

        let pages = (1..=n)
            .map(|index| {
                let path = pages_dir.join(format!("page_{index}.png"));
                image::RgbImage::from_pixel(100, 80, image::Rgb([255, 255, 255]))
                    .save(&path)
                    .unwrap();
                PageImage {
                    index,
                    path,
                    width: 100,
                    height: 80,
                }
            })
            .collect();

        RasterOutput {
            content_hash: "abc123".to_string(),
            doc_dir,
            original_pdf,
            pages,
        }
    }

    fn summary(per_page: Vec<Vec<Detection>>) -> DetectionSummary {
        DetectionSummary {
            per_page,
            flags: DetectionFlags::default(),
        }
    }

    #[test]
    fn test_annotate_writes_labeled_pages_and_pdf() {
        let tmp = TempDir::new().unwrap();
        let raster = raster_with_pages(&tmp, 2);
        let detections = summary(vec![vec![det(Category::Qr, 5.0)], vec![]]);

        let annotated = ArtifactAnnotator::new(300).annotate(&raster, &detections).unwrap();

        assert_eq!(annotated.pages.len(), 2);
        assert!(annotated.pages[0].path.ends_with("pages/page_1_labeled.png"));
        assert!(annotated.pages[1].path.exists());
        assert_eq!(annotated.labeled_pdf, raster.doc_dir.join("labeled.pdf"));

        let doc = lopdf::Document::load(&annotated.labeled_pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 2);

        let labeled = image::open(&annotated.pages[0].path).unwrap().to_rgb8();
        assert_ne!(*labeled.get_pixel(5, 29), image::Rgb([255, 255, 255]));
    }

    #[test]
    fn test_payload_numbers_annotations_across_pages() {
        let tmp = TempDir::new().unwrap();
        let raster = raster_with_pages(&tmp, 2);
        let detections = summary(vec![
            vec![det(Category::Qr, 1.0), det(Category::Stamp, 40.0)],
            vec![det(Category::Signature, 3.0)],
        ]);

        let payload = build_payload("Contract #7.pdf", &raster.pages, &detections, Artifacts::default());
        let value = payload.to_value().unwrap();

        let doc = &value["Contract__7_pdf"];
        assert_eq!(doc["original_name"], "Contract #7.pdf");
        assert_eq!(doc["page_1"]["annotations"][1]["annotation_2"]["category"], "stamp");
        assert_eq!(doc["page_2"]["annotations"][0]["annotation_3"]["category"], "signature");
        assert_eq!(doc["page_2"]["page_size"]["height"], 80);
    }

    #[test]
    fn test_upload_plans_and_artifacts() {
        let tmp = TempDir::new().unwrap();
        let raster = raster_with_pages(&tmp, 2);
        let keys = DocumentKeys::new(1, 9);

        let source = source_uploads(&keys, &raster);
        assert_eq!(source.len(), 3);
        assert_eq!(source[0].key, "sessions/1/documents/9/original.pdf");
        assert_eq!(source[2].content_type, CONTENT_TYPE_PNG);

        let annotated = ArtifactAnnotator::new(300)
            .annotate(&raster, &summary(vec![vec![], vec![]]))
            .unwrap();
        let labeled = labeled_uploads(&keys, &annotated);
        assert_eq!(labeled.last().unwrap().key, "sessions/1/documents/9/labeled/labeled.pdf");

        let urls: HashMap<String, String> = source
            .iter()
            .chain(labeled.iter())
            .map(|i| (i.key.clone(), format!("u/{}", i.key)))
            .collect();
        let artifacts = artifacts(&keys, &raster.pages, &urls);
        assert_eq!(artifacts.original_pdf_url, "u/sessions/1/documents/9/original.pdf");
        assert_eq!(
            artifacts.labeled_pdf_url.as_deref(),
            Some("u/sessions/1/documents/9/labeled/labeled.pdf")
        );
        assert_eq!(artifacts.pages[1].page_index, 2);
        assert_eq!(
            artifacts.pages[1].labeled_image_url.as_deref(),
            Some("u/sessions/1/documents/9/labeled/page_2.png")
        );
    }
}
