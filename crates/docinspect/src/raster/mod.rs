//! PDF → ordered page images, keyed by a content hash of the source bytes.
//!
//! Layout under the work root:
//!
//! ```text
//! {work_root}/{hash}/original.pdf
//! {work_root}/{hash}/pages/page_1.png
//! {work_root}/{hash}/pages/page_2.png
//! ```

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::RasterError;

mod render;

pub use render::{PageRenderer, PdftoppmRenderer};

/// Hex characters of the SHA-256 digest kept as the directory key.
pub const HASH_LEN: usize = 16;

const HASH_CHUNK: usize = 8 * 1024;

/// One rendered page. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub index: u32,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    pub fn file_name(&self) -> String {
        format!("page_{}.png", self.index)
    }
}

#[derive(Debug, Clone)]
pub struct RasterOutput {
    pub content_hash: String,
    /// `{work_root}/{hash}`; removed by cleanup once the document is done.
    pub doc_dir: PathBuf,
    pub original_pdf: PathBuf,
    pub pages: Vec<PageImage>,
}

pub struct Rasterizer {
    renderer: Arc<dyn PageRenderer>,
    dpi: u32,
}

impl Rasterizer {
    pub fn new(renderer: Arc<dyn PageRenderer>, dpi: u32) -> Self {
        Self { renderer, dpi }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    pub fn rasterize(&self, pdf_path: &Path, work_root: &Path) -> Result<RasterOutput, RasterError> {
        let content_hash = content_hash(pdf_path)?;
        let _span = tracing::info_span!("raster", hash = %content_hash).entered();

        let bytes = std::fs::read(pdf_path).map_err(|e| RasterError::ReadPdf {
            path: pdf_path.to_path_buf(),
            source: e,
        })?;
        let page_count = page_count(&bytes)?;

        let doc_dir = work_root.join(&content_hash);
        let pages_dir = doc_dir.join("pages");
        std::fs::create_dir_all(&pages_dir).map_err(|e| RasterError::Io {
            path: pages_dir.clone(),
            source: e,
        })?;

        let original_pdf = doc_dir.join("original.pdf");
        std::fs::write(&original_pdf, &bytes).map_err(|e| RasterError::Io {
            path: original_pdf.clone(),
            source: e,
        })?;

        let mut pages = Vec::with_capacity(page_count as usize);
        for index in 1..=page_count {
            let path = pages_dir.join(format!("page_{}.png", index));
            self.renderer
                .render_page(&original_pdf, index, self.dpi, &path)?;
            let (width, height) =
                image::image_dimensions(&path).map_err(|e| RasterError::Image {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            pages.push(PageImage {
                index,
                path,
                width,
                height,
            });
        }

        tracing::debug!(pages = pages.len(), dpi = self.dpi, "Rasterized document");

        Ok(RasterOutput {
            content_hash,
            doc_dir,
            original_pdf,
            pages,
        })
    }
}

/// SHA-256 of the file, hex-encoded and truncated to [`HASH_LEN`] characters.
pub fn content_hash(path: &Path) -> Result<String, RasterError> {
    let read_err = |e| RasterError::ReadPdf {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(read_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    Ok(digest)
}

pub fn page_count(pdf_bytes: &[u8]) -> Result<u32, RasterError> {
    let doc = lopdf::Document::load_mem(pdf_bytes).map_err(|e| RasterError::Parse(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}
