use std::path::Path;
use std::process::Command;

use crate::error::RasterError;

/// Renders a single PDF page to a PNG file.
pub trait PageRenderer: Send + Sync {
    /// Renders 1-based `page` of `pdf` at `dpi` and writes the PNG to `out`.
    fn render_page(&self, pdf: &Path, page: u32, dpi: u32, out: &Path) -> Result<(), RasterError>;
}

/// Renders pages with `pdftoppm` from poppler-utils.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdftoppmRenderer;

impl PageRenderer for PdftoppmRenderer {
    fn render_page(&self, pdf: &Path, page: u32, dpi: u32, out: &Path) -> Result<(), RasterError> {
        let _span = tracing::debug_span!("raster.pdftoppm", page).entered();

        // -singlefile writes exactly `<prefix>.png`, no page-number suffix.
        let prefix = out.with_extension("");
        let page_arg = page.to_string();

        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-singlefile")
            .args(["-r", &dpi.to_string()])
            .args(["-f", &page_arg, "-l", &page_arg])
            .arg(pdf)
            .arg(&prefix)
            .output()
            .map_err(|e| RasterError::Render {
                page,
                message: format!(
                    "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                    e
                ),
            })?;

        if !output.status.success() {
            return Err(RasterError::Render {
                page,
                message: format!(
                    "pdftoppm failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let produced = prefix.with_extension("png");
        if produced != out {
            std::fs::rename(&produced, out).map_err(|e| RasterError::Io {
                path: out.to_path_buf(),
                source: e,
            })?;
        }
        if !out.exists() {
            return Err(RasterError::Render {
                page,
                message: "pdftoppm produced no output".to_string(),
            });
        }

        Ok(())
    }
}
