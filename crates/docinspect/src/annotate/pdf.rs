use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use lopdf::{dictionary, Document, Object, Stream};

use crate::error::AnnotateError;

const JPEG_QUALITY: u8 = 90;

/// Builds a PDF with one page per image, in order. Each page is exactly the
/// size of its image at `dpi` (`pixels × 72 / dpi` points).
pub fn images_to_pdf<P: AsRef<Path>>(images: &[P], dpi: u32) -> Result<Vec<u8>, AnnotateError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for path in images {
        let path = path.as_ref();
        let img = image::open(path).map_err(|e| AnnotateError::LoadImage {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let (width, height) = img.dimensions();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .encode_image(&img.to_rgb8())
            .map_err(|e| AnnotateError::Pdf(format!("Failed to encode page image: {}", e)))?;

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let resources_id = doc.add_object(dictionary! {
            "XObject" => dictionary! {
                "Im1" => image_id,
            },
        });

        let page_w = points(width, dpi);
        let page_h = points(height, dpi);
        let content = format!("q\n{:.2} 0 0 {:.2} 0 0 cm\n/Im1 Do\nQ\n", page_w, page_h);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(page_w as f32), Object::Real(page_h as f32)],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| AnnotateError::Pdf(e.to_string()))?;
    Ok(buffer)
}

fn points(pixels: u32, dpi: u32) -> f64 {
    pixels as f64 * 72.0 / dpi.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_pixel(w, h, image::Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_points_conversion() {
        assert_eq!(points(300, 300), 72.0);
        assert_eq!(points(2550, 300), 612.0);
    }

    #[test]
    fn test_one_page_per_image_in_order() {
        let tmp = TempDir::new().unwrap();
        let a = write_png(tmp.path(), "a.png", 600, 300);
        let b = write_png(tmp.path(), "b.png", 300, 600);

        let bytes = images_to_pdf(&[a, b], 300).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let first = doc.get_dictionary(pages[&1]).unwrap();
        let media_box = first.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_float().unwrap(), 144.0);
        assert_eq!(media_box[3].as_float().unwrap(), 72.0);
    }

    #[test]
    fn test_no_images_gives_empty_document() {
        let bytes = images_to_pdf::<&Path>(&[], 300).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().is_empty());
    }

    #[test]
    fn test_missing_image_is_load_error() {
        let err = images_to_pdf(&[Path::new("/nonexistent/page.png")], 300).unwrap_err();
        assert!(matches!(err, AnnotateError::LoadImage { .. }));
    }
}
