use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use super::glyphs::{glyph, text_width, GLYPH_HEIGHT, GLYPH_SPACING, GLYPH_WIDTH};
use crate::detect::{Category, Detection};

pub const OUTLINE_WIDTH: u32 = 3;
const LABEL_SCALE: u32 = 2;
const LABEL_PADDING: u32 = 3;
const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

pub fn category_color(category: Category) -> Rgb<u8> {
    match category {
        Category::Qr => Rgb([0, 90, 255]),
        Category::Signature => Rgb([0, 170, 0]),
        Category::Stamp => Rgb([220, 0, 0]),
    }
}

/// `QR 0.87`
pub fn label_text(det: &Detection) -> String {
    format!(
        "{} {:.2}",
        det.category.as_str().to_ascii_uppercase(),
        det.confidence
    )
}

/// Outlines the box and puts its label on a filled tab above it, or just
/// inside the top edge when there is no room above.
pub fn draw_detection(img: &mut RgbImage, det: &Detection) {
    let color = category_color(det.category);
    let x = det.x.floor().max(0.0) as u32;
    let y = det.y.floor().max(0.0) as u32;
    let right = (det.x + det.width).ceil().max(0.0) as u32;
    let bottom = (det.y + det.height).ceil().max(0.0) as u32;
    let w = right.saturating_sub(x).max(1);
    let h = bottom.saturating_sub(y).max(1);

    draw_outline(img, x, y, w, h, OUTLINE_WIDTH, color);

    let text = label_text(det);
    let tab_w = text_width(&text, LABEL_SCALE) + 2 * LABEL_PADDING;
    let tab_h = GLYPH_HEIGHT * LABEL_SCALE + 2 * LABEL_PADDING;
    let tab_y = if y >= tab_h { y - tab_h } else { y };

    fill_rect(img, x, tab_y, tab_w, tab_h, color);
    draw_text(
        img,
        x + LABEL_PADDING,
        tab_y + LABEL_PADDING,
        &text,
        LABEL_SCALE,
        LABEL_TEXT,
    );
}

/// Outline `thickness` pixels wide, drawn inwards from the box edge.
pub fn draw_outline(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, thickness: u32, color: Rgb<u8>) {
    for inset in 0..thickness.max(1) {
        let inner_w = w.saturating_sub(2 * inset);
        let inner_h = h.saturating_sub(2 * inset);
        if inner_w == 0 || inner_h == 0 {
            break;
        }
        let rect = Rect::at((x + inset) as i32, (y + inset) as i32).of_size(inner_w, inner_h);
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Fills the rectangle, clipped to the image. Empty rectangles draw nothing.
pub fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    if w == 0 || h == 0 {
        return;
    }
    draw_filled_rect_mut(img, Rect::at(x as i32, y as i32).of_size(w, h), color);
}

pub fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
    let mut cursor = x;
    for c in text.chars() {
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    fill_rect(
                        img,
                        cursor + col * scale,
                        y + row as u32 * scale,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
        cursor += (GLYPH_WIDTH + GLYPH_SPACING) * scale;
    }
}
