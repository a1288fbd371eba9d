use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};

pub const INK: Luma<u8> = Luma([0]);
pub const PAPER: Luma<u8> = Luma([255]);

/// Five 2px lines, 16px apart, the first at y = 60.
pub const STAFF_TOP: u32 = 60;
pub const STAFF_SPACING: u32 = 16;
pub const LINE_THICKNESS: u32 = 2;

/// Filled 20x20 square across the second and third lines (y 76 and 92),
/// centred between them.
pub const SQUARE_X: u32 = 290;
pub const SQUARE_Y: u32 = 74;
pub const SQUARE_SIZE: u32 = 20;

pub fn blank_page(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, PAPER)
}

pub fn fill_rect(img: &mut GrayImage, x: u32, y: u32, w: u32, h: u32) {
    for py in y..(y + h).min(img.height()) {
        for px in x..(x + w).min(img.width()) {
            img.put_pixel(px, py, INK);
        }
    }
}

/// Draw `count` horizontal lines from `x0` to `x1` inclusive.
pub fn draw_staff(img: &mut GrayImage, top: u32, spacing: u32, count: u32, x0: u32, x1: u32) {
    for i in 0..count {
        fill_rect(img, x0, top + i * spacing, x1 - x0 + 1, LINE_THICKNESS);
    }
}

/// 600x200 page with one five-line staff and a square glyph on it.
pub fn staff_page_with_square() -> GrayImage {
    let mut page = blank_page(600, 200);
    draw_staff(&mut page, STAFF_TOP, STAFF_SPACING, 5, 20, 579);
    fill_rect(&mut page, SQUARE_X, SQUARE_Y, SQUARE_SIZE, SQUARE_SIZE);
    page
}

/// 600x400 page with two staves far enough apart to stay separate.
pub fn two_staff_page() -> GrayImage {
    let mut page = blank_page(600, 400);
    draw_staff(&mut page, 60, STAFF_SPACING, 5, 20, 579);
    draw_staff(&mut page, 260, STAFF_SPACING, 5, 20, 579);
    page
}

/// Sharp-like crop: two vertical strokes crossed by two horizontal bars.
pub fn crosshatch_crop() -> GrayImage {
    let mut crop = blank_page(29, 60);
    fill_rect(&mut crop, 8, 2, 4, 56);
    fill_rect(&mut crop, 17, 2, 4, 56);
    fill_rect(&mut crop, 2, 20, 25, 4);
    fill_rect(&mut crop, 2, 36, 25, 4);
    crop
}

/// Two staggered vertical strokes and nothing horizontal.
pub fn vertical_strokes_crop() -> GrayImage {
    let mut crop = blank_page(29, 60);
    fill_rect(&mut crop, 8, 2, 4, 24);
    fill_rect(&mut crop, 17, 36, 4, 22);
    crop
}

pub fn save_png(dir: &Path, name: &str, img: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    img.save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test image");
    path
}
