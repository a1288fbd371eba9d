use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::{box_filter, gaussian_blur_f32};
use std::borrow::Cow;

/// Global or local threshold selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdMethod {
    Otsu,
    /// Ink where the pixel is at most the mean of its `(2r+1)²` window minus `delta`.
    AdaptiveMean { block_radius: u32, delta: i32 },
}

/// Blur + threshold + invert, producing an ink-as-foreground mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binarizer {
    /// Gaussian sigma; values <= 0 skip the blur.
    pub blur_sigma: f32,
    pub method: ThresholdMethod,
}

impl Binarizer {
    pub fn otsu(blur_sigma: f32) -> Self {
        Self {
            blur_sigma,
            method: ThresholdMethod::Otsu,
        }
    }

    pub fn adaptive(blur_sigma: f32, block_radius: u32, delta: i32) -> Self {
        Self {
            blur_sigma,
            method: ThresholdMethod::AdaptiveMean {
                block_radius,
                delta,
            },
        }
    }

    pub fn binarize(&self, gray: &GrayImage) -> GrayImage {
        // Checked before blurring, which may leave rounding noise on flat input.
        if is_uniform(gray) {
            return GrayImage::new(gray.width(), gray.height());
        }

        let source = if self.blur_sigma > 0.0 && gray.width() > 0 && gray.height() > 0 {
            Cow::Owned(gaussian_blur_f32(gray, self.blur_sigma))
        } else {
            Cow::Borrowed(gray)
        };

        match self.method {
            ThresholdMethod::Otsu => otsu_inverted(&source),
            ThresholdMethod::AdaptiveMean {
                block_radius,
                delta,
            } => adaptive_mean_inverted(&source, block_radius, delta),
        }
    }
}

/// Otsu threshold with ink (pixels at or below the level) set to 255.
///
/// A uniform image has no ink.
pub fn otsu_inverted(gray: &GrayImage) -> GrayImage {
    if is_uniform(gray) {
        return GrayImage::new(gray.width(), gray.height());
    }
    let level = otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Local mean threshold with ink set to 255.
pub fn adaptive_mean_inverted(gray: &GrayImage, block_radius: u32, delta: i32) -> GrayImage {
    if is_uniform(gray) {
        return GrayImage::new(gray.width(), gray.height());
    }
    let mean = box_filter(gray, block_radius, block_radius);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y)[0] as i32;
        let local = mean.get_pixel(x, y)[0] as i32;
        if value <= local - delta {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Swap ink and background.
pub fn invert(mask: &GrayImage) -> GrayImage {
    let mut inverted = mask.clone();
    image::imageops::invert(&mut inverted);
    inverted
}

fn is_uniform(gray: &GrayImage) -> bool {
    let mut pixels = gray.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p[0] == first[0]),
        None => true,
    }
}
