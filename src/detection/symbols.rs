use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use std::sync::Arc;

use crate::config::SymbolConfig;
use crate::imaging::ImageOps;
use crate::models::BoundingBox;

/// Accepted box areas, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaBand {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
}

impl AreaBand {
    pub fn contains(&self, area: u64) -> bool {
        let area = area as f64;
        self.min <= area && area <= self.max
    }
}

/// Statistical band around the typical glyph area.
///
/// Returns `None` when no box is larger than `area_floor`.
pub fn area_band(boxes: &[BoundingBox], config: &SymbolConfig) -> Option<AreaBand> {
    let areas: Vec<f64> = boxes
        .iter()
        .map(|b| b.area())
        .filter(|&a| a > config.area_floor as u64)
        .map(|a| a as f64)
        .collect();
    if areas.is_empty() {
        return None;
    }

    let n = areas.len() as f64;
    let mean = areas.iter().sum::<f64>() / n;
    let variance = areas.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let k = config.stddev_factor;
    let mut min = (mean - k * stddev).max(config.min_area_bound);
    let mut max = mean + k * stddev;
    if min == max {
        min *= 1.0 - config.degenerate_widen;
        max *= 1.0 + config.degenerate_widen;
    }

    Some(AreaBand {
        min,
        max,
        mean,
        stddev,
    })
}

/// Finds glyph boxes in a cleaned mask and cuts normalized crops.
pub struct SymbolSegmenter {
    ops: Arc<dyn ImageOps>,
    config: SymbolConfig,
}

impl SymbolSegmenter {
    pub fn new(ops: Arc<dyn ImageOps>, config: SymbolConfig) -> Self {
        Self { ops, config }
    }

    pub fn config(&self) -> &SymbolConfig {
        &self.config
    }

    /// Outer contour boxes of the mask, unfiltered.
    pub fn find_boxes(&self, mask: &GrayImage) -> Vec<BoundingBox> {
        self.ops.external_boxes(mask)
    }

    /// Keep boxes inside the area band, ordered left to right.
    pub fn filter_boxes(&self, boxes: Vec<BoundingBox>) -> Vec<BoundingBox> {
        let Some(band) = area_band(&boxes, &self.config) else {
            return Vec::new();
        };
        tracing::trace!(
            "area band [{:.1}, {:.1}] (mean {:.1}, stddev {:.1})",
            band.min,
            band.max,
            band.mean,
            band.stddev
        );

        let mut accepted: Vec<BoundingBox> = boxes
            .into_iter()
            .filter(|b| band.contains(b.area()))
            .collect();
        accepted.sort_by_key(|b| (b.x, b.y));
        accepted
    }

    pub fn segment(&self, mask: &GrayImage) -> Vec<BoundingBox> {
        let boxes = self.find_boxes(mask);
        let total = boxes.len();
        let accepted = self.filter_boxes(boxes);
        tracing::debug!("{} of {} contour box(es) accepted", accepted.len(), total);
        accepted
    }

    /// Cut `bbox` out of `image`, clipped to its bounds.
    pub fn crop(&self, image: &GrayImage, bbox: &BoundingBox) -> GrayImage {
        let x = bbox.x.min(image.width());
        let y = bbox.y.min(image.height());
        let w = bbox.width.min(image.width() - x);
        let h = bbox.height.min(image.height() - y);
        imageops::crop_imm(image, x, y, w, h).to_image()
    }

    /// Resize a crop to the classifier's square input.
    pub fn normalize(&self, crop: &GrayImage) -> GrayImage {
        let size = self.config.normalized_size;
        if crop.width() == 0 || crop.height() == 0 {
            return GrayImage::from_pixel(size, size, Luma([255u8]));
        }
        if !self.config.preserve_aspect {
            return imageops::resize(crop, size, size, FilterType::Triangle);
        }

        let (width, height) = crop.dimensions();
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let scaled_w = ((width as f32 * scale) as u32).clamp(1, size);
        let scaled_h = ((height as f32 * scale) as u32).clamp(1, size);

        let scaled = imageops::resize(crop, scaled_w, scaled_h, FilterType::CatmullRom);

        // Center on a white canvas
        let mut canvas = GrayImage::from_pixel(size, size, Luma([255u8]));
        let offset_x = (size - scaled_w) / 2;
        let offset_y = (size - scaled_h) / 2;
        imageops::overlay(&mut canvas, &scaled, offset_x.into(), offset_y.into());
        canvas
    }
}
