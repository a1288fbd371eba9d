//! Staff line removal for a single staff region.
//!
//! Lines are isolated with two directional openings, filtered down to long
//! components, painted over from their surroundings and the result is
//! re-thresholded. A short round of closings and openings then repairs glyph
//! strokes the lines used to cross.

use image::GrayImage;
use std::sync::Arc;

use crate::config::LineRemovalConfig;
use crate::error::Result;
use crate::imaging::threshold::invert;
use crate::imaging::{Binarizer, ImageOps, Kernel};

/// Output of [`LineRemover::remove`].
#[derive(Debug, Clone)]
pub struct CleanedRegion {
    /// Ink = 255 mask without staff lines.
    pub mask: GrayImage,
    /// Black glyphs on white, same content as `mask`.
    pub image: GrayImage,
    pub line_thickness: u32,
}

pub struct LineRemover {
    ops: Arc<dyn ImageOps>,
    config: LineRemovalConfig,
}

impl LineRemover {
    pub fn new(ops: Arc<dyn ImageOps>, config: LineRemovalConfig) -> Self {
        Self { ops, config }
    }

    /// Median height of the dense row bands of an ink mask.
    pub fn estimate_line_thickness(&self, mask: &GrayImage) -> u32 {
        let c = &self.config;
        let counts: Vec<u32> = mask
            .rows()
            .map(|row| row.filter(|p| p[0] > 0).count() as u32)
            .collect();

        let max = counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return c.fallback_thickness;
        }

        let mut runs = Vec::new();
        let mut run = 0u32;
        for &count in &counts {
            if count as f64 / max as f64 > c.density_threshold {
                run += 1;
            } else if run > 0 {
                runs.push(run);
                run = 0;
            }
        }
        if run > 0 {
            runs.push(run);
        }

        if runs.is_empty() {
            return c.fallback_thickness;
        }

        runs.sort_unstable();
        let mid = runs.len() / 2;
        let median = if runs.len() % 2 == 0 {
            (runs[mid - 1] + runs[mid]) / 2
        } else {
            runs[mid]
        };
        median.clamp(c.min_thickness, c.max_thickness)
    }

    /// Length of the horizontal opening kernel for a region `width` pixels wide.
    pub fn horizontal_kernel_length(&self, width: u32) -> u32 {
        let c = &self.config;
        (width / c.horizontal_kernel_divisor).clamp(c.horizontal_kernel_min, c.horizontal_kernel_max)
    }

    /// Mask of the long horizontal and vertical structures to paint over.
    pub fn line_mask(&self, mask: &GrayImage, thickness: u32) -> Result<GrayImage> {
        let c = &self.config;
        let (width, height) = mask.dimensions();
        let horiz = self.horizontal_kernel_length(width);
        let vert = height.saturating_sub(c.vertical_kernel_margin).max(1);

        let horizontal = self.ops.open(mask, Kernel::rect(horiz, thickness)?, 1);
        let vertical = self.ops.open(mask, Kernel::rect(thickness, vert)?, 1);
        let combined = crate::imaging::morphology::union(&horizontal, &vertical);

        let min_length = c.min_component_floor.max(horiz / 4);
        let labeled = self.ops.connected_components(&combined);
        Ok(labeled.mask_where(|comp| {
            comp.bbox.width > min_length || comp.bbox.height > min_length
        }))
    }

    /// Remove staff lines from a grayscale staff region.
    pub fn remove(&self, region: &GrayImage) -> Result<CleanedRegion> {
        let c = &self.config;
        let otsu = Binarizer::otsu(0.0);

        let binary = self.ops.binarize(region, &otsu);
        let t = self.estimate_line_thickness(&binary);
        let lines = self.line_mask(&binary, t)?;

        let inpainted = self.ops.inpaint(region, &lines, c.inpaint_radius);
        let rebinarized = self.ops.binarize(&inpainted, &otsu);

        let mut cleaned = self.ops.close(&rebinarized, Kernel::rect(1, t.max(2))?);
        cleaned = self.ops.close(&cleaned, Kernel::rect(t.max(2), t.max(3))?);
        cleaned = self.ops.open(&cleaned, Kernel::rect(1, (2 * t).max(3))?, 1);
        cleaned = self.ops.erode(&cleaned, Kernel::rect(2, 2)?);

        tracing::debug!(
            "line removal on {}x{} region: thickness {}",
            region.width(),
            region.height(),
            t
        );

        Ok(CleanedRegion {
            image: invert(&cleaned),
            mask: cleaned,
            line_thickness: t,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ImageprocOps;
    use image::Luma;

    fn remover() -> LineRemover {
        LineRemover::new(Arc::new(ImageprocOps), LineRemovalConfig::default())
    }

    fn mask_with_rows(width: u32, height: u32, rows: &[u32]) -> GrayImage {
        GrayImage::from_fn(width, height, |_, y| {
            if rows.contains(&y) { Luma([255]) } else { Luma([0]) }
        })
    }

    #[test]
    fn thickness_is_median_run_length() {
        let mask = mask_with_rows(100, 60, &[5, 6, 7, 20, 21, 30, 31, 45, 46, 47]);
        // Runs 3, 2, 2, 3 -> (2 + 3) / 2 = 2.
        assert_eq!(remover().estimate_line_thickness(&mask), 2);
    }

    #[test]
    fn thickness_is_clamped() {
        let rows: Vec<u32> = (10..20).collect();
        let mask = mask_with_rows(50, 40, &rows);
        assert_eq!(remover().estimate_line_thickness(&mask), 4);
    }

    #[test]
    fn empty_mask_uses_fallback() {
        assert_eq!(remover().estimate_line_thickness(&GrayImage::new(20, 20)), 2);
    }

    #[test]
    fn horizontal_kernel_is_clamped() {
        let r = remover();
        assert_eq!(r.horizontal_kernel_length(100), 20);
        assert_eq!(r.horizontal_kernel_length(400), 40);
        assert_eq!(r.horizontal_kernel_length(2000), 60);
    }

    #[test]
    fn lines_are_removed_and_glyph_survives() {
        let mut region = GrayImage::from_pixel(300, 80, Luma([255]));
        for y in [20u32, 21, 36, 37, 52, 53] {
            for x in 10..290 {
                region.put_pixel(x, y, Luma([0]));
            }
        }
        for y in 30..46 {
            for x in 140..156 {
                region.put_pixel(x, y, Luma([0]));
            }
        }

        let cleaned = remover().remove(&region).unwrap();
        assert_eq!(cleaned.line_thickness, 2);
        for y in [20u32, 21, 52, 53] {
            assert!((10..130).all(|x| cleaned.mask.get_pixel(x, y)[0] == 0));
        }
        assert_eq!(cleaned.mask.get_pixel(148, 38)[0], 255);
        assert_eq!(cleaned.image.get_pixel(148, 38)[0], 0);
    }
}
