use image::GrayImage;
use std::sync::Arc;

use crate::config::{BinarizeConfig, StaffConfig};
use crate::error::Result;
use crate::imaging::{Binarizer, ImageOps, Kernel};
use crate::models::{LineSegment, StaffSystem};

/// Finds horizontal staff lines on a page and groups them into systems.
pub struct StaffLineDetector {
    ops: Arc<dyn ImageOps>,
    binarizer: Binarizer,
    config: StaffConfig,
}

impl StaffLineDetector {
    pub fn new(ops: Arc<dyn ImageOps>, binarize: &BinarizeConfig, config: StaffConfig) -> Self {
        Self {
            ops,
            binarizer: Binarizer::otsu(binarize.blur_sigma),
            config,
        }
    }

    /// Ink mask of the page as seen by the line search.
    pub fn binarize(&self, gray: &GrayImage) -> GrayImage {
        self.ops.binarize(gray, &self.binarizer)
    }

    /// Long horizontal runs of an ink mask, in contour discovery order.
    pub fn detect_lines(&self, mask: &GrayImage) -> Result<Vec<LineSegment>> {
        let kernel = Kernel::rect(self.config.line_kernel_width, 1)?;
        let opened = self.ops.open(mask, kernel, self.config.line_open_iterations);

        Ok(self
            .ops
            .external_boxes(&opened)
            .into_iter()
            .filter(|b| b.width > self.config.min_line_length)
            .map(|b| LineSegment {
                x_start: b.x,
                x_end: b.right(),
                y: b.y,
            })
            .collect())
    }

    /// Staff systems of a grayscale page, top to bottom.
    pub fn detect(&self, gray: &GrayImage) -> Result<Vec<StaffSystem>> {
        let mask = self.binarize(gray);
        let lines = self.detect_lines(&mask)?;
        let systems = group_lines(lines, gray.width(), &self.config);
        tracing::debug!(
            "{} staff system(s) from a {}x{} page",
            systems.len(),
            gray.width(),
            gray.height()
        );
        Ok(systems)
    }
}

/// Greedy single-pass grouping of lines by vertical proximity.
///
/// Lines are stably sorted by `y`; a line joins the open group when it is at
/// most `max_line_gap` below the previous one. Groups with fewer than
/// `min_lines_in_staff` lines are dropped.
pub fn group_lines(
    mut lines: Vec<LineSegment>,
    image_width: u32,
    config: &StaffConfig,
) -> Vec<StaffSystem> {
    lines.sort_by_key(|l| l.y);

    let mut systems = Vec::new();
    let mut current: Vec<LineSegment> = Vec::new();

    for line in lines {
        if let Some(prev) = current.last() {
            if line.y.abs_diff(prev.y) > config.max_line_gap {
                let group = std::mem::take(&mut current);
                if let Some(system) = close_group(group, image_width, config) {
                    systems.push(system);
                }
            }
        }
        current.push(line);
    }
    if let Some(system) = close_group(current, image_width, config) {
        systems.push(system);
    }

    systems
}

fn close_group(
    lines: Vec<LineSegment>,
    image_width: u32,
    config: &StaffConfig,
) -> Option<StaffSystem> {
    if lines.len() < config.min_lines_in_staff {
        if !lines.is_empty() {
            tracing::trace!("dropping group of {} line(s)", lines.len());
        }
        return None;
    }

    let top = lines.first()?.y;
    let bottom = lines.last()?.y;
    let avg_spacing = if lines.len() > 1 {
        (bottom - top) as f64 / (lines.len() - 1) as f64
    } else {
        0.0
    };

    Some(StaffSystem {
        lines,
        top,
        bottom,
        left: 0,
        right: image_width.saturating_sub(1),
        avg_spacing,
    })
}
