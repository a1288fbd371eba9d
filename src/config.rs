//! Tunable parameters for the segmentation pipeline.
//!
//! Every threshold the stages use lives here instead of in module constants, so
//! a corpus can be tuned from a JSON file and tests can pin exact values. Missing
//! fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::detection::heuristics::{default_rules, ShapeRule};
use crate::error::{Result, SegmentError};

/// How a page is turned into symbol candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationMode {
    /// Detect staves, remove their lines, then segment each staff.
    #[default]
    Staff,
    /// Segment the whole page with an adaptive threshold, no staff handling.
    Direct,
}

/// Which image the symbol crops are cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CropSource {
    /// The staff region after line removal.
    #[default]
    Cleaned,
    /// The untouched staff region.
    Original,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub mode: SegmentationMode,
    pub binarize: BinarizeConfig,
    pub staff: StaffConfig,
    pub line_removal: LineRemovalConfig,
    pub symbols: SymbolConfig,
    pub disambiguation: DisambiguationConfig,
    /// Ordered heuristic rule table, first match wins.
    pub rules: Vec<ShapeRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizeConfig {
    /// Gaussian sigma applied before Otsu on the page. Values <= 0 disable the blur.
    pub blur_sigma: f32,
    /// Gaussian sigma applied before the adaptive threshold in direct mode.
    pub adaptive_blur_sigma: f32,
    /// Half-size of the adaptive mean window (block = 2r + 1).
    pub adaptive_block_radius: u32,
    /// Offset subtracted from the local mean.
    pub adaptive_delta: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffConfig {
    /// Width of the horizontal opening kernel used to isolate long runs.
    pub line_kernel_width: u32,
    pub line_open_iterations: u32,
    /// Opened runs must be strictly wider than this to count as a staff line.
    pub min_line_length: u32,
    /// Largest vertical distance between consecutive lines of one staff.
    pub max_line_gap: u32,
    pub min_lines_in_staff: usize,
    /// Region padding as a multiple of the average line spacing.
    pub padding_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineRemovalConfig {
    /// Normalized row density above which a row belongs to a staff line.
    pub density_threshold: f64,
    pub min_thickness: u32,
    pub max_thickness: u32,
    /// Used when no row passes the density threshold.
    pub fallback_thickness: u32,
    pub horizontal_kernel_divisor: u32,
    pub horizontal_kernel_min: u32,
    pub horizontal_kernel_max: u32,
    /// The vertical kernel spans the region height minus this margin.
    pub vertical_kernel_margin: u32,
    /// Lower bound for the line component length filter.
    pub min_component_floor: u32,
    pub inpaint_radius: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
    /// Boxes with area <= floor do not contribute to the area distribution.
    pub area_floor: u32,
    /// Lower bound applied to mean - k * stddev.
    pub min_area_bound: f64,
    pub stddev_factor: f64,
    /// Relative widening of a collapsed band.
    pub degenerate_widen: f64,
    pub normalized_size: u32,
    /// Letterbox onto a white canvas instead of stretching.
    pub preserve_aspect: bool,
    pub crop_source: CropSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisambiguationConfig {
    pub enabled: bool,
    /// Class whose matches get the secondary line test.
    pub target_class: String,
    /// Class assigned when the crossbar pattern is found.
    pub refined_class: String,
    pub canny_low: f32,
    pub canny_high: f32,
    pub vote_threshold: u32,
    pub suppression_radius: u32,
    pub min_segment_length: u32,
    pub max_segment_gap: u32,
    /// Largest cross-axis extent of an axis-aligned segment.
    pub axis_tolerance: u32,
    /// Smallest along-axis extent of an axis-aligned segment.
    pub min_axis_extent: u32,
    pub min_strokes_per_axis: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            mode: SegmentationMode::default(),
            binarize: BinarizeConfig::default(),
            staff: StaffConfig::default(),
            line_removal: LineRemovalConfig::default(),
            symbols: SymbolConfig::default(),
            disambiguation: DisambiguationConfig::default(),
            rules: default_rules(),
        }
    }
}

impl Default for BinarizeConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 0.5,
            adaptive_blur_sigma: 0.8,
            adaptive_block_radius: 5,
            adaptive_delta: 2,
        }
    }
}

impl Default for StaffConfig {
    fn default() -> Self {
        Self {
            line_kernel_width: 50,
            line_open_iterations: 2,
            min_line_length: 250,
            max_line_gap: 30,
            min_lines_in_staff: 4,
            padding_factor: 1.5,
        }
    }
}

impl Default for LineRemovalConfig {
    fn default() -> Self {
        Self {
            density_threshold: 0.5,
            min_thickness: 1,
            max_thickness: 4,
            fallback_thickness: 2,
            horizontal_kernel_divisor: 10,
            horizontal_kernel_min: 20,
            horizontal_kernel_max: 60,
            vertical_kernel_margin: 3,
            min_component_floor: 20,
            inpaint_radius: 7,
        }
    }
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            area_floor: 10,
            min_area_bound: 20.0,
            stddev_factor: 2.0,
            degenerate_widen: 0.1,
            normalized_size: 64,
            preserve_aspect: false,
            crop_source: CropSource::default(),
        }
    }
}

impl Default for DisambiguationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_class: "flat".to_string(),
            refined_class: "diez".to_string(),
            canny_low: 50.0,
            canny_high: 150.0,
            vote_threshold: 10,
            suppression_radius: 2,
            min_segment_length: 10,
            max_segment_gap: 8,
            axis_tolerance: 5,
            min_axis_extent: 10,
            min_strokes_per_axis: 2,
        }
    }
}

impl SegmenterConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: SegmenterConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range parameters instead of silently clamping them.
    pub fn validate(&self) -> Result<()> {
        let b = &self.binarize;
        if b.adaptive_block_radius == 0 {
            return Err(SegmentError::config("binarize.adaptive_block_radius must be > 0"));
        }
        if !b.blur_sigma.is_finite() || !b.adaptive_blur_sigma.is_finite() {
            return Err(SegmentError::config("blur sigmas must be finite"));
        }

        let s = &self.staff;
        if s.line_kernel_width == 0 {
            return Err(SegmentError::config("staff.line_kernel_width must be > 0"));
        }
        if s.line_open_iterations == 0 {
            return Err(SegmentError::config("staff.line_open_iterations must be > 0"));
        }
        if s.min_lines_in_staff == 0 {
            return Err(SegmentError::config("staff.min_lines_in_staff must be > 0"));
        }
        if !(s.padding_factor >= 0.0) || !s.padding_factor.is_finite() {
            return Err(SegmentError::config("staff.padding_factor must be >= 0"));
        }

        let l = &self.line_removal;
        if !(l.density_threshold > 0.0 && l.density_threshold <= 1.0) {
            return Err(SegmentError::config(
                "line_removal.density_threshold must be in (0, 1]",
            ));
        }
        if l.min_thickness == 0 || l.min_thickness > l.max_thickness {
            return Err(SegmentError::config(format!(
                "line_removal thickness bounds [{}, {}] are invalid",
                l.min_thickness, l.max_thickness
            )));
        }
        if l.fallback_thickness == 0 {
            return Err(SegmentError::config("line_removal.fallback_thickness must be > 0"));
        }
        if l.horizontal_kernel_divisor == 0 {
            return Err(SegmentError::config(
                "line_removal.horizontal_kernel_divisor must be > 0",
            ));
        }
        if l.horizontal_kernel_min == 0 || l.horizontal_kernel_min > l.horizontal_kernel_max {
            return Err(SegmentError::config(format!(
                "line_removal horizontal kernel bounds [{}, {}] are invalid",
                l.horizontal_kernel_min, l.horizontal_kernel_max
            )));
        }
        if l.inpaint_radius == 0 {
            return Err(SegmentError::config("line_removal.inpaint_radius must be > 0"));
        }

        let sym = &self.symbols;
        if sym.normalized_size == 0 {
            return Err(SegmentError::config("symbols.normalized_size must be > 0"));
        }
        if !(sym.stddev_factor >= 0.0) || !(sym.min_area_bound >= 0.0) {
            return Err(SegmentError::config(
                "symbols.stddev_factor and symbols.min_area_bound must be >= 0",
            ));
        }
        if !(sym.degenerate_widen >= 0.0 && sym.degenerate_widen < 1.0) {
            return Err(SegmentError::config("symbols.degenerate_widen must be in [0, 1)"));
        }

        let d = &self.disambiguation;
        if d.enabled {
            if !(d.canny_low >= 0.0 && d.canny_low <= d.canny_high) {
                return Err(SegmentError::config(
                    "disambiguation canny thresholds must satisfy 0 <= low <= high",
                ));
            }
            if d.vote_threshold == 0 || d.min_strokes_per_axis == 0 {
                return Err(SegmentError::config(
                    "disambiguation.vote_threshold and min_strokes_per_axis must be > 0",
                ));
            }
        }

        for rule in &self.rules {
            if rule.class.trim().is_empty() {
                return Err(SegmentError::config("rule class names must not be empty"));
            }
        }

        Ok(())
    }
}
