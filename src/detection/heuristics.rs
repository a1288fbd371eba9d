//! Shape-based pre-classification of symbol crops.
//!
//! A rule table maps bounding-box geometry to a class name. Rules are tried in
//! order and the first one whose constraints all hold wins. Boxes that match
//! the flat rule get a second look with a Hough segment test, because sharps
//! share its proportions but carry two horizontal crossbars.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::config::DisambiguationConfig;
use crate::imaging::hough::{detect_segments, SegmentOptions};
use crate::models::{BoundingBox, UNKNOWN_LABEL};

/// One geometric predicate. All bounds are exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// `min < w / h < max`.
    Aspect { min: f64, max: f64 },
    Width {
        #[serde(default)]
        min: Option<u32>,
        #[serde(default)]
        max: Option<u32>,
    },
    Height {
        #[serde(default)]
        min: Option<u32>,
        #[serde(default)]
        max: Option<u32>,
    },
    /// `h > ratio * w`.
    TallerThan { ratio: f64 },
    /// `w > ratio * h`.
    WiderThan { ratio: f64 },
}

impl Constraint {
    pub fn holds(&self, width: u32, height: u32) -> bool {
        let (w, h) = (width as f64, height as f64);
        match *self {
            Constraint::Aspect { min, max } => {
                if height == 0 {
                    return false;
                }
                let aspect = w / h;
                min < aspect && aspect < max
            }
            Constraint::Width { min, max } => within(width, min, max),
            Constraint::Height { min, max } => within(height, min, max),
            Constraint::TallerThan { ratio } => h > ratio * w,
            Constraint::WiderThan { ratio } => w > ratio * h,
        }
    }
}

fn within(value: u32, min: Option<u32>, max: Option<u32>) -> bool {
    min.is_none_or(|m| value > m) && max.is_none_or(|m| value < m)
}

/// A named class and the constraints a box must satisfy to get it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRule {
    pub class: String,
    pub constraints: Vec<Constraint>,
}

impl ShapeRule {
    pub fn new(class: impl Into<String>, constraints: Vec<Constraint>) -> Self {
        Self {
            class: class.into(),
            constraints,
        }
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.constraints.iter().all(|c| c.holds(width, height))
    }
}

fn aspect(min: f64, max: f64) -> Constraint {
    Constraint::Aspect { min, max }
}

fn width(min: u32, max: u32) -> Constraint {
    Constraint::Width {
        min: Some(min),
        max: Some(max),
    }
}

fn height(min: u32, max: u32) -> Constraint {
    Constraint::Height {
        min: Some(min),
        max: Some(max),
    }
}

/// The built-in table, 14 classes.
///
/// `note_head` sits before `natural` and `dot` so that a filled head which
/// lost a pixel row to line removal is not taken for a dot.
pub fn default_rules() -> Vec<ShapeRule> {
    vec![
        ShapeRule::new("diez", vec![aspect(0.6, 1.4), width(50, 700), height(50, 800)]),
        ShapeRule::new("double_sharp", vec![aspect(1.3, 2.0), width(30, 80), height(20, 60)]),
        ShapeRule::new(
            "flat",
            vec![Constraint::TallerThan { ratio: 1.0 }, width(10, 30), height(40, 100)],
        ),
        ShapeRule::new("note_head", vec![aspect(0.7, 1.3), width(15, 40), height(15, 40)]),
        ShapeRule::new("natural", vec![aspect(0.7, 1.3), width(20, 60), height(20, 60)]),
        ShapeRule::new(
            "dot",
            vec![
                Constraint::Width {
                    min: None,
                    max: Some(20),
                },
                Constraint::Height {
                    min: None,
                    max: Some(20),
                },
            ],
        ),
        ShapeRule::new(
            "pause_quarter",
            vec![Constraint::TallerThan { ratio: 1.0 }, width(10, 30), height(30, 70)],
        ),
        ShapeRule::new(
            "pause_whole_half",
            vec![Constraint::WiderThan { ratio: 1.0 }, width(30, 70), height(10, 30)],
        ),
        ShapeRule::new(
            "clef_g",
            vec![Constraint::TallerThan { ratio: 2.0 }, width(20, 50), height(60, 150)],
        ),
        ShapeRule::new("clef_f", vec![aspect(0.7, 1.3), width(30, 70), height(30, 70)]),
        ShapeRule::new(
            "tail_eighth",
            vec![Constraint::TallerThan { ratio: 2.0 }, width(5, 20), height(30, 80)],
        ),
        ShapeRule::new(
            "tail_sixteenth",
            vec![Constraint::TallerThan { ratio: 2.0 }, width(5, 20), height(50, 120)],
        ),
        ShapeRule::new(
            "barline",
            vec![
                Constraint::Width {
                    min: None,
                    max: Some(8),
                },
                Constraint::Height {
                    min: Some(40),
                    max: None,
                },
            ],
        ),
        ShapeRule::new("time_signature", vec![aspect(0.7, 1.3), width(15, 40), height(15, 40)]),
    ]
}

/// Ordered rule table plus the flat/sharp line test.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    rules: Vec<ShapeRule>,
    disambiguation: DisambiguationConfig,
}

impl HeuristicClassifier {
    pub fn new(rules: Vec<ShapeRule>, disambiguation: DisambiguationConfig) -> Self {
        Self {
            rules,
            disambiguation,
        }
    }

    pub fn rules(&self) -> &[ShapeRule] {
        &self.rules
    }

    /// First rule whose constraints all hold.
    pub fn match_rule(&self, width: u32, height: u32) -> Option<&ShapeRule> {
        self.rules.iter().find(|r| r.matches(width, height))
    }

    /// Class for a box. `crop` is the un-normalized glyph image and is only
    /// inspected when the box first matches the disambiguation target.
    pub fn classify(&self, bbox: &BoundingBox, crop: &GrayImage) -> String {
        let Some(rule) = self.match_rule(bbox.width, bbox.height) else {
            return UNKNOWN_LABEL.to_string();
        };

        let d = &self.disambiguation;
        if d.enabled && rule.class == d.target_class && self.has_crossbar_pattern(crop) {
            tracing::debug!(
                "{}x{} box at ({}, {}) reclassified {} -> {}",
                bbox.width,
                bbox.height,
                bbox.x,
                bbox.y,
                d.target_class,
                d.refined_class
            );
            return d.refined_class.clone();
        }

        rule.class.clone()
    }

    /// True when the crop holds enough near-vertical and near-horizontal
    /// strokes to look like a sharp.
    pub fn has_crossbar_pattern(&self, crop: &GrayImage) -> bool {
        let d = &self.disambiguation;
        let segments = detect_segments(
            crop,
            &SegmentOptions {
                canny_low: d.canny_low,
                canny_high: d.canny_high,
                vote_threshold: d.vote_threshold,
                suppression_radius: d.suppression_radius,
                min_length: d.min_segment_length,
                max_gap: d.max_segment_gap,
            },
        );

        let vertical = segments
            .iter()
            .filter(|s| s.dx() < d.axis_tolerance && s.dy() > d.min_axis_extent)
            .count();
        let horizontal = segments
            .iter()
            .filter(|s| s.dy() < d.axis_tolerance && s.dx() > d.min_axis_extent)
            .count();

        vertical >= d.min_strokes_per_axis && horizontal >= d.min_strokes_per_axis
    }
}
