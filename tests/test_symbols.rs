mod common;

use common::*;
use image::GrayImage;
use staffcut::config::{DisambiguationConfig, SymbolConfig};
use staffcut::detection::heuristics::{default_rules, Constraint, HeuristicClassifier, ShapeRule};
use staffcut::detection::symbols::SymbolSegmenter;
use staffcut::imaging::ImageOps;
use staffcut::models::BoundingBox;
use staffcut::{SegmentationMode, SegmenterConfig};
use std::sync::Arc;

/// Backend whose contour search returns a fixed list of boxes.
struct CannedBoxes(Vec<BoundingBox>);

impl ImageOps for CannedBoxes {
    fn external_boxes(&self, _mask: &GrayImage) -> Vec<BoundingBox> {
        self.0.clone()
    }
}

fn segment_canned(boxes: Vec<BoundingBox>) -> Vec<BoundingBox> {
    SymbolSegmenter::new(Arc::new(CannedBoxes(boxes)), SymbolConfig::default())
        .segment(&GrayImage::new(1, 1))
}

fn default_classifier() -> HeuristicClassifier {
    HeuristicClassifier::new(default_rules(), DisambiguationConfig::default())
}

#[test]
fn area_filter_is_idempotent_on_its_output() {
    let dims = [(10, 10), (10, 10), (10, 10), (10, 10), (11, 10), (9, 10), (100, 100)];
    let boxes: Vec<BoundingBox> = dims
        .iter()
        .enumerate()
        .map(|(i, &(w, h))| BoundingBox::new(i as u32 * 150, 5, w, h))
        .collect();

    let first = segment_canned(boxes);
    assert_eq!(first.len(), 6);
    assert!(!first.iter().any(|b| b.width == 100));

    let second = segment_canned(first.clone());
    assert_eq!(second, first);
}

#[test]
fn no_contours_means_no_candidates() {
    assert!(segment_canned(Vec::new()).is_empty());
}

#[test]
fn earlier_rule_wins_on_overlap() {
    let classifier = default_classifier();
    let blank = blank_page(25, 25);
    // note_head, natural, clef_f and time_signature all accept 25x25.
    assert_eq!(classifier.classify(&BoundingBox::new(0, 0, 25, 25), &blank), "note_head");

    let swapped = vec![
        ShapeRule::new(
            "time_signature",
            vec![Constraint::Aspect { min: 0.7, max: 1.3 }],
        ),
        ShapeRule::new("note_head", vec![Constraint::Aspect { min: 0.7, max: 1.3 }]),
    ];
    let classifier = HeuristicClassifier::new(swapped, DisambiguationConfig::default());
    assert_eq!(
        classifier.classify(&BoundingBox::new(0, 0, 25, 25), &blank),
        "time_signature"
    );
}

#[test]
fn crosshatch_flat_becomes_diez() {
    let crop = crosshatch_crop();
    let bbox = BoundingBox::new(0, 0, crop.width(), crop.height());
    let classifier = default_classifier();

    assert_eq!(classifier.match_rule(bbox.width, bbox.height).unwrap().class, "flat");
    assert_eq!(classifier.classify(&bbox, &crop), "diez");
}

#[test]
fn vertical_strokes_stay_flat() {
    let crop = vertical_strokes_crop();
    let bbox = BoundingBox::new(0, 0, crop.width(), crop.height());
    assert_eq!(default_classifier().classify(&bbox, &crop), "flat");
}

#[test]
fn disabled_disambiguation_keeps_flat() {
    let crop = crosshatch_crop();
    let bbox = BoundingBox::new(0, 0, crop.width(), crop.height());
    let config = DisambiguationConfig {
        enabled: false,
        ..DisambiguationConfig::default()
    };
    let classifier = HeuristicClassifier::new(default_rules(), config);
    assert_eq!(classifier.classify(&bbox, &crop), "flat");
}

#[test]
fn direct_mode_cuts_the_whole_page() {
    let mut page = blank_page(300, 120);
    for x in [40, 130, 220] {
        fill_rect(&mut page, x, 50, 20, 20);
    }

    let config = SegmenterConfig {
        mode: SegmentationMode::Direct,
        ..SegmenterConfig::default()
    };
    let segmenter = staffcut::PageSegmenter::new(config).unwrap();
    let result = segment_gray(&segmenter, &page);

    assert!(result.staffs.is_empty());
    assert_eq!(result.candidates.len(), 3);
    let xs: Vec<u32> = result.candidates.iter().map(|c| c.page_bbox().x).collect();
    assert!(xs.windows(2).all(|w| w[0] < w[1]));
    for (candidate, x) in result.candidates.iter().zip([40u32, 130, 220]) {
        assert_eq!(candidate.staff_index, None);
        assert!(candidate.page_bbox().x.abs_diff(x) <= 2);
        assert_eq!(candidate.label(), "note_head");
    }
}
