#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

use image::{DynamicImage, GrayImage};
use staffcut::{PageResult, PageSegmenter, SegmenterConfig};

pub fn default_segmenter() -> PageSegmenter {
    PageSegmenter::new(SegmenterConfig::default()).expect("default config is valid")
}

pub fn segment_gray(segmenter: &PageSegmenter, page: &GrayImage) -> PageResult {
    segmenter
        .segment(&DynamicImage::ImageLuma8(page.clone()))
        .expect("segmentation succeeds")
}

/// Longest run of ink pixels in any row of a mask.
pub fn longest_row_run(mask: &GrayImage) -> u32 {
    let mut longest = 0;
    for row in mask.rows() {
        let mut run = 0;
        for p in row {
            if p[0] > 0 {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
    }
    longest
}
