//! Probabilistic-style line segments on top of the `imageproc` Hough transform.
//!
//! `detect_lines` only reports infinite polar lines. Each line is walked across
//! the edge map and split into segments wherever it leaves the edge pixels for
//! more than `max_gap` samples.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOptions {
    pub canny_low: f32,
    pub canny_high: f32,
    pub vote_threshold: u32,
    pub suppression_radius: u32,
    pub min_length: u32,
    pub max_gap: u32,
}

/// A finite segment in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl EdgeSegment {
    pub fn dx(&self) -> u32 {
        self.x1.abs_diff(self.x2)
    }

    pub fn dy(&self) -> u32 {
        self.y1.abs_diff(self.y2)
    }

    pub fn length(&self) -> f64 {
        (self.dx() as f64).hypot(self.dy() as f64)
    }
}

/// Canny edges, Hough lines, then segments along each line.
pub fn detect_segments(gray: &GrayImage, opts: &SegmentOptions) -> Vec<EdgeSegment> {
    if gray.width() < 3 || gray.height() < 3 {
        return Vec::new();
    }

    let edges = canny(gray, opts.canny_low, opts.canny_high);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold: opts.vote_threshold,
            suppression_radius: opts.suppression_radius,
        },
    );

    lines
        .iter()
        .flat_map(|line| walk_line(&edges, line, opts))
        .collect()
}

fn walk_line(edges: &GrayImage, line: &PolarLine, opts: &SegmentOptions) -> Vec<EdgeSegment> {
    let (width, height) = (edges.width() as i32, edges.height() as i32);
    let theta = (line.angle_in_degrees as f32).to_radians();
    let (sin, cos) = theta.sin_cos();

    let is_edge = |x: i32, y: i32| {
        x >= 0 && y >= 0 && x < width && y < height && edges.get_pixel(x as u32, y as u32)[0] > 0
    };

    // The accumulator truncates r, so also look one pixel either side.
    let samples: Vec<Option<(i32, i32)>> = if sin.abs() >= cos.abs() {
        (0..width)
            .map(|x| {
                let y = ((line.r - x as f32 * cos) / sin).round() as i32;
                [0, 1, -1]
                    .into_iter()
                    .map(|d| (x, y + d))
                    .find(|&(px, py)| is_edge(px, py))
            })
            .collect()
    } else {
        (0..height)
            .map(|y| {
                let x = ((line.r - y as f32 * sin) / cos).round() as i32;
                [0, 1, -1]
                    .into_iter()
                    .map(|d| (x + d, y))
                    .find(|&(px, py)| is_edge(px, py))
            })
            .collect()
    };

    let mut segments = Vec::new();
    let mut start: Option<(i32, i32)> = None;
    let mut last = (0, 0);
    let mut gap = 0u32;

    let flush = |start: (i32, i32), end: (i32, i32), out: &mut Vec<EdgeSegment>| {
        let segment = EdgeSegment {
            x1: start.0,
            y1: start.1,
            x2: end.0,
            y2: end.1,
        };
        if segment.length() >= opts.min_length as f64 {
            out.push(segment);
        }
    };

    for sample in samples {
        match sample {
            Some(point) => {
                if start.is_none() {
                    start = Some(point);
                }
                last = point;
                gap = 0;
            }
            None => {
                if let Some(s) = start {
                    gap += 1;
                    if gap > opts.max_gap {
                        flush(s, last, &mut segments);
                        start = None;
                        gap = 0;
                    }
                }
            }
        }
    }
    if let Some(s) = start {
        flush(s, last, &mut segments);
    }

    segments
}
