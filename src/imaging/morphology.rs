//! Binary morphology with rectangular structuring elements.
//!
//! Rectangles are separable, so every operation is a row pass followed by a
//! column pass, each answered with a running count over the window. Pixels
//! outside the image never erode anything and never dilate anything.

use image::{GrayImage, Luma};

use crate::error::{Result, SegmentError};

/// Rectangular structuring element anchored at its centre `(w / 2, h / 2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel {
    width: u32,
    height: u32,
}

impl Kernel {
    pub fn rect(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SegmentError::config(format!(
                "structuring element must be at least 1x1, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Clone, Copy)]
enum Op {
    Erode,
    Dilate,
}

#[derive(Clone, Copy)]
enum Axis {
    Rows,
    Columns,
}

pub fn erode(mask: &GrayImage, kernel: Kernel) -> GrayImage {
    let rows = pass(mask, kernel.width, Axis::Rows, Op::Erode);
    pass(&rows, kernel.height, Axis::Columns, Op::Erode)
}

/// Dilation with the reflected element, so that opening and closing are
/// idempotent for even-sized kernels too.
pub fn dilate(mask: &GrayImage, kernel: Kernel) -> GrayImage {
    let rows = pass(mask, kernel.width, Axis::Rows, Op::Dilate);
    pass(&rows, kernel.height, Axis::Columns, Op::Dilate)
}

pub fn open(mask: &GrayImage, kernel: Kernel, iterations: u32) -> GrayImage {
    let mut result = binarized(mask);
    for _ in 0..iterations {
        result = erode(&result, kernel);
    }
    for _ in 0..iterations {
        result = dilate(&result, kernel);
    }
    result
}

pub fn close(mask: &GrayImage, kernel: Kernel) -> GrayImage {
    erode(&dilate(mask, kernel), kernel)
}

/// Pixel-wise union of two masks of equal size.
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        if a.get_pixel(x, y)[0] > 0 || b.get_pixel(x, y)[0] > 0 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn binarized(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y)[0] > 0 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn pass(mask: &GrayImage, len: u32, axis: Axis, op: Op) -> GrayImage {
    if len <= 1 {
        return binarized(mask);
    }

    let (width, height) = mask.dimensions();
    let (outer, inner) = match axis {
        Axis::Rows => (height as usize, width as usize),
        Axis::Columns => (width as usize, height as usize),
    };
    let at = |o: usize, i: usize| match axis {
        Axis::Rows => (i as u32, o as u32),
        Axis::Columns => (o as u32, i as u32),
    };

    let len = len as usize;
    let anchor = len / 2;
    let (before, after) = match op {
        Op::Erode => (anchor, len - 1 - anchor),
        Op::Dilate => (len - 1 - anchor, anchor),
    };

    let mut out = GrayImage::new(width, height);
    let mut prefix = vec![0usize; inner + 1];

    for o in 0..outer {
        for i in 0..inner {
            let (x, y) = at(o, i);
            prefix[i + 1] = prefix[i] + usize::from(mask.get_pixel(x, y)[0] > 0);
        }
        for i in 0..inner {
            let start = i.saturating_sub(before);
            let end = (i + after).min(inner - 1);
            let count = prefix[end + 1] - prefix[start];
            let on = match op {
                Op::Erode => count == end - start + 1,
                Op::Dilate => count > 0,
            };
            if on {
                let (x, y) = at(o, i);
                out.put_pixel(x, y, Luma([255]));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> GrayImage {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        GrayImage::from_fn(width, height, |x, y| {
            if rows[y as usize].as_bytes()[x as usize] == b'#' {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    fn count_on(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p[0] > 0).count()
    }

    #[test]
    fn zero_sized_kernel_is_rejected() {
        assert!(Kernel::rect(0, 3).is_err());
        assert!(Kernel::rect(3, 0).is_err());
    }

    #[test]
    fn horizontal_opening_keeps_only_long_runs() {
        let mask = mask_from_rows(&[
            "..........................",
            ".####################.....",
            "....###..........####.....",
            "..........................",
        ]);
        let opened = open(&mask, Kernel::rect(10, 1).unwrap(), 1);
        assert_eq!(count_on(&opened), 20);
        assert!((1..21).all(|x| opened.get_pixel(x, 1)[0] == 255));
        assert_eq!(opened.get_pixel(5, 2)[0], 0);
    }

    #[test]
    fn opening_is_idempotent_and_anti_extensive() {
        let mask = mask_from_rows(&[
            "......##########....",
            "..######..##.#####..",
            "..######..##.#####..",
            ".....#....##........",
        ]);
        for kernel in [Kernel::rect(2, 2).unwrap(), Kernel::rect(3, 1).unwrap()] {
            let once = open(&mask, kernel, 1);
            let twice = open(&once, kernel, 1);
            assert_eq!(once, twice);
            assert!(once
                .enumerate_pixels()
                .all(|(x, y, p)| p[0] == 0 || mask.get_pixel(x, y)[0] > 0));
        }
    }

    #[test]
    fn closing_fills_small_gaps() {
        let mask = mask_from_rows(&["#####.#####", "#####.#####"]);
        let closed = close(&mask, Kernel::rect(3, 1).unwrap());
        assert_eq!(count_on(&closed), 22);
    }

    #[test]
    fn even_erosion_trims_leading_edge() {
        let mask = mask_from_rows(&["......", ".####.", ".####.", ".####.", ".####.", "......"]);
        let eroded = erode(&mask, Kernel::rect(2, 2).unwrap());
        assert_eq!(count_on(&eroded), 9);
        assert_eq!(eroded.get_pixel(1, 1)[0], 0);
        assert_eq!(eroded.get_pixel(4, 4)[0], 255);
    }

    #[test]
    fn union_combines_masks() {
        let a = mask_from_rows(&["#..", "..."]);
        let b = mask_from_rows(&["...", "..#"]);
        let both = union(&a, &b);
        assert_eq!(count_on(&both), 2);
    }
}
