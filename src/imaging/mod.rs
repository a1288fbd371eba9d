//! Image-processing primitives used by the segmentation stages.
//!
//! The stages only talk to [`ImageOps`], so tests can swap in doubles that
//! return canned contours or masks. [`ImageprocOps`] is the real implementation:
//! thresholding, contours and labelling come from `imageproc`. Rectangular
//! morphology is implemented here because `imageproc::morphology::Mask` caps
//! elements at 511 pixels per side with a `u8` centre, and the vertical line
//! kernel spans almost the full region height. Inpainting is implemented here
//! as well.

pub mod components;
pub mod hough;
pub mod inpaint;
pub mod morphology;
pub mod threshold;

use image::{DynamicImage, GrayImage, ImageReader};
use std::path::Path;

use crate::error::{Result, SegmentError};
use crate::models::BoundingBox;

pub use components::{Component, LabeledComponents};
pub use morphology::Kernel;
pub use threshold::{Binarizer, ThresholdMethod};

/// Capabilities the staff and symbol stages need from an imaging backend.
///
/// Masks are `GrayImage`s with ink = 255 and background = 0. Every method has a
/// default implementation, so a test double only overrides what it fakes.
pub trait ImageOps: Send + Sync {
    fn binarize(&self, gray: &GrayImage, binarizer: &Binarizer) -> GrayImage {
        binarizer.binarize(gray)
    }

    /// Erode `iterations` times, then dilate `iterations` times.
    fn open(&self, mask: &GrayImage, kernel: Kernel, iterations: u32) -> GrayImage {
        morphology::open(mask, kernel, iterations)
    }

    fn close(&self, mask: &GrayImage, kernel: Kernel) -> GrayImage {
        morphology::close(mask, kernel)
    }

    fn erode(&self, mask: &GrayImage, kernel: Kernel) -> GrayImage {
        morphology::erode(mask, kernel)
    }

    /// Bounding boxes of the outermost contours, in discovery order.
    fn external_boxes(&self, mask: &GrayImage) -> Vec<BoundingBox> {
        components::external_boxes(mask)
    }

    /// 8-connected components with their statistics.
    fn connected_components(&self, mask: &GrayImage) -> LabeledComponents {
        components::label_components(mask)
    }

    /// Reconstruct the pixels of `gray` under the non-zero pixels of `mask`.
    fn inpaint(&self, gray: &GrayImage, mask: &GrayImage, radius: u32) -> GrayImage {
        inpaint::inpaint(gray, mask, radius)
    }
}

/// Default backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageprocOps;

impl ImageOps for ImageprocOps {}

/// Decode an image file, mapping every failure to [`SegmentError::ImageLoad`].
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage> {
    let path = path.as_ref();
    let load_error = |source| SegmentError::ImageLoad {
        path: path.to_path_buf(),
        source,
    };

    ImageReader::open(path)
        .map_err(|e| load_error(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| load_error(image::ImageError::IoError(e)))?
        .decode()
        .map_err(load_error)
}

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_image_load_error() {
        let err = load_image("/definitely/not/here.png").unwrap_err();
        assert!(err.is_image_load());
    }

    #[test]
    fn undecodable_file_is_an_image_load_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(load_image(&path).unwrap_err().is_image_load());
    }
}
