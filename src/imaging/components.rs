use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;

use crate::models::BoundingBox;

/// One labelled region of a mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub label: u32,
    pub bbox: BoundingBox,
    pub pixel_count: u32,
}

/// Label image plus per-label statistics, sorted by label.
pub struct LabeledComponents {
    pub labels: ImageBuffer<Luma<u32>, Vec<u32>>,
    pub components: Vec<Component>,
}

impl LabeledComponents {
    /// Mask holding only the components accepted by `keep`.
    pub fn mask_where(&self, keep: impl Fn(&Component) -> bool) -> GrayImage {
        let kept: HashMap<u32, bool> = self
            .components
            .iter()
            .map(|c| (c.label, keep(c)))
            .collect();

        let (width, height) = self.labels.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            let label = self.labels.get_pixel(x, y)[0];
            if label != 0 && kept.get(&label).copied().unwrap_or(false) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

/// Label 8-connected foreground regions of a binary mask.
pub fn label_components(mask: &GrayImage) -> LabeledComponents {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut regions: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue;
        }

        regions
            .entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, count)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                *count += 1;
            })
            .or_insert((x, y, x, y, 1));
    }

    let mut components: Vec<Component> = regions
        .into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, count))| Component {
            label,
            bbox: BoundingBox::from_extents(min_x, min_y, max_x, max_y),
            pixel_count: count,
        })
        .collect();
    components.sort_by_key(|c| c.label);

    LabeledComponents { labels, components }
}

/// Bounding boxes of outer contours that are not nested inside a hole.
pub fn external_boxes(mask: &GrayImage) -> Vec<BoundingBox> {
    find_contours::<u32>(mask)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter_map(|c| {
            let first = c.points.first()?;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
            for p in &c.points {
                min_x = min_x.min(p.x);
                min_y = min_y.min(p.y);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }
            Some(BoundingBox::from_extents(min_x, min_y, max_x, max_y))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw_rect(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn components_report_boxes_and_counts() {
        let mut mask = GrayImage::new(40, 20);
        draw_rect(&mut mask, 2, 3, 5, 4);
        draw_rect(&mut mask, 20, 10, 10, 2);

        let labeled = label_components(&mask);
        assert_eq!(labeled.components.len(), 2);
        let mut boxes: Vec<_> = labeled.components.iter().map(|c| c.bbox).collect();
        boxes.sort_by_key(|b| b.x);
        assert_eq!(boxes[0], BoundingBox::new(2, 3, 5, 4));
        assert_eq!(boxes[1], BoundingBox::new(20, 10, 10, 2));

        let wide_only = labeled.mask_where(|c| c.bbox.width > 8);
        assert_eq!(wide_only.get_pixel(25, 10)[0], 255);
        assert_eq!(wide_only.get_pixel(3, 4)[0], 0);
    }

    #[test]
    fn external_boxes_skip_nested_shapes() {
        let mut mask = GrayImage::new(30, 30);
        // Ring with a dot inside its hole.
        draw_rect(&mut mask, 2, 2, 20, 20);
        for y in 5..19 {
            for x in 5..19 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        draw_rect(&mut mask, 10, 10, 3, 3);

        let boxes = external_boxes(&mask);
        assert_eq!(boxes, vec![BoundingBox::new(2, 2, 20, 20)]);
    }

    #[test]
    fn empty_mask_has_no_contours() {
        assert!(external_boxes(&GrayImage::new(10, 10)).is_empty());
        assert!(label_components(&GrayImage::new(10, 10)).components.is_empty());
    }
}
