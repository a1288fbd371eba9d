use anyhow::Result;
use image::GrayImage;
use std::sync::Arc;

use crate::config::CropSource;
use crate::detection::heuristics::HeuristicClassifier;
use crate::detection::line_removal::LineRemover;
use crate::detection::symbols::SymbolSegmenter;
use crate::imaging::{Binarizer, ImageOps};
use crate::pipeline::{MetadataValue, PipelineContext, PipelineData, PipelineStep};

/// Remove staff lines from each staff region
pub struct LineRemovalStep {
    pub remover: LineRemover,
}

impl PipelineStep for LineRemovalStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let cleaned = self.remover.remove(&item.image)?;
            let mut new_item = item;
            new_item.image = cleaned.image;
            new_item.mask = Some(cleaned.mask);
            new_item.metadata.insert(
                "line_thickness".to_string(),
                MetadataValue::Int(cleaned.line_thickness as i32),
            );
            result.push(new_item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Line Removal"
    }
}

/// Threshold the whole page with a local mean, skipping staff handling
pub struct DirectMaskStep {
    pub ops: Arc<dyn ImageOps>,
    pub binarizer: Binarizer,
}

impl PipelineStep for DirectMaskStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|mut item| {
                item.mask = Some(self.ops.binarize(&item.image, &self.binarizer));
                item
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Adaptive Threshold"
    }
}

/// Split each masked item into one item per accepted glyph box
pub struct SymbolSegmentationStep {
    pub segmenter: Arc<SymbolSegmenter>,
    pub crop_source: CropSource,
}

impl PipelineStep for SymbolSegmentationStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let mask = item
                .mask
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Symbol segmentation needs a mask; run a threshold step first"))?;

            let crop_from: &GrayImage = match self.crop_source {
                CropSource::Cleaned => &item.image,
                CropSource::Original => item.source.as_ref(),
            };

            for bbox in self.segmenter.segment(mask) {
                let crop = self.segmenter.crop(crop_from, &bbox);
                let symbol = item
                    .child_region(crop, bbox)
                    .with_metadata("area", MetadataValue::Int(bbox.area() as i32));
                result.push(symbol);
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Symbol Segmentation"
    }
}

/// Attach a heuristic class to every glyph
pub struct HeuristicClassificationStep {
    pub classifier: HeuristicClassifier,
}

impl PipelineStep for HeuristicClassificationStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for mut item in data {
            let bbox = item
                .bbox
                .ok_or_else(|| anyhow::anyhow!("Classification needs a glyph bounding box"))?;
            item.label = Some(self.classifier.classify(&bbox, &item.image));
            result.push(item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Heuristic Classification"
    }
}

/// Resize glyph crops to the classifier input size
pub struct NormalizeStep {
    pub segmenter: Arc<SymbolSegmenter>,
}

impl PipelineStep for NormalizeStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|mut item| {
                item.image = self.segmenter.normalize(&item.image);
                item
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Normalize"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisambiguationConfig, SymbolConfig};
    use crate::detection::heuristics::default_rules;
    use crate::imaging::ImageprocOps;
    use crate::models::BoundingBox;
    use image::Luma;

    fn page_with_square() -> GrayImage {
        GrayImage::from_fn(80, 60, |x, y| {
            if (30..50).contains(&x) && (20..40).contains(&y) {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    fn segmenter() -> Arc<SymbolSegmenter> {
        Arc::new(SymbolSegmenter::new(Arc::new(ImageprocOps), SymbolConfig::default()))
    }

    #[test]
    fn segmentation_requires_a_mask() {
        let step = SymbolSegmentationStep {
            segmenter: segmenter(),
            crop_source: CropSource::Cleaned,
        };
        let item = PipelineData::from_image(page_with_square());
        assert!(step.process(vec![item], &PipelineContext::default()).is_err());
    }

    #[test]
    fn mask_then_segment_then_classify() {
        let ctx = PipelineContext::default();
        let mask_step = DirectMaskStep {
            ops: Arc::new(ImageprocOps),
            binarizer: Binarizer::otsu(0.0),
        };
        let seg_step = SymbolSegmentationStep {
            segmenter: segmenter(),
            crop_source: CropSource::Original,
        };
        let cls_step = HeuristicClassificationStep {
            classifier: HeuristicClassifier::new(default_rules(), DisambiguationConfig::default()),
        };

        let items = mask_step
            .process(vec![PipelineData::from_image(page_with_square())], &ctx)
            .unwrap();
        let glyphs = seg_step.process(items, &ctx).unwrap();
        assert_eq!(glyphs.len(), 1);
        assert_eq!(glyphs[0].bbox, Some(BoundingBox::new(30, 20, 20, 20)));
        assert_eq!(glyphs[0].get_int("area"), Some(400));

        let labeled = cls_step.process(glyphs, &ctx).unwrap();
        assert_eq!(labeled[0].label.as_deref(), Some("note_head"));

        let normalized = NormalizeStep { segmenter: segmenter() }
            .process(labeled, &ctx)
            .unwrap();
        assert_eq!(normalized[0].image.dimensions(), (64, 64));
    }
}
