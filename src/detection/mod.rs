pub mod heuristics;
pub mod line_removal;
pub mod regions;
pub mod staff;
pub mod steps;
pub mod symbols;

use image::{DynamicImage, GrayImage};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{SegmentationMode, SegmenterConfig};
use crate::imaging::{to_grayscale, Binarizer, ImageOps, ImageprocOps};
use crate::models::{StaffRegion, StaffSystem, SymbolCandidate};
use crate::pipeline::{Pipeline, PipelineData, StaffContext};

use self::heuristics::HeuristicClassifier;
use self::line_removal::LineRemover;
use self::regions::StaffRegionExtractor;
use self::staff::StaffLineDetector;
use self::symbols::SymbolSegmenter;

/// Everything found on one page.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    pub staffs: Vec<StaffSystem>,
    /// Source regions, one per staff. Empty in direct mode.
    pub regions: Vec<StaffRegion>,
    /// Candidates in staff order, left to right within a staff.
    pub candidates: Vec<SymbolCandidate>,
}

/// Main segmentation orchestrator
pub struct PageSegmenter {
    config: SegmenterConfig,
    ops: Arc<dyn ImageOps>,
    verbose: bool,
}

impl PageSegmenter {
    /// Fails when the configuration is out of range.
    pub fn new(config: SegmenterConfig) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ops: Arc::new(ImageprocOps),
            verbose: false,
        })
    }

    /// Swap the imaging backend, mostly for tests.
    pub fn with_ops(mut self, ops: Arc<dyn ImageOps>) -> Self {
        self.ops = ops;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn staff_detector(&self) -> StaffLineDetector {
        StaffLineDetector::new(self.ops.clone(), &self.config.binarize, self.config.staff.clone())
    }

    pub fn detect_staffs(&self, gray: &GrayImage) -> anyhow::Result<Vec<StaffSystem>> {
        Ok(self.staff_detector().detect(gray)?)
    }

    pub fn extract_regions(&self, gray: &GrayImage, systems: &[StaffSystem]) -> Vec<StaffRegion> {
        StaffRegionExtractor::new(self.config.staff.padding_factor).extract_all(gray, systems)
    }

    /// Run the configured mode on one page.
    pub fn segment(&self, page: &DynamicImage) -> anyhow::Result<PageResult> {
        self.segment_inner(page, None)
    }

    /// Like [`segment`](Self::segment), dumping every step's output under `debug_dir`.
    pub fn segment_with_debug(
        &self,
        page: &DynamicImage,
        debug_dir: PathBuf,
    ) -> anyhow::Result<PageResult> {
        self.segment_inner(page, Some(debug_dir))
    }

    fn segment_inner(
        &self,
        page: &DynamicImage,
        debug_dir: Option<PathBuf>,
    ) -> anyhow::Result<PageResult> {
        let gray = to_grayscale(page);

        match self.config.mode {
            SegmentationMode::Staff => {
                let staffs = self.detect_staffs(&gray)?;
                if staffs.is_empty() {
                    tracing::info!("No staff systems found");
                    return Ok(PageResult::default());
                }
                let regions = self.extract_regions(&gray, &staffs);

                let items: Vec<PipelineData> = regions
                    .iter()
                    .map(|r| {
                        PipelineData::from_staff(
                            r.image.clone(),
                            StaffContext {
                                index: r.index,
                                system: Arc::new(r.system.clone()),
                                offset_y: r.offset_y,
                            },
                        )
                    })
                    .collect();

                let pipeline = attach_debug(
                    build_standard_pipeline(&self.config, self.ops.clone(), self.verbose),
                    debug_dir,
                );
                let candidates = collect_candidates(pipeline.run_items(items)?);

                Ok(PageResult {
                    staffs,
                    regions,
                    candidates,
                })
            }
            SegmentationMode::Direct => {
                let pipeline = attach_debug(
                    build_direct_pipeline(&self.config, self.ops.clone(), self.verbose),
                    debug_dir,
                );
                let candidates = collect_candidates(pipeline.run(gray)?);

                Ok(PageResult {
                    candidates,
                    ..PageResult::default()
                })
            }
        }
    }
}

/// Step dumps are optional output; a stale directory never fails the page.
fn attach_debug(pipeline: Pipeline, debug_dir: Option<PathBuf>) -> Pipeline {
    match debug_dir {
        Some(dir) => pipeline.with_debug_best_effort(dir),
        None => pipeline,
    }
}

fn collect_candidates(items: Vec<PipelineData>) -> Vec<SymbolCandidate> {
    items.into_iter().map(PipelineData::into_candidate).collect()
}

fn glyph_steps(config: &SegmenterConfig, ops: Arc<dyn ImageOps>, pipeline: Pipeline) -> Pipeline {
    use crate::detection::steps::*;

    let segmenter = Arc::new(SymbolSegmenter::new(ops, config.symbols.clone()));

    pipeline
        .add_step(Arc::new(SymbolSegmentationStep {
            segmenter: segmenter.clone(),
            crop_source: config.symbols.crop_source,
        }))
        .add_step(Arc::new(HeuristicClassificationStep {
            classifier: HeuristicClassifier::new(
                config.rules.clone(),
                config.disambiguation.clone(),
            ),
        }))
        .add_step(Arc::new(NormalizeStep { segmenter }))
}

/// Per-staff pipeline: staff regions in, labeled 64x64 glyphs out.
pub fn build_standard_pipeline(
    config: &SegmenterConfig,
    ops: Arc<dyn ImageOps>,
    verbose: bool,
) -> Pipeline {
    use crate::detection::steps::LineRemovalStep;

    let pipeline = Pipeline::new()
        .with_verbose(verbose)
        .add_step(Arc::new(LineRemovalStep {
            remover: LineRemover::new(ops.clone(), config.line_removal.clone()),
        }));
    glyph_steps(config, ops, pipeline)
}

/// Whole-page pipeline without staff handling.
pub fn build_direct_pipeline(
    config: &SegmenterConfig,
    ops: Arc<dyn ImageOps>,
    verbose: bool,
) -> Pipeline {
    use crate::detection::steps::DirectMaskStep;

    let b = &config.binarize;
    let pipeline = Pipeline::new()
        .with_verbose(verbose)
        .add_step(Arc::new(DirectMaskStep {
            ops: ops.clone(),
            binarizer: Binarizer::adaptive(b.adaptive_blur_sigma, b.adaptive_block_radius, b.adaptive_delta),
        }));
    glyph_steps(config, ops, pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = SegmenterConfig::default();
        config.symbols.normalized_size = 0;
        assert!(PageSegmenter::new(config).is_err());
    }

    #[test]
    fn pipelines_list_their_steps() {
        let config = SegmenterConfig::default();
        let standard = build_standard_pipeline(&config, Arc::new(ImageprocOps), false);
        assert_eq!(
            standard.step_names(),
            vec![
                "Line Removal",
                "Symbol Segmentation",
                "Heuristic Classification",
                "Normalize"
            ]
        );
        let direct = build_direct_pipeline(&config, Arc::new(ImageprocOps), false);
        assert_eq!(direct.step_names()[0], "Adaptive Threshold");
    }
}
