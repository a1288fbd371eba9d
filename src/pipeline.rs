use anyhow::Result;
use image::GrayImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{BoundingBox, StaffSystem, SymbolCandidate};

/// Staff provenance carried by items cut from a staff region.
#[derive(Debug, Clone)]
pub struct StaffContext {
    pub index: usize,
    pub system: Arc<StaffSystem>,
    /// Page row of the region's first row.
    pub offset_y: u32,
}

/// Data that flows through the pipeline
/// Each PipelineData is a page, a staff region or a single glyph crop
#[derive(Clone)]
pub struct PipelineData {
    /// Current grayscale image of the item
    pub image: GrayImage,

    /// Untouched image the item was cut from (shared via Arc)
    pub source: Arc<GrayImage>,

    /// Ink mask produced by a thresholding or line removal step
    pub mask: Option<GrayImage>,

    /// Position inside `source` (None means the whole image)
    pub bbox: Option<BoundingBox>,

    pub staff: Option<StaffContext>,

    /// Class assigned by the heuristic classifier
    pub label: Option<String>,

    /// Free-form per-item measurements, e.g. "line_thickness"
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Int(i32),
}

impl PipelineData {
    /// Create PipelineData for a full image
    pub fn from_image(image: GrayImage) -> Self {
        let source = Arc::new(image.clone());
        Self {
            image,
            source,
            mask: None,
            bbox: None,
            staff: None,
            label: None,
            metadata: HashMap::new(),
        }
    }

    /// Create PipelineData for a staff region
    pub fn from_staff(image: GrayImage, staff: StaffContext) -> Self {
        Self {
            staff: Some(staff),
            ..Self::from_image(image)
        }
    }

    /// Create PipelineData for a region of the parent's source image
    pub fn child_region(&self, image: GrayImage, bbox: BoundingBox) -> Self {
        Self {
            image,
            source: self.source.clone(),
            mask: None,
            bbox: Some(bbox),
            staff: self.staff.clone(),
            label: None,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            None => None,
        }
    }

    /// Turn a finished glyph item into a candidate.
    pub fn into_candidate(self) -> SymbolCandidate {
        let bbox = self
            .bbox
            .unwrap_or_else(|| BoundingBox::new(0, 0, self.source.width(), self.source.height()));
        SymbolCandidate {
            image: self.image,
            bbox,
            staff_index: self.staff.as_ref().map(|s| s.index),
            region_offset_y: self.staff.as_ref().map_or(0, |s| s.offset_y),
            label: self.label,
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub verbose: bool,
    pub debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Process data and return transformed data
    /// Steps can split data (1 → many), filter (many → fewer), or transform (many → many)
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>>;

    /// Human-readable name for this step (used in logs and debug directories)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Log every step at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        prepare_debug_dir(&output_dir)?;
        self.context.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    /// Like `with_debug`, but an unusable directory only costs the dumps.
    pub fn with_debug_best_effort(mut self, output_dir: PathBuf) -> Self {
        match prepare_debug_dir(&output_dir) {
            Ok(()) => self.context.debug = Some(DebugConfig { output_dir }),
            Err(e) => tracing::warn!("Running without debug dumps: {:#}", e),
        }
        self
    }

    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run the pipeline sequentially on a single image
    pub fn run(&self, input: GrayImage) -> Result<Vec<PipelineData>> {
        self.run_items(vec![PipelineData::from_image(input)])
    }

    /// Run the pipeline on prepared items, e.g. one per staff region
    pub fn run_items(&self, items: Vec<PipelineData>) -> Result<Vec<PipelineData>> {
        let mut data = items;
        self.save_debug_images("00_input", &data);

        for (step_idx, step) in self.steps.iter().enumerate() {
            let step_name = step.name();
            if self.context.verbose {
                tracing::info!("Running step: {} (processing {} items)", step_name, data.len());
            }

            data = step.process(data, &self.context)?;

            let step_dir_name = format!(
                "{:02}_{}",
                step_idx + 1,
                step_name.to_lowercase().replace(' ', "_")
            );
            self.save_debug_images(&step_dir_name, &data);

            if self.context.verbose {
                tracing::info!("  → {} items", data.len());
            } else {
                tracing::debug!("{}: {} items", step_name, data.len());
            }
        }

        Ok(data)
    }

    /// Debug dumps never abort a run.
    fn save_debug_images(&self, step_dir_name: &str, data: &[PipelineData]) {
        let Some(debug_config) = self.context.debug.as_ref() else {
            return;
        };

        let step_dir = debug_config.output_dir.join(step_dir_name);
        if let Err(e) = std::fs::create_dir_all(&step_dir) {
            tracing::warn!("Failed to create debug directory {}: {}", step_dir.display(), e);
            return;
        }

        for (idx, item) in data.iter().enumerate() {
            let output_path = step_dir.join(format!("{:02}.png", idx + 1));
            save_best_effort(&item.image, &output_path);
        }

        if self.context.verbose {
            tracing::info!("  Debug: saved {} images to {}/", data.len(), step_dir_name);
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Create `dir` if missing; an existing one must be empty.
fn prepare_debug_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if std::fs::read_dir(dir)?.next().is_some() {
            anyhow::bail!("Debug directory is not empty: {}", dir.display());
        }
    } else {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn save_best_effort(image: &GrayImage, path: &Path) {
    if let Err(e) = image.save(path) {
        tracing::warn!("Failed to save debug image {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Splits every item into its left and right halves.
    struct SplitStep;

    impl PipelineStep for SplitStep {
        fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
            let mut result = Vec::new();
            for item in data {
                let half = item.image.width() / 2;
                for x in [0, half] {
                    let bbox = BoundingBox::new(x, 0, half, item.image.height());
                    let crop = image::imageops::crop_imm(&item.image, x, 0, half, item.image.height()).to_image();
                    result.push(item.child_region(crop, bbox));
                }
            }
            Ok(result)
        }

        fn name(&self) -> &str {
            "Split Halves"
        }
    }

    struct FailingStep;

    impl PipelineStep for FailingStep {
        fn process(&self, _data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
            Err(anyhow::anyhow!("boom"))
        }

        fn name(&self) -> &str {
            "Failing"
        }
    }

    #[test]
    fn steps_can_split_items() {
        let pipeline = Pipeline::new()
            .add_step(Arc::new(SplitStep))
            .add_step(Arc::new(SplitStep));
        let out = pipeline.run(GrayImage::from_pixel(8, 4, Luma([9]))).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|d| d.image.width() == 2));
        assert_eq!(out[3].bbox, Some(BoundingBox::new(2, 0, 2, 4)));
    }

    #[test]
    fn step_errors_abort_the_run() {
        let pipeline = Pipeline::new()
            .add_step(Arc::new(SplitStep))
            .add_step(Arc::new(FailingStep));
        assert!(pipeline.run(GrayImage::new(4, 4)).is_err());
    }

    #[test]
    fn debug_mode_writes_step_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let debug_dir = dir.path().join("debug");
        let pipeline = Pipeline::new()
            .with_debug(debug_dir.clone())
            .unwrap()
            .add_step(Arc::new(SplitStep));
        pipeline.run(GrayImage::new(4, 4)).unwrap();

        assert!(debug_dir.join("00_input/01.png").exists());
        assert!(debug_dir.join("01_split_halves/02.png").exists());
    }

    #[test]
    fn debug_directory_must_be_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("stale.txt"), "x").unwrap();
        assert!(Pipeline::new().with_debug(dir.path().to_path_buf()).is_err());
    }

    #[test]
    fn stale_debug_directory_still_runs_the_steps() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("stale.txt"), "x").unwrap();
        let pipeline = Pipeline::new()
            .add_step(Arc::new(SplitStep))
            .with_debug_best_effort(dir.path().to_path_buf());

        let out = pipeline.run(GrayImage::new(4, 4)).unwrap();
        assert_eq!(out.len(), 2);
        assert!(!dir.path().join("00_input").exists());
    }

    #[test]
    fn metadata_is_read_back_by_key() {
        let data = PipelineData::from_image(GrayImage::new(1, 1))
            .with_metadata("line_thickness", MetadataValue::Int(2));
        assert_eq!(data.get_int("line_thickness"), Some(2));
        assert_eq!(data.get_int("missing"), None);
    }
}
