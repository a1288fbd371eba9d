//! Directory-level driver: every image of a folder through the segmenter.
//!
//! Pages are independent, so each one is handled start to finish by a single
//! rayon worker. Results are gathered in input order before the manifest is
//! written, which keeps the output identical from run to run regardless of
//! scheduling.

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::detection::PageSegmenter;
use crate::export::{write_manifest, PageExporter};
use crate::imaging::load_image;
use crate::models::AnnotationRecord;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Shared flag checked before each page starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub input_dir: PathBuf,
    /// Per-page step dumps go to `{debug_dir}/{page stem}/`.
    pub debug_dir: Option<PathBuf>,
    /// Worker threads; `None` uses rayon's default.
    pub jobs: Option<usize>,
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Processed {
        path: PathBuf,
        staffs: usize,
        candidates: usize,
    },
    Failed {
        path: PathBuf,
        reason: String,
    },
    Skipped {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<PageOutcome>,
    pub records: usize,
    /// `None` when the input directory had no images.
    pub manifest: Option<PathBuf>,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::Processed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PageOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&PageOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    images.sort();
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn page_base(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string())
}

pub struct BatchDriver {
    segmenter: PageSegmenter,
    exporter: PageExporter,
    options: BatchOptions,
    cancel: CancelToken,
}

impl BatchDriver {
    pub fn new(segmenter: PageSegmenter, exporter: PageExporter, options: BatchOptions) -> Self {
        Self {
            segmenter,
            exporter,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Token that stops the batch before the next page starts.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(&self) -> anyhow::Result<BatchSummary> {
        let images = list_images(&self.options.input_dir)?;
        if images.is_empty() {
            warn!("No images found in {}", self.options.input_dir.display());
            return Ok(BatchSummary::default());
        }
        info!("Processing {} image(s) from {}", images.len(), self.options.input_dir.display());

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = self.options.jobs {
            builder = builder.num_threads(jobs);
        }
        let pool = builder.build()?;

        let pages: anyhow::Result<Vec<(PageOutcome, Vec<AnnotationRecord>)>> =
            pool.install(|| images.par_iter().map(|path| self.process_page(path)).collect());
        let pages = pages?;

        let mut summary = BatchSummary::default();
        let mut records = Vec::new();
        for (outcome, page_records) in pages {
            summary.outcomes.push(outcome);
            records.extend(page_records);
        }

        let manifest = self.exporter.options().manifest_path();
        write_manifest(&manifest, &records)?;
        summary.records = records.len();
        summary.manifest = Some(manifest);

        info!(
            "Done: {} processed, {} failed, {} skipped",
            summary.processed(),
            summary.failed(),
            summary.skipped()
        );
        Ok(summary)
    }

    /// Page-level failures become outcomes; output write errors abort the batch.
    fn process_page(&self, path: &Path) -> anyhow::Result<(PageOutcome, Vec<AnnotationRecord>)> {
        if self.cancel.is_cancelled() {
            debug!("Cancelled before {}", path.display());
            return Ok((PageOutcome::Skipped { path: path.to_path_buf() }, Vec::new()));
        }

        let failed = |reason: String| -> anyhow::Result<(PageOutcome, Vec<AnnotationRecord>)> {
            Ok((
                PageOutcome::Failed {
                    path: path.to_path_buf(),
                    reason,
                },
                Vec::new(),
            ))
        };

        let page = match load_image(path) {
            Ok(page) => page,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                return failed(e.to_string());
            }
        };

        let base = page_base(path);
        let segmented = match &self.options.debug_dir {
            Some(dir) => self.segmenter.segment_with_debug(&page, dir.join(&base)),
            None => self.segmenter.segment(&page),
        };
        let result = match segmented {
            Ok(result) => result,
            Err(e) => {
                warn!("Segmentation failed for {}: {:#}", path.display(), e);
                return failed(format!("{:#}", e));
            }
        };

        let records = self.exporter.export_page(&base, &page, &result)?;
        info!(
            "{}: {} staff(s), {} fragment(s)",
            base,
            result.staffs.len(),
            result.candidates.len()
        );

        Ok((
            PageOutcome::Processed {
                path: path.to_path_buf(),
                staffs: result.staffs.len(),
                candidates: result.candidates.len(),
            },
            records,
        ))
    }
}
