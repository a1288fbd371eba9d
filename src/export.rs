//! Writing segmentation results to disk.
//!
//! Crops land in `positive/{class}/` or `unknown/unknown/`, one manifest line
//! per crop goes to `annotations.txt`, and an annotated copy of the page is
//! written to `debug/`. Crops and the manifest are the product, so their errors
//! propagate. The annotated page and staff region images are diagnostics and
//! only log a warning on failure.

use ab_glyph::FontVec;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::detection::PageResult;
use crate::error::{Result, SegmentError};
use crate::models::{AnnotationRecord, StaffRegion, SymbolCandidate, UNKNOWN_LABEL};

pub const MANIFEST_FILE: &str = "annotations.txt";

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Fonts and styling for the annotated page.
pub struct VisualizationConfig {
    /// Labels are skipped when no font is available.
    pub font: Option<FontVec>,
    pub font_scale: f32,
    pub box_thickness: i32,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            font: None,
            font_scale: 16.0,
            box_thickness: 2,
        }
    }
}

impl VisualizationConfig {
    /// Try a few common system font locations, falling back to boxes only.
    pub fn with_system_font() -> Self {
        let font_paths = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ];

        for path in &font_paths {
            if let Ok(font_data) = fs::read(path)
                && let Ok(font) = FontVec::try_from_vec(font_data)
            {
                debug!("Loaded label font: {}", path);
                return Self {
                    font: Some(font),
                    ..Self::default()
                };
            }
        }

        debug!("No system font found, labels will not be drawn");
        Self::default()
    }
}

/// Draw every candidate's page box and label onto a copy of the page.
pub fn annotate_page(
    page: &DynamicImage,
    candidates: &[SymbolCandidate],
    config: &VisualizationConfig,
) -> RgbImage {
    let mut canvas = page.to_rgb8();
    let (width, height) = canvas.dimensions();

    for candidate in candidates {
        let bbox = candidate.page_bbox();
        if bbox.width == 0 || bbox.height == 0 || bbox.x >= width || bbox.y >= height {
            continue;
        }
        let color = if candidate.is_known() {
            KNOWN_COLOR
        } else {
            UNKNOWN_COLOR
        };

        for t in 0..config.box_thickness.max(1) {
            let grow = t as u32 * 2;
            let rect = Rect::at(bbox.x as i32 - t, bbox.y as i32 - t)
                .of_size(bbox.width + grow, bbox.height + grow);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }

        if let Some(font) = &config.font {
            let label = candidate.label();
            let (_, text_h) = text_size(config.font_scale, font, label);
            let text_h = text_h as i32;
            let y = bbox.y as i32;
            // Above the box unless that would leave the page.
            let text_y = if y - 5 - text_h > 0 {
                y - 5 - text_h
            } else {
                bbox.bottom() as i32 + 5
            };
            draw_text_mut(&mut canvas, color, bbox.x as i32, text_y, config.font_scale, font, label);
        }
    }

    canvas
}

/// Layout of the output directory.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Prepended to every crop file name.
    pub prefix: String,
    /// Also write each staff region to `staffs/`.
    pub save_staffs: bool,
}

impl ExportOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: String::new(),
            save_staffs: false,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_FILE)
    }

    /// Directory a crop with this label goes to.
    pub fn class_dir(&self, label: &str) -> PathBuf {
        if label == UNKNOWN_LABEL {
            self.output_dir.join("unknown").join(UNKNOWN_LABEL)
        } else {
            self.output_dir.join("positive").join(label)
        }
    }

    pub fn part_name(&self, base: &str, index: usize) -> String {
        format!("{}{}_part_{}.png", self.prefix, base, index + 1)
    }
}

/// Writes one page worth of results.
pub struct PageExporter {
    options: ExportOptions,
    visualization: VisualizationConfig,
}

impl PageExporter {
    pub fn new(options: ExportOptions, visualization: VisualizationConfig) -> Self {
        Self {
            options,
            visualization,
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Save crops and diagnostics, returning the manifest lines for the page.
    pub fn export_page(
        &self,
        base: &str,
        page: &DynamicImage,
        result: &PageResult,
    ) -> Result<Vec<AnnotationRecord>> {
        let records = self.write_candidates(base, &result.candidates)?;

        let annotated = annotate_page(page, &result.candidates, &self.visualization);
        let debug_dir = self.options.output_dir.join("debug");
        save_best_effort(&debug_dir, &format!("{}_annotated.png", base), |p| {
            annotated.save(p)
        });

        if self.options.save_staffs {
            self.write_staff_regions(base, &result.regions);
        }

        Ok(records)
    }

    pub fn write_candidates(
        &self,
        base: &str,
        candidates: &[SymbolCandidate],
    ) -> Result<Vec<AnnotationRecord>> {
        let mut records = Vec::with_capacity(candidates.len());

        for (i, candidate) in candidates.iter().enumerate() {
            let label = candidate.label();
            let dir = self.options.class_dir(label);
            fs::create_dir_all(&dir)?;

            let filename = self.options.part_name(base, i);
            let path = dir.join(&filename);
            candidate
                .image
                .save(&path)
                .map_err(|source| SegmentError::Write { path, source })?;

            records.push(AnnotationRecord {
                label: label.to_string(),
                filename,
                bbox: candidate.page_bbox(),
            });
        }

        Ok(records)
    }

    fn write_staff_regions(&self, base: &str, regions: &[StaffRegion]) {
        let dir = self.options.output_dir.join("staffs");
        for region in regions {
            save_best_effort(&dir, &format!("{}_staff_{}.png", base, region.index), |p| {
                region.image.save(p)
            });
        }
    }
}

/// Write manifest lines to `path`, replacing any previous manifest.
pub fn write_manifest(path: &Path, records: &[AnnotationRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for record in records {
        writeln!(writer, "{}", record)?;
    }
    writer.flush()?;
    info!("Wrote {} annotation(s) to {}", records.len(), path.display());
    Ok(())
}

/// Read a manifest back. Malformed lines are an error.
pub fn read_manifest(path: &Path) -> anyhow::Result<Vec<AnnotationRecord>> {
    let text = fs::read_to_string(path)?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.parse::<AnnotationRecord>().map_err(anyhow::Error::from))
        .collect()
}

fn save_best_effort(
    dir: &Path,
    name: &str,
    save: impl FnOnce(&Path) -> image::ImageResult<()>,
) {
    if let Err(e) = fs::create_dir_all(dir) {
        warn!("Failed to create {}: {}", dir.display(), e);
        return;
    }
    let path = dir.join(name);
    if let Err(e) = save(&path) {
        warn!("Failed to save {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use image::{GrayImage, Luma};

    fn candidate(label: Option<&str>, x: u32, y: u32) -> SymbolCandidate {
        SymbolCandidate {
            image: GrayImage::from_pixel(64, 64, Luma([255])),
            bbox: BoundingBox::new(x, y, 10, 10),
            staff_index: Some(0),
            region_offset_y: 30,
            label: label.map(str::to_string),
        }
    }

    #[test]
    fn crops_go_to_class_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut options = ExportOptions::new(dir.path());
        options.prefix = "a_".to_string();
        let exporter = PageExporter::new(options, VisualizationConfig::default());

        let records = exporter
            .write_candidates("page", &[candidate(Some("dot"), 5, 5), candidate(None, 40, 2)])
            .unwrap();

        assert!(dir.path().join("positive/dot/a_page_part_1.png").exists());
        assert!(dir.path().join("unknown/unknown/a_page_part_2.png").exists());
        assert_eq!(records[0].to_string(), "dot/a_page_part_1.png 5 35 10 10");
        assert_eq!(records[1].label, UNKNOWN_LABEL);
    }

    #[test]
    fn annotated_page_marks_unknown_in_red() {
        let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, Luma([255])));
        let candidates = [candidate(Some("dot"), 10, 10), candidate(None, 60, 10)];
        let annotated = annotate_page(&page, &candidates, &VisualizationConfig::default());

        assert_eq!(*annotated.get_pixel(10, 40), KNOWN_COLOR);
        assert_eq!(*annotated.get_pixel(60, 40), UNKNOWN_COLOR);
        assert_eq!(*annotated.get_pixel(50, 90), Rgb([255, 255, 255]));
    }

    #[test]
    fn manifest_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let records = vec![AnnotationRecord {
            label: "flat".to_string(),
            filename: "p_part_1.png".to_string(),
            bbox: BoundingBox::new(1, 2, 3, 4),
        }];
        write_manifest(&path, &records).unwrap();
        assert_eq!(read_manifest(&path).unwrap(), records);
    }

    #[test]
    fn staff_regions_are_optional_side_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut options = ExportOptions::new(dir.path());
        options.save_staffs = true;
        let exporter = PageExporter::new(options, VisualizationConfig::default());

        let region = StaffRegion {
            index: 0,
            image: GrayImage::new(20, 10),
            system: crate::models::StaffSystem {
                lines: Vec::new(),
                top: 0,
                bottom: 0,
                left: 0,
                right: 19,
                avg_spacing: 0.0,
            },
            offset_y: 0,
        };
        let result = PageResult {
            regions: vec![region],
            ..PageResult::default()
        };
        let page = DynamicImage::ImageLuma8(GrayImage::new(20, 10));
        exporter.export_page("score", &page, &result).unwrap();

        assert!(dir.path().join("staffs/score_staff_0.png").exists());
        assert!(dir.path().join("debug/score_annotated.png").exists());
    }
}
