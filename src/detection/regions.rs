use image::GrayImage;
use image::imageops::crop_imm;

use crate::models::{StaffRegion, StaffSystem};

/// Cuts one padded horizontal band per staff system out of the page.
#[derive(Debug, Clone, Copy)]
pub struct StaffRegionExtractor {
    padding_factor: f64,
}

impl StaffRegionExtractor {
    pub fn new(padding_factor: f64) -> Self {
        Self { padding_factor }
    }

    /// Rows above and below the outer lines, `floor(spacing * factor)`.
    pub fn padding(&self, system: &StaffSystem) -> u32 {
        (system.avg_spacing * self.padding_factor).floor().max(0.0) as u32
    }

    pub fn extract(&self, page: &GrayImage, index: usize, system: &StaffSystem) -> StaffRegion {
        let padding = self.padding(system);
        let last_row = page.height().saturating_sub(1);
        let y1 = system.top.saturating_sub(padding);
        let y2 = system.bottom.saturating_add(padding).min(last_row);

        let image = crop_imm(page, 0, y1, page.width(), y2 - y1 + 1).to_image();

        StaffRegion {
            index,
            image,
            system: system.clone(),
            offset_y: y1,
        }
    }

    pub fn extract_all(&self, page: &GrayImage, systems: &[StaffSystem]) -> Vec<StaffRegion> {
        systems
            .iter()
            .enumerate()
            .map(|(i, s)| self.extract(page, i, s))
            .collect()
    }
}
