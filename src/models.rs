use image::GrayImage;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Label used when no heuristic rule matches.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Axis-aligned box, inclusive of its first pixel, `width` x `height` pixels large.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a box from inclusive pixel extents.
    pub fn from_extents(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }

    /// Last column covered by the box.
    pub fn right(&self) -> u32 {
        self.x + self.width.saturating_sub(1)
    }

    /// Last row covered by the box.
    pub fn bottom(&self) -> u32 {
        self.y + self.height.saturating_sub(1)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn translate(&self, dx: u32, dy: u32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// A detected horizontal run; `y` is the top row of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub x_start: u32,
    pub x_end: u32,
    pub y: u32,
}

impl LineSegment {
    pub fn length(&self) -> u32 {
        self.x_end - self.x_start + 1
    }
}

/// A group of parallel staff lines, sorted top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct StaffSystem {
    pub lines: Vec<LineSegment>,
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
    /// Mean distance between consecutive lines, 0 for a single line.
    pub avg_spacing: f64,
}

impl StaffSystem {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Pixel region of one staff, cut out of the page.
#[derive(Debug, Clone)]
pub struct StaffRegion {
    pub index: usize,
    pub image: GrayImage,
    pub system: StaffSystem,
    /// First page row covered by `image`.
    pub offset_y: u32,
}

impl StaffRegion {
    /// Region extent in page coordinates.
    pub fn page_bounds(&self) -> BoundingBox {
        BoundingBox::new(0, self.offset_y, self.image.width(), self.image.height())
    }
}

/// A segmented glyph ready for the downstream classifier.
#[derive(Debug, Clone)]
pub struct SymbolCandidate {
    /// Normalized crop.
    pub image: GrayImage,
    /// Box in the coordinates of the region it was found in.
    pub bbox: BoundingBox,
    /// Staff the glyph belongs to; `None` in direct mode.
    pub staff_index: Option<usize>,
    /// Page row of the region's first row.
    pub region_offset_y: u32,
    pub label: Option<String>,
}

impl SymbolCandidate {
    pub fn page_bbox(&self) -> BoundingBox {
        self.bbox.translate(0, self.region_offset_y)
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNKNOWN_LABEL)
    }

    pub fn is_known(&self) -> bool {
        self.label() != UNKNOWN_LABEL
    }
}

/// One manifest line: `{label}/{filename} {x} {y} {w} {h}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub label: String,
    pub filename: String,
    pub bbox: BoundingBox,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("malformed annotation line: {0}")]
pub struct ParseAnnotationError(pub String);

impl fmt::Display for AnnotationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {} {} {} {}",
            self.label, self.filename, self.bbox.x, self.bbox.y, self.bbox.width, self.bbox.height
        )
    }
}

impl FromStr for AnnotationRecord {
    type Err = ParseAnnotationError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseAnnotationError(line.to_string());
        let mut fields = line.split_whitespace();

        let path = fields.next().ok_or_else(malformed)?;
        let (label, filename) = path.split_once('/').ok_or_else(malformed)?;

        let mut numbers = [0u32; 4];
        for slot in numbers.iter_mut() {
            *slot = fields
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(malformed)?;
        }
        if fields.next().is_some() {
            return Err(malformed());
        }

        Ok(Self {
            label: label.to_string(),
            filename: filename.to_string(),
            bbox: BoundingBox::new(numbers[0], numbers[1], numbers[2], numbers[3]),
        })
    }
}
