//! In-memory document graph for one processing run.
//!
//! A [`Document`] owns its rasterised [`Page`]s; each page carries the
//! [`Region`]s the detector found on it. None of this is persisted: only the
//! [`crate::output::DocumentResult`] leaves the pipeline.

use crate::labels::RegionClass;
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Axis-aligned box in page-image pixel coordinates. Always `x1 < x2`, `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Returns `None` for degenerate or non-finite boxes.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        (finite && x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    /// Intersect with the `width × height` image; `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as f32, height as f32);
        Self::new(
            self.x1.clamp(0.0, w),
            self.y1.clamp(0.0, h),
            self.x2.clamp(0.0, w),
            self.y2.clamp(0.0, h),
        )
    }

    /// Integer corners, truncated toward zero.
    pub fn pixel_bounds(&self) -> (i32, i32, i32, i32) {
        (
            self.x1 as i32,
            self.y1 as i32,
            self.x2 as i32,
            self.y2 as i32,
        )
    }

    /// The four corners clockwise from top-left, flattened to 8 numbers.
    pub fn polygon(&self) -> Vec<i32> {
        let (x1, y1, x2, y2) = self.pixel_bounds();
        vec![x1, y1, x2, y1, x2, y2, x1, y2]
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// A classified, scored layout element on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bbox: BoundingBox,
    pub class: RegionClass,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based position in the document.
    pub index: usize,
    pub image: RgbImage,
    /// Unordered as produced by the detector; empty until detection has run.
    pub regions: Vec<Region>,
}

impl Page {
    pub fn new(index: usize, image: RgbImage) -> Self {
        Self {
            index,
            image,
            regions: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Copy the pixels under `bbox`, clamped to the page.
    ///
    /// Uses the same integer bounds as [`BoundingBox::polygon`]. Returns
    /// `None` when the clamped crop has no pixels.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<RgbImage> {
        let (x1, y1, x2, y2) = bbox.pixel_bounds();
        let clamp_x = |v: i32| v.clamp(0, self.width() as i32) as u32;
        let clamp_y = |v: i32| v.clamp(0, self.height() as i32) as u32;
        let (x1, x2) = (clamp_x(x1), clamp_x(x2));
        let (y1, y2) = (clamp_y(y1), clamp_y(y2));
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(imageops::crop_imm(&self.image, x1, y1, x2 - x1, y2 - y1).to_image())
    }
}

/// An ordered sequence of pages rasterised from one source file.
#[derive(Debug, Clone)]
pub struct Document {
    source: PathBuf,
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a document from page images in order; indices are assigned 0..n.
    pub fn from_images(source: impl Into<PathBuf>, images: Vec<RgbImage>) -> Self {
        let pages = images
            .into_iter()
            .enumerate()
            .map(|(i, img)| Page::new(i, img))
            .collect();
        Self {
            source: source.into(),
            pages,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// File stem of the source, used to namespace artifacts.
    pub fn stem(&self) -> String {
        self.source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
