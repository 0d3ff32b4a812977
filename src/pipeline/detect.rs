//! Layout Detector: page image → classified, scored regions.
//!
//! A [`LayoutDetector`] returns raw detections with integer class ids.
//! [`resolve_regions`] applies the confidence floor, clamps boxes to the page
//! and resolves ids through [`crate::labels::CLASS_LABELS`]; ids outside the
//! table become [`RegionClass::Unknown`] rather than an error.

use crate::document::{BoundingBox, Page, Region};
use crate::error::DetectionError;
use crate::labels::RegionClass;
use crate::pipeline::llm::VlmClient;
use crate::pipeline::postprocess::extract_json;
use crate::prompts::layout_detection_prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One detection as produced by a model, before label resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: i64,
    /// `[x1, y1, x2, y2]` in page-image pixels.
    pub bbox: [f32; 4],
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

/// Region-detection capability over one page image.
///
/// Runs under the detection timeout, which only fires at an `.await`;
/// blocking inference belongs in `tokio::task::spawn_blocking`.
#[async_trait]
pub trait LayoutDetector: Send + Sync {
    async fn detect(&self, page: &Page) -> Result<Vec<RawDetection>, DetectionError>;
}

/// Turn raw detections into page [`Region`]s.
///
/// Drops detections below `floor` (or with a non-finite score), clamps each
/// box to the `width × height` page and drops boxes with no area left.
pub fn resolve_regions(raw: Vec<RawDetection>, floor: f32, width: u32, height: u32) -> Vec<Region> {
    raw.into_iter()
        .filter_map(|d| {
            if !d.confidence.is_finite() || d.confidence < floor {
                return None;
            }
            let [x1, y1, x2, y2] = d.bbox;
            let bbox = BoundingBox::new(x1, y1, x2, y2)?.clamp_to(width, height)?;
            Some(Region {
                bbox,
                class: RegionClass::from_class_id(d.class_id),
                confidence: d.confidence.min(1.0),
            })
        })
        .collect()
}

/// Detector backed by a vision LLM asked for a JSON list of boxes.
pub struct VlmLayoutDetector {
    client: Arc<VlmClient>,
}

impl VlmLayoutDetector {
    pub fn new(client: Arc<VlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LayoutDetector for VlmLayoutDetector {
    async fn detect(&self, page: &Page) -> Result<Vec<RawDetection>, DetectionError> {
        let prompt = layout_detection_prompt(page.width(), page.height());
        let answer = self
            .client
            .ask(&prompt, &page.image)
            .await
            .map_err(DetectionError::Backend)?;
        let detections = parse_detections(&answer)?;
        debug!("Page {}: {} raw detections", page.index, detections.len());
        Ok(detections)
    }
}

fn parse_detections(answer: &str) -> Result<Vec<RawDetection>, DetectionError> {
    let json = extract_json(answer)
        .ok_or_else(|| DetectionError::MalformedResponse("no JSON array in answer".into()))?;
    serde_json::from_str(&json).map_err(|e| DetectionError::MalformedResponse(e.to_string()))
}
